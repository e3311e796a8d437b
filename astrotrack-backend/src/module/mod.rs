pub mod ephemeris;
pub mod scheduled;

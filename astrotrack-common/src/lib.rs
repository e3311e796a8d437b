//! Wire types shared between the AstroTrack backend and its consumers.
//!
//! The renderer polls the backend for a [`PositionBatch`] serialized as JSON;
//! these types define that contract.

mod types;

pub use types::*;

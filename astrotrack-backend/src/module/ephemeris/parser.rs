//! Vector table parser
//!
//! Extracts one heliocentric (x, y, z) triple from a Horizons result payload.
//! The tabular section between `$$SOE` and `$$EOE` is not laid out the same
//! way across request configurations, so several layouts are tried in order.
//! The first layout that locates three cells claims the payload; those cells
//! must then be finite numbers or the whole parse fails.

use std::sync::LazyLock;

use regex::Regex;

use super::error::ParseError;

pub const START_MARKER: &str = "$$SOE";
pub const END_MARKER: &str = "$$EOE";

/// Leading fields above this are Julian-date time indices, not coordinates
const TIME_INDEX_THRESHOLD: f64 = 1_000_000.0;

const AXES: [char; 3] = ['X', 'Y', 'Z'];

/// Axis letter followed by a unit annotation, e.g. "X (AU)" or "y [au]"
static AXIS_UNIT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<axis>[xyz])\s*[\(\[][^\)\]]*[\)\]]$").expect("valid axis label regex")
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Comma-separated rows found between the markers
struct Table<'t> {
    rows: Vec<Vec<&'t str>>,
}

impl<'t> Table<'t> {
    fn new(section: &'t str) -> Self {
        let rows = section
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(split_fields)
            .collect();
        Self { rows }
    }

    fn last_row(&self) -> Option<&[&'t str]> {
        self.rows.last().map(Vec::as_slice)
    }
}

type Layout = for<'t> fn(&Table<'t>) -> Option<[&'t str; 3]>;

/// Layouts in priority order
const LAYOUTS: &[(&str, Layout)] = &[
    ("header-labeled", header_labeled),
    ("indexed", indexed_positional),
    ("positional", positional_fallback),
];

/// Parse a raw payload into a position vector.
pub fn parse_vector(payload: &str) -> Result<Vector3, ParseError> {
    let section = extract_section(payload)?;
    let table = Table::new(section);
    if table.rows.is_empty() {
        return Err(ParseError::Empty);
    }

    let (layout, cells) = LAYOUTS
        .iter()
        .find_map(|(name, layout)| layout(&table).map(|cells| (*name, cells)))
        .ok_or(ParseError::UnrecognizedLayout)?;

    tracing::trace!("Vector table matched {} layout: {:?}", layout, cells);

    let [x, y, z] = [0, 1, 2].map(|i| finite_component(AXES[i], cells[i]));
    Ok(Vector3 { x: x?, y: y?, z: z? })
}

/// Text strictly between the start and end markers
fn extract_section(payload: &str) -> Result<&str, ParseError> {
    let start = payload
        .find(START_MARKER)
        .ok_or(ParseError::MissingStartMarker(START_MARKER))?
        + START_MARKER.len();
    let end = payload[start..]
        .find(END_MARKER)
        .ok_or(ParseError::MissingEndMarker(END_MARKER))?;
    Ok(&payload[start..start + end])
}

/// Horizons CSV rows end with a comma; that trailing empty field is dropped.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() > 1 && fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    fields
}

fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok()
}

fn is_time_index(field: &str) -> bool {
    parse_number(field).is_some_and(|v| v.is_finite() && v > TIME_INDEX_THRESHOLD)
}

fn finite_component(axis: char, raw: &str) -> Result<f64, ParseError> {
    match parse_number(raw) {
        Some(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::NonFinite {
            axis,
            raw: raw.to_string(),
        }),
    }
}

/// First row holds labels, second row holds values.
fn header_labeled<'t>(table: &Table<'t>) -> Option<[&'t str; 3]> {
    let [header, values, ..] = table.rows.as_slice() else {
        return None;
    };

    let mut cells = [""; 3];
    for (cell, axis) in cells.iter_mut().zip(AXES) {
        let index = find_axis_column(header, axis)?;
        *cell = values.get(index).copied()?;
    }
    Some(cells)
}

/// Column index for `axis`, trying each label rule over the whole header
/// before falling back to the next rule.
fn find_axis_column(header: &[&str], axis: char) -> Option<usize> {
    let rules: [fn(&str, char) -> bool; 5] = [
        |label, axis| label.len() == axis.len_utf8() && label.starts_with(axis),
        |label, axis| label.contains(axis),
        |label, axis| label.starts_with(axis),
        |label, axis| {
            AXIS_UNIT_LABEL
                .captures(label)
                .is_some_and(|caps| caps["axis"].eq_ignore_ascii_case(&axis.to_string()))
        },
        |label, axis| {
            let lower = label.to_ascii_lowercase();
            lower.contains("position") && lower.contains(axis.to_ascii_lowercase())
        },
    ];

    rules
        .iter()
        .find_map(|rule| header.iter().position(|label| rule(label, axis)))
}

/// Time index first, then a date column, then x, y, z.
fn indexed_positional<'t>(table: &Table<'t>) -> Option<[&'t str; 3]> {
    let row = table.last_row()?;
    if row.len() >= 5 && is_time_index(row[0]) {
        Some([row[2], row[3], row[4]])
    } else {
        None
    }
}

/// First three numeric fields of the last row, skipping a leading time index.
fn positional_fallback<'t>(table: &Table<'t>) -> Option<[&'t str; 3]> {
    let row = table.last_row()?;
    let skip = usize::from(row.first().is_some_and(|f| is_time_index(f)));

    let numeric: Vec<&'t str> = row
        .iter()
        .skip(skip)
        .copied()
        .filter(|field| parse_number(field).is_some())
        .take(3)
        .collect();

    numeric.try_into().ok()
}

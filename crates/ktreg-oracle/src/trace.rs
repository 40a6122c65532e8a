use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::tour::Cell;

// A line is an observation as soon as its prefix matches; the remainder is
// parsed separately so nothing after the prefix can make it disappear.
const START_PATTERN: &str = r"(?i)starting at coordinate:\s*(.*?)\s*$";
const COORD_PATTERN: &str = r"(?i)coordinate on the board:\s*(.*?)\s*$";
const PAIR_PATTERN: &str = r"^\(\s*([+-]?\d+)\s*,\s*([+-]?\d+)\s*\)";

static START_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(START_PATTERN).ok());
static COORD_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(COORD_PATTERN).ok());
static PAIR_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(PAIR_PATTERN).ok());

/// One logged square as the hardware printed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observed {
    Square(Cell),
    /// A well-formed pair no grid can contain: negative, or wider than `usize`.
    OffBoard { x: String, y: String },
    /// Text after the prefix that is not a coordinate pair at all.
    Malformed { text: String },
}

impl Observed {
    pub fn cell(&self) -> Option<Cell> {
        match self {
            Observed::Square(c) => Some(*c),
            _ => None,
        }
    }

    fn parse(rest: &str) -> Self {
        let Some(caps) = PAIR_RE.as_ref().and_then(|re| re.captures(rest)) else {
            return Observed::Malformed {
                text: rest.to_string(),
            };
        };
        let (raw_x, raw_y) = (&caps[1], &caps[2]);
        match (raw_x.parse::<usize>(), raw_y.parse::<usize>()) {
            (Ok(x), Ok(y)) => Observed::Square(Cell::new(x, y)),
            _ => Observed::OffBoard {
                x: raw_x.to_string(),
                y: raw_y.to_string(),
            },
        }
    }
}

impl From<Cell> for Observed {
    fn from(c: Cell) -> Self {
        Observed::Square(c)
    }
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Square(c) => c.fmt(f),
            Observed::OffBoard { x, y } => write!(f, "({x}, {y})"),
            Observed::Malformed { text } => write!(f, "{text:?}"),
        }
    }
}

/// What a tour-era transcript says the hardware did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TourTrace {
    pub start: Option<Observed>,
    pub coordinates: Vec<Observed>,
}

impl TourTrace {
    pub fn from_cells(start: Cell, coordinates: &[Cell]) -> Self {
        Self {
            start: Some(Observed::Square(start)),
            coordinates: coordinates.iter().copied().map(Observed::Square).collect(),
        }
    }
}

/// Scans a transcript line by line. Only the first start line counts; every
/// coordinate line is kept in order, parseable or not.
pub fn extract_trace(text: &str) -> TourTrace {
    let mut trace = TourTrace::default();
    let (Some(start_re), Some(coord_re)) = (START_RE.as_ref(), COORD_RE.as_ref()) else {
        return trace;
    };
    for line in text.lines() {
        if trace.start.is_none() {
            if let Some(caps) = start_re.captures(line) {
                trace.start = Some(Observed::parse(&caps[1]));
                continue;
            }
        }
        if let Some(caps) = coord_re.captures(line) {
            trace.coordinates.push(Observed::parse(&caps[1]));
        }
    }
    trace
}

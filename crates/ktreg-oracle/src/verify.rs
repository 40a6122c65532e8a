use serde::Serialize;
use thiserror::Error;

use crate::tour::{solve, Board, Cell, TourError};
use crate::trace::{extract_trace, Observed, TourTrace};

/// First position where the observed trace departs from the oracle.
/// `None` on either side means that sequence had already ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub index: usize,
    pub expected: Option<Cell>,
    pub observed: Option<Observed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Match { moves: usize },
    Mismatch(Mismatch),
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match { .. })
    }
}

/// Verification could not run. Callers classify these as Unknown, never Error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("transcript has no starting coordinate line")]
    MissingStart,
    #[error("transcript has no board coordinate lines")]
    NoCoordinates,
    #[error("starting coordinate {observed} is not a square on any board")]
    UnusableStart { observed: String },
    #[error(transparent)]
    Oracle(#[from] TourError),
}

/// Off-board and malformed observations never equal an expected square.
pub fn compare_paths(expected: &[Cell], observed: &[Observed]) -> Verdict {
    let n = expected.len().max(observed.len());
    for index in 0..n {
        let e = expected.get(index).copied();
        let o = observed.get(index).cloned();
        if !matches!((e, &o), (Some(c), Some(Observed::Square(s))) if c == *s) {
            return Verdict::Mismatch(Mismatch {
                index,
                expected: e,
                observed: o,
            });
        }
    }
    Verdict::Match {
        moves: expected.len(),
    }
}

/// Diffs a trace against the oracle tour from the same start, with the start
/// cell itself excluded since the hardware logs only landing squares.
pub fn verify_trace(board: Board, trace: &TourTrace) -> Result<Verdict, VerifyError> {
    let observed = trace.start.as_ref().ok_or(VerifyError::MissingStart)?;
    let start = observed.cell().ok_or_else(|| VerifyError::UnusableStart {
        observed: observed.to_string(),
    })?;
    if trace.coordinates.is_empty() {
        return Err(VerifyError::NoCoordinates);
    }
    let tour = solve(board, start)?;
    Ok(compare_paths(tour.moves(), &trace.coordinates))
}

pub fn verify_transcript(board: Board, text: &str) -> Result<Verdict, VerifyError> {
    verify_trace(board, &extract_trace(text))
}

//! Reference oracle for tour-era KnightsTour tests.
//!
//! The hardware under test computes a knight's tour and logs every square it
//! lands on. Instead of a table of expected outputs per start square, the
//! runner recomputes the tour here and diffs it against the logged trace.

mod tour;
mod trace;
mod verify;

pub use tour::{solve, Board, Cell, Tour, TourError, KNIGHT_OFFSETS};
pub use trace::{extract_trace, Observed, TourTrace};
pub use verify::{compare_paths, verify_trace, verify_transcript, Mismatch, Verdict, VerifyError};

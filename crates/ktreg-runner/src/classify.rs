use std::path::Path;

use ktreg_catalog::manifest::MarkerOverrides;
use ktreg_catalog::TestId;
use ktreg_oracle::{verify_transcript, Board, Mismatch, Verdict};
use serde::{Deserialize, Serialize};

pub const PASS_MARKER: &str = "YAHOO!! All tests passed.";
pub const FAIL_MARKER: &str = "ERROR";
pub const COMPILE_ERROR_MARKER: &str = "Error:";
pub const COMPILE_WARNING_MARKER: &str = "Warning:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    Error,
    Warning,
    Unknown,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Success => "success",
            Classification::Error => "error",
            Classification::Warning => "warning",
            Classification::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Markers {
    pub pass: String,
    pub fail: String,
    pub compile_error: String,
    pub compile_warning: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            pass: PASS_MARKER.to_string(),
            fail: FAIL_MARKER.to_string(),
            compile_error: COMPILE_ERROR_MARKER.to_string(),
            compile_warning: COMPILE_WARNING_MARKER.to_string(),
        }
    }
}

impl Markers {
    pub fn with_overrides(overrides: &MarkerOverrides) -> Self {
        let base = Markers::default();
        let pick = |o: &Option<String>, d: String| o.clone().unwrap_or(d);
        Self {
            pass: pick(&overrides.pass, base.pass),
            fail: pick(&overrides.fail, base.fail),
            compile_error: pick(&overrides.compile_error, base.compile_error),
            compile_warning: pick(&overrides.compile_warning, base.compile_warning),
        }
    }
}

/// Outcome of the oracle cross-check for tour-era tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Matched { moves: usize },
    Mismatched {
        index: usize,
        expected: Option<String>,
        observed: Option<String>,
    },
    Unavailable { reason: String },
}

impl From<Mismatch> for VerificationOutcome {
    fn from(m: Mismatch) -> Self {
        VerificationOutcome::Mismatched {
            index: m.index,
            expected: m.expected.map(|c| c.to_string()),
            observed: m.observed.map(|c| c.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptVerdict {
    pub classification: Classification,
    pub verification: Option<VerificationOutcome>,
}

/// Settings the transcript rule needs besides the text itself.
#[derive(Clone, Debug)]
pub struct TranscriptRules {
    pub markers: Markers,
    pub verification_threshold: TestId,
    pub board: Board,
}

impl Default for TranscriptRules {
    fn default() -> Self {
        Self {
            markers: Markers::default(),
            verification_threshold: ktreg_catalog::DEFAULT_VERIFICATION_THRESHOLD,
            board: Board::STANDARD,
        }
    }
}

pub fn classify_compile_log(text: &str, markers: &Markers) -> Classification {
    if text.contains(&markers.compile_error) {
        Classification::Error
    } else if text.contains(&markers.compile_warning) {
        Classification::Warning
    } else {
        Classification::Success
    }
}

/// Simulation transcript rule. The fail marker always wins, including over a
/// pass marker in the same text. Below the verification threshold the pass
/// marker is trusted; at or above it the oracle decides.
pub fn classify_transcript(text: &str, id: TestId, rules: &TranscriptRules) -> TranscriptVerdict {
    if text.contains(&rules.markers.fail) {
        return TranscriptVerdict {
            classification: Classification::Error,
            verification: None,
        };
    }

    if id < rules.verification_threshold {
        let classification = if text.contains(&rules.markers.pass) {
            Classification::Success
        } else {
            Classification::Unknown
        };
        return TranscriptVerdict {
            classification,
            verification: None,
        };
    }

    match verify_transcript(rules.board, text) {
        Ok(Verdict::Match { moves }) => TranscriptVerdict {
            classification: Classification::Success,
            verification: Some(VerificationOutcome::Matched { moves }),
        },
        Ok(Verdict::Mismatch(m)) => TranscriptVerdict {
            classification: Classification::Error,
            verification: Some(m.into()),
        },
        Err(err) => TranscriptVerdict {
            classification: Classification::Unknown,
            verification: Some(VerificationOutcome::Unavailable {
                reason: err.to_string(),
            }),
        },
    }
}

fn read_lossy(path: &Path) -> Result<String, String> {
    std::fs::read(path)
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .map_err(|err| format!("read {}: {err}", path.display()))
}

/// File-reading entry points. An unreadable log comes back as a message the
/// caller records as a diagnostic; the job is then treated as not passing.
pub fn classify_compile_file(path: &Path, markers: &Markers) -> Result<Classification, String> {
    read_lossy(path).map(|text| classify_compile_log(&text, markers))
}

pub fn classify_transcript_file(
    path: &Path,
    id: TestId,
    rules: &TranscriptRules,
) -> Result<TranscriptVerdict, String> {
    read_lossy(path).map(|text| classify_transcript(&text, id, rules))
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ktreg_oracle::Board;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build_unit::CompilePolicy;
use crate::classify::Markers;

pub const DEFAULT_SIMULATOR: &str = "vsim";
pub const DEFAULT_JOBS: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Batch run; a failing test is re-run once to capture waves.
    #[default]
    Cmd,
    /// Batch run that always records waves.
    Save,
    /// Interactive simulator session per test.
    Gui,
    /// Open previously saved waves; nothing is compiled or simulated.
    View,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Cmd => "cmd",
            RunMode::Save => "save",
            RunMode::Gui => "gui",
            RunMode::View => "view",
        }
    }

    /// Modes that need waveform signal lists.
    pub fn records_waves(self) -> bool {
        matches!(self, RunMode::Save | RunMode::Gui)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid run mode {value:?} (expected one of: cmd, save, gui, view or 0-3)")]
pub struct RunModeParseError {
    value: String,
}

impl FromStr for RunMode {
    type Err = RunModeParseError;

    /// Also accepts the numeric codes 0-3 used by older scripts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cmd" | "0" => Ok(RunMode::Cmd),
            "save" | "1" => Ok(RunMode::Save),
            "gui" | "2" => Ok(RunMode::Gui),
            "view" | "3" => Ok(RunMode::View),
            other => Err(RunModeParseError {
                value: other.to_string(),
            }),
        }
    }
}

/// Everything a job needs besides the catalog and the tool.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub root: PathBuf,
    pub output_dir: PathBuf,
    pub library_dir: PathBuf,
    pub simulator: String,
    pub mode: RunMode,
    pub policy: CompilePolicy,
    /// Overrides the catalog's default signal sets when set.
    pub custom_signals: Option<Vec<String>>,
    pub markers: Markers,
    pub board: Board,
}

impl RunnerConfig {
    /// Defaults relative to a project root: `output/` for logs and waves,
    /// `TESTS/` for build units.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            output_dir: root.join("output"),
            library_dir: root.join("TESTS"),
            root,
            simulator: DEFAULT_SIMULATOR.to_string(),
            mode: RunMode::default(),
            policy: CompilePolicy::default(),
            custom_signals: None,
            markers: Markers::default(),
            board: Board::STANDARD,
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    pub fn compile_logs_dir(&self) -> PathBuf {
        self.logs_dir().join("compilation")
    }

    pub fn waves_dir(&self) -> PathBuf {
        self.output_dir.join("waves")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

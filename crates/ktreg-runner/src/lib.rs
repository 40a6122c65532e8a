//! Compile, simulate and classify KnightsTour regression tests.
//!
//! [`JobRunner`] drives one test through its build unit and the simulator;
//! [`run_jobs`] fans a selection out over a bounded worker pool. The
//! simulator is only ever reached through [`ToolRunner`].

pub mod build_unit;
pub mod classify;
pub mod config;
pub mod job;
pub mod scheduler;
pub mod signals;
pub mod tool;

pub use build_unit::{now_unix_ms, BuildUnit, BuildUnitManager, CompileOutcome, CompilePolicy};
pub use classify::{Classification, Markers, TranscriptRules, VerificationOutcome};
pub use config::{RunMode, RunnerConfig, DEFAULT_JOBS, DEFAULT_SIMULATOR};
pub use job::{prepare_shared_sources, JobDiag, JobPhase, JobResult, JobRunner, JobStatus};
pub use scheduler::{run_jobs, run_pool};
pub use tool::{ProcessTool, ToolInvocation, ToolOutput, ToolPurpose, ToolRunner};

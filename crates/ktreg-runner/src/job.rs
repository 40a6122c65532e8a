use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use ktreg_catalog::sources::{collect_shared_sources, source_set_for, SharedSources, SourceTree};
use ktreg_catalog::{Catalog, TestCase, TestId, Variant};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::build_unit::{BuildUnitManager, CompileOutcome, LIBRARY_NAME};
use crate::classify::{
    classify_transcript_file, Classification, TranscriptRules, VerificationOutcome,
};
use crate::config::{RunMode, RunnerConfig};
use crate::signals::{add_wave_script, resolve_signals, SignalCache};
use crate::tool::{ensure_log_written, SimTarget, Simulator, ToolRunner, WaveArtifacts};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Pending,
    Compiling,
    Simulating,
    Classifying,
    Viewing,
    Succeeded,
    Failed,
    Unknown,
    DiagnosticCapture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Succeeded => "pass",
            JobStatus::Failed => "fail",
            JobStatus::Unknown => "unknown",
        }
    }

    fn from_classification(c: Classification) -> Self {
        match c {
            Classification::Success => JobStatus::Succeeded,
            Classification::Error => JobStatus::Failed,
            Classification::Warning | Classification::Unknown => JobStatus::Unknown,
        }
    }

    fn phase(self) -> JobPhase {
        match self {
            JobStatus::Succeeded => JobPhase::Succeeded,
            JobStatus::Failed => JobPhase::Failed,
            JobStatus::Unknown => JobPhase::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDiag {
    pub code: String,
    pub message: String,
}

impl JobDiag {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub id: TestId,
    pub variant: Variant,
    pub category: String,
    pub status: JobStatus,
    pub classification: Classification,
    pub duration_ms: u64,
    pub phases: Vec<JobPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diags: Vec<JobDiag>,
}

impl JobResult {
    fn pending(case: &TestCase) -> Self {
        Self {
            id: case.id,
            variant: case.variant,
            category: case.category.clone(),
            status: JobStatus::Unknown,
            classification: Classification::Unknown,
            duration_ms: 0,
            phases: vec![JobPhase::Pending],
            compile: None,
            log_path: None,
            diagnostic_artifact: None,
            verification: None,
            diags: Vec::new(),
        }
    }

    /// A job that never reached classification: spawn/I-O error or panic.
    pub fn failed(case: &TestCase, code: &str, message: impl Into<String>, duration_ms: u64) -> Self {
        let mut r = Self::pending(case);
        r.status = JobStatus::Failed;
        r.classification = Classification::Error;
        r.duration_ms = duration_ms;
        r.phases.push(JobPhase::Failed);
        r.diags.push(JobDiag::new(code, message));
        r
    }

    pub fn compile_failed(&self) -> bool {
        self.compile.as_ref().is_some_and(|c| !c.ok)
    }

    fn enter(&mut self, phase: JobPhase) {
        self.phases.push(phase);
    }

    fn settle(&mut self, classification: Classification) {
        self.classification = classification;
        self.status = JobStatus::from_classification(classification);
        self.phases.push(self.status.phase());
    }
}

/// Collects the shared RTL and testbench sources once, before any job runs.
/// Only needed when a selected test compiles against them.
pub fn prepare_shared_sources(
    tree: &SourceTree,
    catalog: &Catalog,
    cases: &[TestCase],
    mode: RunMode,
) -> Result<Option<SharedSources>> {
    if mode == RunMode::View
        || cases
            .iter()
            .all(|c| c.id == ktreg_catalog::sources::POST_SYNTHESIS_TEST_ID)
    {
        return Ok(None);
    }
    collect_shared_sources(tree, catalog).map(Some)
}

pub struct JobRunner {
    config: RunnerConfig,
    catalog: Arc<Catalog>,
    tree: SourceTree,
    shared: Option<SharedSources>,
    tool: Arc<dyn ToolRunner>,
    simulator: Simulator,
    units: BuildUnitManager,
    signals: SignalCache,
    rules: TranscriptRules,
}

impl JobRunner {
    pub fn new(
        config: RunnerConfig,
        catalog: Arc<Catalog>,
        shared: Option<SharedSources>,
        tool: Arc<dyn ToolRunner>,
    ) -> Result<Self> {
        for dir in [config.logs_dir(), config.waves_dir(), config.library_dir.clone()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create output dir: {}", dir.display()))?;
        }
        let simulator = Simulator::new(config.simulator.clone(), catalog.testbench_prefix());
        let units = BuildUnitManager::new(
            config.library_dir.clone(),
            config.compile_logs_dir(),
            config.policy,
            simulator.clone(),
            config.markers.clone(),
            Arc::clone(&tool),
        );
        let rules = TranscriptRules {
            markers: config.markers.clone(),
            verification_threshold: catalog.verification_threshold(),
            board: config.board,
        };
        Ok(Self {
            tree: SourceTree::new(config.root.clone()),
            config,
            catalog,
            shared,
            tool,
            simulator,
            units,
            signals: SignalCache::new(),
            rules,
        })
    }

    pub fn build_units(&self) -> &BuildUnitManager {
        &self.units
    }

    pub fn signal_cache(&self) -> &SignalCache {
        &self.signals
    }

    pub fn mode(&self) -> RunMode {
        self.config.mode
    }

    fn log_path(&self, stem: &str) -> PathBuf {
        self.config.logs_dir().join(format!("{stem}.log"))
    }

    /// Runs one test end to end. `Err` means the job could not be driven at
    /// all; the scheduler turns it into a failed result.
    pub fn run(&self, case: &TestCase) -> Result<JobResult> {
        let span = info_span!("job", test_id = case.id, variant = %case.variant);
        let _guard = span.enter();
        let started = Instant::now();

        let mut result = JobResult::pending(case);
        if self.config.mode == RunMode::View {
            self.view(case, &mut result)?;
        } else {
            self.execute(case, &mut result)?;
        }
        result.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            status = result.status.as_str(),
            classification = result.classification.as_str(),
            duration_ms = result.duration_ms,
            "job finished"
        );
        Ok(result)
    }

    fn execute(&self, case: &TestCase, result: &mut JobResult) -> Result<()> {
        let stem = self.catalog.artifact_stem(case);

        result.enter(JobPhase::Compiling);
        let sources = source_set_for(&self.tree, &self.catalog, self.shared.as_ref(), case)?;
        let compile = self
            .units
            .ensure_compiled(case.id, case.variant, &sources)?;
        let compiled = compile.ok;
        let compile_log = compile.log_path.clone();
        result.compile = Some(compile);
        if !compiled {
            result.log_path = Some(compile_log.clone());
            result.diags.push(JobDiag::new(
                "ECOMPILE",
                format!("compilation failed; see {compile_log}"),
            ));
            result.settle(Classification::Error);
            return Ok(());
        }

        result.enter(JobPhase::Simulating);
        let unit = self.units.unit(case.id, case.variant);
        let cell_library = sources.post_synthesis.then(|| self.tree.cell_library_dir());
        let target = SimTarget {
            unit_dir: &unit.dir,
            library: LIBRARY_NAME,
            cell_library: cell_library.as_deref(),
        };
        let log_path = self.log_path(&stem);
        let waves = WaveArtifacts::for_stem(&self.config.waves_dir(), &stem);
        remove_if_exists(&log_path)?;

        let invocation = match self.config.mode {
            RunMode::Save | RunMode::Gui => {
                let add_wave = self.wave_script(case, &target);
                let interactive = self.config.mode == RunMode::Gui;
                result.diagnostic_artifact = Some(waves.wlf.display().to_string());
                self.simulator
                    .capture(&target, &log_path, &waves, &add_wave, interactive)
            }
            _ => self.simulator.simulate(&target, &log_path),
        };
        let output = self.tool.run(&invocation)?;
        ensure_log_written(&log_path, &output)?;
        if !output.ok() {
            result.diags.push(JobDiag::new(
                "ESIM_EXIT",
                format!("simulator exited with status {}", output.exit_status),
            ));
        }
        result.log_path = Some(log_path.display().to_string());

        result.enter(JobPhase::Classifying);
        match classify_transcript_file(&log_path, case.id, &self.rules) {
            Ok(verdict) => {
                result.verification = verdict.verification;
                result.settle(verdict.classification);
            }
            Err(msg) => {
                result.diags.push(JobDiag::new("ETRANSCRIPT", msg));
                result.settle(Classification::Unknown);
            }
        }

        if result.status == JobStatus::Failed && self.config.mode == RunMode::Cmd {
            self.capture_diagnostics(case, &stem, &target, &waves, result);
        }
        Ok(())
    }

    /// Re-runs a failed batch test with wave recording. The capture has its
    /// own transcript so the classified one is preserved.
    fn capture_diagnostics(
        &self,
        case: &TestCase,
        stem: &str,
        target: &SimTarget<'_>,
        waves: &WaveArtifacts,
        result: &mut JobResult,
    ) {
        result.enter(JobPhase::DiagnosticCapture);
        warn!("test failed; capturing waves for later debug");
        let capture_log = self
            .config
            .logs_dir()
            .join(format!("{stem}_capture.log"));
        if let Err(err) = remove_if_exists(&capture_log) {
            result.diags.push(JobDiag::new(
                "ECAPTURE",
                format!("stale capture transcript kept: {err:#}"),
            ));
            return;
        }
        let add_wave = self.wave_script(case, target);
        let invocation = self
            .simulator
            .capture(target, &capture_log, waves, &add_wave, false);
        match self.tool.run(&invocation) {
            Ok(output) => {
                if let Err(err) = ensure_log_written(&capture_log, &output) {
                    warn!(error = %format!("{err:#}"), "capture transcript not saved");
                }
                result.diagnostic_artifact = Some(waves.wlf.display().to_string());
            }
            Err(err) => {
                result.diags.push(JobDiag::new(
                    "ECAPTURE",
                    format!("diagnostic capture failed: {err:#}"),
                ));
            }
        }
    }

    fn view(&self, case: &TestCase, result: &mut JobResult) -> Result<()> {
        result.enter(JobPhase::Viewing);
        let stem = self.catalog.artifact_stem(case);
        let waves = WaveArtifacts::for_stem(&self.config.waves_dir(), &stem);
        if !waves.wlf.is_file() {
            result.diags.push(JobDiag::new(
                "EVIEW_MISSING",
                format!("no saved waves at {}", waves.wlf.display()),
            ));
            result.settle(Classification::Unknown);
            return Ok(());
        }
        result.diagnostic_artifact = Some(waves.wlf.display().to_string());
        let output = self.tool.run(&self.simulator.view(&waves))?;
        if output.ok() {
            result.settle(Classification::Success);
        } else {
            result.diags.push(JobDiag::new(
                "EVIEW",
                format!("wave viewer exited with status {}", output.exit_status),
            ));
            result.settle(Classification::Error);
        }
        Ok(())
    }

    /// `add wave` commands for a capture run: the custom list when one was
    /// given, otherwise the catalog's default set through the cache.
    fn wave_script(&self, case: &TestCase, target: &SimTarget<'_>) -> String {
        let resolve = |names: &[String]| {
            resolve_signals(self.tool.as_ref(), &self.simulator, target, names)
        };
        if let Some(custom) = &self.config.custom_signals {
            return add_wave_script(&resolve(custom));
        }
        match self.catalog.signal_set_for(case.variant, case.id) {
            Some(decl) => {
                let paths = self.signals.get_or_resolve(case.variant, decl, resolve);
                add_wave_script(&paths)
            }
            None => add_wave_script(&[]),
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

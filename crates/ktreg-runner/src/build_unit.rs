use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use ktreg_catalog::sources::SourceSet;
use ktreg_catalog::{TestId, Variant};
use ktreg_contracts::KTREG_BUILD_STAMP_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::classify::{classify_compile_file, Classification, Markers};
use crate::tool::{ensure_log_written, Simulator, ToolRunner};

/// Logical library name the simulator sees inside a unit directory.
pub const LIBRARY_NAME: &str = "work";
const STAGING_NAME: &str = "staging";
const STAMP_FILE: &str = "build-stamp.json";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilePolicy {
    #[default]
    Always,
    SkipIfFresh,
}

/// Isolated namespace for one (TestId, Variant).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildUnit {
    pub test_id: TestId,
    pub variant: Variant,
    pub dir: PathBuf,
}

impl BuildUnit {
    pub fn library(&self) -> PathBuf {
        self.dir.join(LIBRARY_NAME)
    }

    fn staging(&self) -> PathBuf {
        self.dir.join(STAGING_NAME)
    }

    pub fn stamp_path(&self) -> PathBuf {
        self.dir.join(STAMP_FILE)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStamp {
    pub schema_version: String,
    pub test_id: TestId,
    pub variant: Variant,
    pub compiled_at_unix_ms: u64,
    pub source_digest: String,
    pub source_count: usize,
    pub classification: Classification,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub ok: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    pub classification: Classification,
    pub log_path: String,
}

pub struct BuildUnitManager {
    library_dir: PathBuf,
    compile_logs_dir: PathBuf,
    policy: CompilePolicy,
    simulator: Simulator,
    markers: Markers,
    tool: Arc<dyn ToolRunner>,
    compiles: AtomicUsize,
}

/// Wall-clock milliseconds since the Unix epoch; 0 if the clock is before it.
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn hex_lower(bytes: &[u8]) -> String {
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(LUT[(b >> 4) as usize] as char);
        out.push(LUT[(b & 0x0F) as usize] as char);
    }
    out
}

/// Order-sensitive digest of the compile input list.
pub fn source_digest(files: &[PathBuf]) -> String {
    let mut hasher = Sha256::new();
    for f in files {
        hasher.update(f.to_string_lossy().as_bytes());
        hasher.update(b"\n");
    }
    hex_lower(&hasher.finalize())
}

fn mtime_unix_ms(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_millis() as u64)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("tmp.{}.{n}", std::process::id()));
    std::fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))
}

impl BuildUnitManager {
    pub fn new(
        library_dir: impl Into<PathBuf>,
        compile_logs_dir: impl Into<PathBuf>,
        policy: CompilePolicy,
        simulator: Simulator,
        markers: Markers,
        tool: Arc<dyn ToolRunner>,
    ) -> Self {
        Self {
            library_dir: library_dir.into(),
            compile_logs_dir: compile_logs_dir.into(),
            policy,
            simulator,
            markers,
            tool,
            compiles: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> CompilePolicy {
        self.policy
    }

    /// Number of external compile calls made so far.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn unit(&self, test_id: TestId, variant: Variant) -> BuildUnit {
        BuildUnit {
            test_id,
            variant,
            dir: self
                .library_dir
                .join(variant.as_str())
                .join(format!("TEST_{test_id}")),
        }
    }

    pub fn compile_log_path(&self, test_id: TestId, variant: Variant) -> PathBuf {
        self.compile_logs_dir.join(format!(
            "compilation_{test_id}{}.log",
            variant.artifact_suffix()
        ))
    }

    pub fn read_stamp(&self, unit: &BuildUnit) -> Option<BuildStamp> {
        let bytes = std::fs::read(unit.stamp_path()).ok()?;
        let stamp: BuildStamp = serde_json::from_slice(&bytes).ok()?;
        (stamp.schema_version == KTREG_BUILD_STAMP_SCHEMA_VERSION).then_some(stamp)
    }

    fn is_fresh(&self, unit: &BuildUnit, sources: &SourceSet, digest: &str) -> bool {
        if !unit.library().is_dir() {
            return false;
        }
        let Some(stamp) = self.read_stamp(unit) else {
            return false;
        };
        if stamp.source_digest != digest {
            return false;
        }
        sources.files.iter().all(|f| match mtime_unix_ms(f) {
            Some(m) => m <= stamp.compiled_at_unix_ms,
            None => false,
        })
    }

    /// Compiles `sources` into the unit for (`test_id`, `variant`) unless the
    /// policy allows reuse. A failed compile leaves any previous library and
    /// stamp untouched. `Err` is reserved for I/O and spawn failures; compiler
    /// errors come back as `ok == false`.
    pub fn ensure_compiled(
        &self,
        test_id: TestId,
        variant: Variant,
        sources: &SourceSet,
    ) -> Result<CompileOutcome> {
        let unit = self.unit(test_id, variant);
        let log_path = self.compile_log_path(test_id, variant);
        let digest = source_digest(&sources.files);

        if self.policy == CompilePolicy::SkipIfFresh && self.is_fresh(&unit, sources, &digest) {
            debug!(unit = %unit.dir.display(), "build unit is fresh; skipping compile");
            let classification = self
                .read_stamp(&unit)
                .map(|s| s.classification)
                .unwrap_or(Classification::Success);
            return Ok(CompileOutcome {
                ok: true,
                skipped: true,
                exit_status: None,
                classification,
                log_path: log_path.display().to_string(),
            });
        }

        std::fs::create_dir_all(&unit.dir)
            .with_context(|| format!("create build unit: {}", unit.dir.display()))?;
        std::fs::create_dir_all(&self.compile_logs_dir).with_context(|| {
            format!("create compile log dir: {}", self.compile_logs_dir.display())
        })?;
        let staging = unit.staging();
        if staging.exists() {
            std::fs::remove_dir_all(&staging)
                .with_context(|| format!("remove stale staging: {}", staging.display()))?;
        }
        if log_path.exists() {
            std::fs::remove_file(&log_path)
                .with_context(|| format!("remove old compile log: {}", log_path.display()))?;
        }

        let invocation = self
            .simulator
            .compile(&unit.dir, STAGING_NAME, &sources.files, &log_path);
        self.compiles.fetch_add(1, Ordering::SeqCst);
        info!(test_id, variant = %variant, files = sources.files.len(), "compiling");
        let output = self.tool.run(&invocation)?;
        ensure_log_written(&log_path, &output)?;

        let classification = match classify_compile_file(&log_path, &self.markers) {
            Ok(c) => c,
            Err(msg) => {
                warn!(test_id, variant = %variant, "{msg}");
                Classification::Unknown
            }
        };
        let ok = output.ok()
            && matches!(
                classification,
                Classification::Success | Classification::Warning
            );

        if ok {
            self.promote_staging(&unit)?;
            let stamp = BuildStamp {
                schema_version: KTREG_BUILD_STAMP_SCHEMA_VERSION.to_string(),
                test_id,
                variant,
                compiled_at_unix_ms: now_unix_ms(),
                source_digest: digest,
                source_count: sources.files.len(),
                classification,
            };
            let mut bytes = serde_json::to_vec_pretty(&stamp)?;
            bytes.push(b'\n');
            write_atomic(&unit.stamp_path(), &bytes)?;
            if classification == Classification::Warning {
                warn!(test_id, variant = %variant, log = %log_path.display(), "compiled with warnings");
            }
        } else {
            warn!(
                test_id,
                variant = %variant,
                exit_status = output.exit_status,
                log = %log_path.display(),
                "compilation failed"
            );
            let _ = std::fs::remove_dir_all(&staging);
        }

        Ok(CompileOutcome {
            ok,
            skipped: false,
            exit_status: Some(output.exit_status),
            classification,
            log_path: log_path.display().to_string(),
        })
    }

    fn promote_staging(&self, unit: &BuildUnit) -> Result<()> {
        let staging = unit.staging();
        if !staging.is_dir() {
            anyhow::bail!(
                "compiler reported success but produced no library at {}",
                staging.display()
            );
        }
        let library = unit.library();
        let retired = unit.dir.join(format!("{LIBRARY_NAME}.old"));
        if retired.exists() {
            std::fs::remove_dir_all(&retired)
                .with_context(|| format!("remove {}", retired.display()))?;
        }
        if library.exists() {
            std::fs::rename(&library, &retired)
                .with_context(|| format!("retire library: {}", library.display()))?;
        }
        std::fs::rename(&staging, &library)
            .with_context(|| format!("promote staging library: {}", staging.display()))?;
        let _ = std::fs::remove_dir_all(&retired);
        Ok(())
    }
}

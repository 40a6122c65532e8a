use std::path::Path;

use anyhow::{Context, Result};
use ktreg_contracts::KTREG_REPORT_SCHEMA_VERSION;
use ktreg_runner::{Classification, JobResult, JobStatus};
use serde::{Deserialize, Serialize};

/// Exit code when any selected test failed to compile.
pub const EXIT_COMPILE_FAILURE: u8 = 11;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KtregReport {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub invocation: InvocationInfo,
    pub summary: Summary,
    pub tests: Vec<JobResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl Default for ToolInfo {
    fn default() -> Self {
        Self {
            name: "ktreg".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationInfo {
    pub argv: Vec<String>,
    pub cwd: String,
    pub root: String,
    pub started_at_unix_ms: u64,
    pub jobs: usize,
    pub mode: String,
    pub variant: String,
    pub simulator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,
    #[serde(default)]
    pub isolated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: u64,
    pub failed: u64,
    pub unknown: u64,
    pub compile_failures: u64,
    pub compile_warnings: u64,
    pub duration_ms: u64,
}

impl Summary {
    pub fn from_results(results: &[JobResult], duration_ms: u64) -> Self {
        let mut s = Summary {
            duration_ms,
            ..Summary::default()
        };
        for r in results {
            match r.status {
                JobStatus::Succeeded => s.passed += 1,
                JobStatus::Failed => s.failed += 1,
                JobStatus::Unknown => s.unknown += 1,
            }
            if let Some(c) = &r.compile {
                if !c.ok {
                    s.compile_failures += 1;
                } else if c.classification == Classification::Warning {
                    s.compile_warnings += 1;
                }
            }
        }
        s
    }
}

impl KtregReport {
    pub fn new(invocation: InvocationInfo, mut tests: Vec<JobResult>, duration_ms: u64) -> Self {
        tests.sort_by_key(|t| (t.variant, t.id));
        Self {
            schema_version: KTREG_REPORT_SCHEMA_VERSION.to_string(),
            tool: ToolInfo::default(),
            summary: Summary::from_results(&tests, duration_ms),
            invocation,
            tests,
        }
    }
}

/// Classification failures alone never fail the process.
pub fn compute_exit_code(report: &KtregReport) -> u8 {
    if report.summary.compile_failures > 0 {
        return EXIT_COMPILE_FAILURE;
    }
    0
}

fn text_line(t: &JobResult) -> String {
    let mut line = format!("{}\t{}/{}\t{}", t.status.as_str(), t.variant, t.id, t.category);
    if t.status != JobStatus::Succeeded {
        if let Some(log) = &t.log_path {
            line.push_str(&format!("\tlog={log}"));
        }
        if let Some(art) = &t.diagnostic_artifact {
            line.push_str(&format!("\twaves={art}"));
        }
        if let Some(d) = t.diags.first() {
            line.push_str(&format!("\t{}: {}", d.code, d.message));
        }
    }
    line
}

pub fn write_report_and_exit(
    report: &KtregReport,
    json: bool,
    report_out: Option<&Path>,
) -> Result<std::process::ExitCode> {
    let exit_code = compute_exit_code(report);
    let rendered = serde_json::to_string(report)? + "\n";

    if let Some(out_path) = report_out {
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report dir: {}", parent.display()))?;
        }
        std::fs::write(out_path, rendered.as_bytes())
            .with_context(|| format!("write report: {}", out_path.display()))?;
        eprintln!(
            "ktreg: passed={} failed={} unknown={} compile_failures={} (exit={})",
            report.summary.passed,
            report.summary.failed,
            report.summary.unknown,
            report.summary.compile_failures,
            exit_code
        );
    }

    if json {
        print!("{rendered}");
    } else {
        for t in &report.tests {
            println!("{}", text_line(t));
        }
        println!(
            "summary: passed={} failed={} unknown={} compile_failures={} compile_warnings={} duration_ms={} (exit={})",
            report.summary.passed,
            report.summary.failed,
            report.summary.unknown,
            report.summary.compile_failures,
            report.summary.compile_warnings,
            report.summary.duration_ms,
            exit_code
        );
    }

    Ok(std::process::ExitCode::from(exit_code))
}

use std::path::PathBuf;
use std::process::{Command, ExitCode, Stdio};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use ktreg_catalog::sources::SourceTree;
use ktreg_catalog::{Catalog, TestCase, TestId, Variant, VariantSelector};
use ktreg_runner::{
    now_unix_ms, prepare_shared_sources, run_jobs, CompilePolicy, JobResult, JobRunner,
    ProcessTool, RunMode, RunnerConfig, DEFAULT_JOBS,
};
use tracing::{info, warn};

use crate::project::{load_project, Project, ProjectArgs};
use crate::report::{write_report_and_exit, InvocationInfo, KtregReport};
use crate::util::display_path;

#[derive(Debug, Clone, Args)]
pub struct TestArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Run a single test.
    #[arg(short = 'n', long = "number", value_name = "ID", conflicts_with = "range")]
    pub number: Option<TestId>,

    /// Run an inclusive range of tests.
    #[arg(short = 'r', long, num_args = 2, value_names = ["START", "END"])]
    pub range: Option<Vec<TestId>>,

    /// cmd, save, gui or view (0-3 also accepted).
    #[arg(short = 'm', long, default_value = "cmd", value_name = "MODE")]
    pub mode: RunMode,

    #[arg(long, value_enum, default_value = "main")]
    pub variant: VariantSelector,

    /// Signals to record instead of the catalog's per-test sets.
    #[arg(short = 's', long = "signals", num_args = 1.., value_name = "SIGNAL")]
    pub signals: Vec<String>,

    /// Maximum number of concurrent jobs.
    #[arg(short = 'j', long, default_value_t = DEFAULT_JOBS)]
    pub jobs: usize,

    /// Reuse a build unit whose sources have not changed since its last compile.
    #[arg(long)]
    pub skip_fresh: bool,

    /// Run each variant in its own child process and merge the reports.
    #[arg(long)]
    pub isolate_variants: bool,

    /// Print the machine-readable report on stdout.
    #[arg(long, action = ArgAction::Set, default_value = "false", value_name = "BOOL")]
    pub json: bool,

    /// Also write the JSON report to this file.
    #[arg(long, value_name = "PATH")]
    pub report_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Single(TestId),
    Range(TestId, TestId),
    All,
}

impl TestArgs {
    pub fn selection(&self) -> Result<Selection> {
        if let Some(id) = self.number {
            return Ok(Selection::Single(id));
        }
        match self.range.as_deref() {
            Some(&[start, end]) => {
                if start > end {
                    anyhow::bail!("invalid range: start {start} is greater than end {end}");
                }
                Ok(Selection::Range(start, end))
            }
            Some(other) => anyhow::bail!("--range takes exactly two ids, got {}", other.len()),
            None => Ok(Selection::All),
        }
    }
}

/// Expands a selection into concrete cases. A single id that no selected
/// variant catalogues is a setup error; an empty range is not.
pub fn select_cases(
    catalog: &Catalog,
    selection: Selection,
    variants: &[Variant],
) -> Result<Vec<TestCase>> {
    match selection {
        Selection::Single(id) => {
            let cases: Vec<TestCase> = variants
                .iter()
                .filter_map(|&v| catalog.lookup(v, id))
                .collect();
            if cases.is_empty() {
                let names: Vec<&str> = variants.iter().map(|v| v.as_str()).collect();
                anyhow::bail!("unknown test id {id} for variant(s) {}", names.join(", "));
            }
            Ok(cases)
        }
        Selection::Range(start, end) => Ok(catalog.cases_in_range(variants, start, end)),
        Selection::All => Ok(catalog.all_cases(variants)),
    }
}

fn invocation(args: &TestArgs, project: &Project, started_at_unix_ms: u64) -> InvocationInfo {
    InvocationInfo {
        argv: std::env::args().collect(),
        cwd: std::env::current_dir()
            .map(display_path)
            .unwrap_or_default(),
        root: display_path(&project.root),
        started_at_unix_ms,
        jobs: args.jobs,
        mode: args.mode.as_str().to_string(),
        variant: args.variant.as_str().to_string(),
        simulator: project.simulator.clone(),
        manifest_path: project.manifest_path.as_ref().map(display_path),
        isolated: args.isolate_variants,
    }
}

pub fn cmd_test(args: TestArgs, verbose: bool) -> Result<ExitCode> {
    let project = load_project(&args.project)?;
    let selection = args.selection()?;
    let started_at = now_unix_ms();
    let clock = Instant::now();

    let results = if args.isolate_variants && args.variant.variants().len() > 1 {
        run_isolated(&args, &project, selection, verbose)?
    } else {
        run_in_process(&args, &project, selection)?
    };

    let report = KtregReport::new(
        invocation(&args, &project, started_at),
        results,
        clock.elapsed().as_millis() as u64,
    );
    write_report_and_exit(&report, args.json, args.report_out.as_deref())
}

fn run_in_process(args: &TestArgs, project: &Project, selection: Selection) -> Result<Vec<JobResult>> {
    let cases = select_cases(&project.catalog, selection, args.variant.variants())?;
    if cases.is_empty() {
        warn!("selection matched no catalogued tests");
        return Ok(Vec::new());
    }

    let mut config = RunnerConfig::for_root(&project.root);
    config.simulator = project.simulator.clone();
    config.mode = args.mode;
    config.policy = if args.skip_fresh {
        CompilePolicy::SkipIfFresh
    } else {
        CompilePolicy::Always
    };
    config.custom_signals = (!args.signals.is_empty()).then(|| args.signals.clone());
    config.markers = project.markers.clone();

    let shared = prepare_shared_sources(
        &SourceTree::new(&project.root),
        &project.catalog,
        &cases,
        args.mode,
    )?;
    let runner = JobRunner::new(config, Arc::clone(&project.catalog), shared, Arc::new(ProcessTool))?;

    info!(
        tests = cases.len(),
        jobs = args.jobs,
        mode = %args.mode,
        simulator = %project.simulator,
        "starting regression"
    );
    let results = run_jobs(&runner, &cases, args.jobs);
    info!(compiles = runner.build_units().compile_count(), "regression finished");
    Ok(results)
}

fn child_args(args: &TestArgs, project: &Project, variant: Variant, verbose: bool) -> Vec<String> {
    let mut out = vec![
        "test".to_string(),
        "--variant".to_string(),
        variant.as_str().to_string(),
        "--json".to_string(),
        "true".to_string(),
        "-m".to_string(),
        args.mode.as_str().to_string(),
        "-j".to_string(),
        args.jobs.to_string(),
        "--root".to_string(),
        display_path(&project.root),
    ];
    if let Some(m) = &project.manifest_path {
        out.push("--manifest".to_string());
        out.push(display_path(m));
    }
    if let Some(id) = args.number {
        out.push("-n".to_string());
        out.push(id.to_string());
    }
    if let Some(range) = &args.range {
        out.push("-r".to_string());
        out.extend(range.iter().map(|id| id.to_string()));
    }
    if args.skip_fresh {
        out.push("--skip-fresh".to_string());
    }
    if !args.signals.is_empty() {
        out.push("-s".to_string());
        out.extend(args.signals.iter().cloned());
    }
    if verbose {
        out.push("-v".to_string());
    }
    out
}

/// One child process per variant, run concurrently. A child that hits a setup
/// error (exit 2) aborts the whole run; classification and compile failures
/// come back inside its report.
fn run_isolated(
    args: &TestArgs,
    project: &Project,
    selection: Selection,
    verbose: bool,
) -> Result<Vec<JobResult>> {
    let variants = args.variant.variants();
    if let Selection::Single(id) = selection {
        // Fails fast with the same message an in-process run would give.
        select_cases(&project.catalog, selection, variants)
            .with_context(|| format!("selecting test {id}"))?;
    }
    let exe = std::env::current_exe().context("locate ktreg executable")?;

    let outcomes: Vec<(Variant, Result<Vec<JobResult>>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = variants
            .iter()
            .filter(|&&v| !select_cases(&project.catalog, selection, &[v]).map_or(true, |c| c.is_empty()))
            .map(|&variant| {
                let argv = child_args(args, project, variant, verbose);
                let exe = exe.clone();
                let handle = scope.spawn(move || run_child(&exe, &argv, variant));
                (variant, handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(variant, h)| {
                let r = h
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("variant {variant} supervisor panicked")));
                (variant, r)
            })
            .collect()
    });

    let mut merged = Vec::new();
    for (variant, outcome) in outcomes {
        let tests = outcome.with_context(|| format!("variant {variant}"))?;
        merged.extend(tests);
    }
    Ok(merged)
}

fn run_child(exe: &std::path::Path, argv: &[String], variant: Variant) -> Result<Vec<JobResult>> {
    info!(%variant, "spawning isolated variant run");
    let out = Command::new(exe)
        .args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .with_context(|| format!("spawn {}", exe.display()))?;
    let code = out.status.code();
    if code == Some(2) || code.is_none() {
        anyhow::bail!(
            "isolated run failed with {}",
            code.map_or_else(|| "a signal".to_string(), |c| format!("exit code {c}"))
        );
    }
    let report: KtregReport = serde_json::from_slice(&out.stdout)
        .context("parse isolated run report")?;
    Ok(report.tests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: TestArgs,
    }

    fn parse(argv: &[&str]) -> TestArgs {
        let mut full = vec!["ktreg"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn flags_parse_with_defaults() {
        let a = parse(&[]);
        assert_eq!(a.mode, RunMode::Cmd);
        assert_eq!(a.variant, VariantSelector::Main);
        assert_eq!(a.jobs, DEFAULT_JOBS);
        assert!(!a.json);
        assert_eq!(a.selection().unwrap(), Selection::All);

        let a = parse(&["-m", "1", "--variant", "both", "-r", "3", "9", "--json", "true"]);
        assert_eq!(a.mode, RunMode::Save);
        assert_eq!(a.variant, VariantSelector::Both);
        assert!(a.json);
        assert_eq!(a.selection().unwrap(), Selection::Range(3, 9));

        let a = parse(&["-n", "4", "-s", "iDUT.x", "iDUT.y"]);
        assert_eq!(a.selection().unwrap(), Selection::Single(4));
        assert_eq!(a.signals, vec!["iDUT.x", "iDUT.y"]);
    }

    #[test]
    fn number_and_range_conflict() {
        let argv = ["ktreg", "-n", "1", "-r", "1", "2"];
        assert!(Harness::try_parse_from(argv).is_err());
        assert!(Harness::try_parse_from(["ktreg", "-m", "turbo"]).is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(parse(&["-r", "9", "3"]).selection().is_err());
    }

    #[test]
    fn selection_expands_against_the_catalog() {
        let catalog = Catalog::builtin();
        let both = [Variant::Main, Variant::Extra];
        assert_eq!(select_cases(&catalog, Selection::All, &both).unwrap().len(), 38);
        assert_eq!(
            select_cases(&catalog, Selection::Single(15), &both).unwrap().len(),
            2
        );
        assert!(select_cases(&catalog, Selection::Single(99), &[Variant::Main]).is_err());
        assert!(select_cases(&catalog, Selection::Range(40, 50), &[Variant::Main])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn child_argv_forwards_the_selection() {
        let args = parse(&["-r", "2", "5", "--skip-fresh", "-s", "a"]);
        let project = Project {
            root: PathBuf::from("/proj"),
            catalog: Arc::new(Catalog::builtin()),
            simulator: "vsim".to_string(),
            markers: Default::default(),
            manifest_path: None,
        };
        let argv = child_args(&args, &project, Variant::Extra, false);
        assert_eq!(
            argv,
            vec![
                "test", "--variant", "extra", "--json", "true", "-m", "cmd", "-j", "8", "--root",
                "/proj", "-r", "2", "5", "--skip-fresh", "-s", "a",
            ]
        );
    }
}

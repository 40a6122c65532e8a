use std::path::{Path, PathBuf};
use std::process::Command;

use ktreg_contracts::{ENV_SIMULATOR, KTREG_CATALOG_SCHEMA_VERSION, KTREG_REPORT_SCHEMA_VERSION};
use serde_json::Value;

fn ktreg(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ktreg"));
    cmd.args(args).env_remove(ENV_SIMULATOR).env_remove("RUST_LOG");
    cmd
}

fn run(cmd: &mut Command) -> std::process::Output {
    cmd.output().expect("run ktreg")
}

fn stdout(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn parse_json_stdout(out: &std::process::Output) -> Value {
    serde_json::from_slice(&out.stdout).expect("parse stdout JSON")
}

fn write_bytes(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, bytes).expect("write file");
}

/// Minimal design tree: one RTL file, one shared testbench file and the
/// move-category testbenches 2..=4.
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write_bytes(&root.join("designs/KnightsTour.sv"), b"module KnightsTour; endmodule\n");
    write_bytes(&root.join("tests/tb_tasks.sv"), b"// tasks\n");
    for id in 2..=4 {
        write_bytes(
            &root.join(format!("tests/move/KnightsTour_tb_{id}.sv")),
            b"module KnightsTour_tb; endmodule\n",
        );
    }
    dir
}

/// Stand-in simulator. Compiles create the library directory; simulations
/// print a passing transcript unless the unit's test id is listed in
/// `FAKE_FAIL` (or `FAKE_COMPILE_ERROR` for compiles).
#[cfg(unix)]
fn fake_vsim(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-vsim.sh");
    let script = r##"#!/bin/sh
id=$(basename "$(pwd -P)" | sed 's/^TEST_//')
case "$*" in
  *vlog*)
    if [ "$id" = "$FAKE_COMPILE_ERROR" ]; then
      echo "** Error: KnightsTour.sv(3): near \"endmodule\": syntax error"
      echo "Error: compilation failed"
      exit 2
    fi
    mkdir -p staging
    echo "-- Compiling module KnightsTour"
    exit 0
    ;;
esac
prev=""
for a in "$@"; do
  if [ "$prev" = "-wlf" ]; then : > "$a"; fi
  prev="$a"
done
if [ "$id" = "$FAKE_FAIL" ]; then
  echo "# ERROR: robot never reached the square"
else
  echo "# YAHOO!! All tests passed."
fi
exit 0
"##;
    std::fs::write(&path, script).expect("write fake vsim");
    let mut perms = std::fs::metadata(&path).expect("stat").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

#[test]
fn solve_prints_the_reference_tour() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out_path = dir.path().join("tour.txt");
    let out = run(&mut ktreg(&["solve", "0", "0", "--out", out_path.to_str().unwrap()]));
    assert_eq!(out.status.code(), Some(0));

    let text = stdout(&out);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Solution Found!");
    assert_eq!(lines.len(), 26);
    assert_eq!(lines[1], "(0, 0)");
    assert_eq!(lines[2], "(1, 2)");

    let written = std::fs::read_to_string(&out_path).expect("read tour file");
    assert_eq!(written.lines().count(), 25);
    assert_eq!(written.lines().next(), Some("(0, 0)"));
}

#[test]
fn solve_reports_missing_tour_and_bad_input() {
    let out = run(&mut ktreg(&["solve", "0", "1"]));
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout(&out).trim(), "No solution exists.");

    let out = run(&mut ktreg(&["solve", "0", "1", "--json", "true"]));
    assert_eq!(out.status.code(), Some(1));
    let v = parse_json_stdout(&out);
    assert_eq!(v["ok"], false);
    assert!(v.get("path").is_none());

    let out = run(&mut ktreg(&["solve", "7", "0"]));
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("outside"));
}

#[test]
fn solve_refuses_boards_beyond_the_search_limit() {
    let out = run(&mut ktreg(&["solve", "0", "0", "--rows", "1000", "--cols", "1000"]));
    assert_eq!(out.status.code(), Some(2));
    assert!(
        String::from_utf8_lossy(&out.stderr).contains("search limit"),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );

    let huge = usize::MAX.to_string();
    let out = run(&mut ktreg(&["solve", "0", "0", "--rows", &huge, "--cols", "2"]));
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn list_shows_both_variants_of_the_builtin_catalog() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_str().unwrap();
    let out = run(&mut ktreg(&["list", "--root", root, "--json", "true"]));
    assert_eq!(out.status.code(), Some(0));
    let v = parse_json_stdout(&out);
    let tests = v.as_array().expect("array");
    assert_eq!(tests.len(), 38);
    assert_eq!(tests[0]["variant"], "main");
    assert_eq!(tests[0]["category"], "simple");
    assert_eq!(tests[37]["variant"], "extra");
    assert_eq!(tests[37]["id"], 18);
    assert_eq!(tests[37]["verified_by_oracle"], true);
}

#[test]
fn catalog_check_validates_the_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = dir.path().join("ktreg.json");

    write_bytes(
        &manifest,
        format!(r#"{{"schema_version":"{KTREG_CATALOG_SCHEMA_VERSION}"}}"#).as_bytes(),
    );
    let out = run(&mut ktreg(&["catalog", "check", "--manifest", manifest.to_str().unwrap()]));
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout(&out).contains("main: simple 0-1, move 2-14, logic 15-18"));

    write_bytes(
        &manifest,
        br#"{"schema_version":"ktreg.catalog@9","variants":{"main":{"categories":[{"name":"a","first":0,"last":3},{"name":"b","first":5,"last":7}]}}}"#,
    );
    let out = run(&mut ktreg(&["catalog", "check", "--manifest", manifest.to_str().unwrap()]));
    assert_eq!(out.status.code(), Some(1));
    let text = stdout(&out);
    assert!(text.contains("ECAT_SCHEMA_VERSION"), "{text}");

    // A broken manifest is a setup error for every other command.
    let root = dir.path().to_str().unwrap();
    let out = run(&mut ktreg(&["list", "--root", root]));
    assert_eq!(out.status.code(), Some(2));
}

#[cfg(unix)]
#[test]
fn test_run_reports_each_test_and_captures_failures() {
    let proj = project();
    let vsim = fake_vsim(proj.path());
    let root = proj.path().to_str().unwrap();
    let report_path = proj.path().join("out/report.json");

    let out = run(ktreg(&[
        "test",
        "-r",
        "2",
        "4",
        "--root",
        root,
        "--json",
        "true",
        "--report-out",
        report_path.to_str().unwrap(),
    ])
    .env(ENV_SIMULATOR, &vsim)
    .env("FAKE_FAIL", "3"));
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );

    let v = parse_json_stdout(&out);
    assert_eq!(v["schema_version"], KTREG_REPORT_SCHEMA_VERSION);
    assert_eq!(v["summary"]["passed"], 2);
    assert_eq!(v["summary"]["failed"], 1);
    let tests = v["tests"].as_array().expect("tests");
    let ids: Vec<u64> = tests.iter().map(|t| t["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![2, 3, 4]);
    assert_eq!(tests[1]["status"], "failed");
    assert_eq!(tests[1]["classification"], "error");
    let waves = tests[1]["diagnostic_artifact"].as_str().expect("waves captured");
    assert!(Path::new(waves).is_file(), "{waves}");

    assert!(proj.path().join("output/logs/KnightsTour_tb_2.log").is_file());
    assert!(proj.path().join("output/logs/compilation/compilation_2.log").is_file());
    let saved: Value =
        serde_json::from_slice(&std::fs::read(&report_path).expect("report file")).unwrap();
    assert_eq!(saved["summary"], v["summary"]);
}

#[cfg(unix)]
#[test]
fn compile_failure_sets_exit_code_11() {
    let proj = project();
    let vsim = fake_vsim(proj.path());
    let root = proj.path().to_str().unwrap();

    let out = run(ktreg(&["test", "-r", "2", "4", "--root", root])
        .env(ENV_SIMULATOR, &vsim)
        .env("FAKE_COMPILE_ERROR", "4"));
    assert_eq!(out.status.code(), Some(11));
    let text = stdout(&out);
    assert!(text.contains("pass\tmain/2\tmove"), "{text}");
    assert!(text.contains("fail\tmain/4\tmove"), "{text}");
    assert!(text.contains("ECOMPILE"), "{text}");
    assert!(text.contains("compile_failures=1"), "{text}");
}

#[cfg(unix)]
#[test]
fn isolated_variants_merge_into_one_report() {
    let proj = project();
    for id in 2..=4 {
        write_bytes(
            &proj.path().join(format!("tests/extra/move/KnightsTour_tb_{id}.sv")),
            b"module KnightsTour_tb; endmodule\n",
        );
    }
    let vsim = fake_vsim(proj.path());
    let root = proj.path().to_str().unwrap();

    let out = run(ktreg(&[
        "test",
        "--variant",
        "both",
        "--isolate-variants",
        "--json",
        "true",
        "-r",
        "2",
        "4",
        "--root",
        root,
    ])
    .env(ENV_SIMULATOR, &vsim)
    .env("FAKE_FAIL", "3"));
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );

    let v = parse_json_stdout(&out);
    assert_eq!(v["invocation"]["isolated"], true);
    assert_eq!(v["invocation"]["variant"], "both");
    assert!(v["invocation"]["started_at_unix_ms"].as_u64().unwrap() > 0);
    assert_eq!(v["summary"]["passed"], 4);
    assert_eq!(v["summary"]["failed"], 2);
    let tests = v["tests"].as_array().expect("tests");
    let keys: Vec<(String, u64)> = tests
        .iter()
        .map(|t| (t["variant"].as_str().unwrap().to_string(), t["id"].as_u64().unwrap()))
        .collect();
    let expected: Vec<(String, u64)> = ["main", "extra"]
        .iter()
        .flat_map(|v| (2..=4).map(move |id| (v.to_string(), id)))
        .collect();
    assert_eq!(keys, expected);
    for t in tests.iter().filter(|t| t["id"] == 3) {
        assert_eq!(t["status"], "failed", "{t}");
    }
}

#[cfg(unix)]
#[test]
fn isolated_child_setup_error_fails_the_run() {
    let proj = project();
    let vsim = fake_vsim(proj.path());
    // Main only holds the post-synthesis test, which needs no design tree;
    // extra needs the (missing) design files and fails during setup.
    std::fs::remove_dir_all(proj.path().join("designs")).expect("remove designs");
    let manifest = proj.path().join("ktreg.json");
    write_bytes(
        &manifest,
        format!(
            r#"{{"schema_version":"{KTREG_CATALOG_SCHEMA_VERSION}","variants":{{
                "main":{{"categories":[{{"name":"netlist","first":0,"last":0}}]}},
                "extra":{{"categories":[{{"name":"simple","first":0,"last":1}},{{"name":"move","first":2,"last":4}}]}}
            }}}}"#
        )
        .as_bytes(),
    );
    let root = proj.path().to_str().unwrap();

    let out = run(ktreg(&[
        "test",
        "--variant",
        "both",
        "--isolate-variants",
        "--json",
        "true",
        "--root",
        root,
        "--manifest",
        manifest.to_str().unwrap(),
    ])
    .env(ENV_SIMULATOR, &vsim));
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("variant extra"), "{stderr}");
    assert!(stderr.contains("isolated run failed with exit code 2"), "{stderr}");
    assert!(out.stdout.is_empty());
}

#[test]
fn unknown_test_id_is_a_setup_error() {
    let proj = project();
    let root = proj.path().to_str().unwrap();
    let out = run(&mut ktreg(&["test", "-n", "99", "--root", root]));
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown test id 99"));

    let out = run(&mut ktreg(&["test", "-m", "fast", "--root", root]));
    assert_eq!(out.status.code(), Some(2));
}

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use serde::Serialize;

const WAVE_WINDOW: &str = ".main_pane.wave.interior.cs.body.pw.wf";

/// What an invocation is for; carried into logs and used by test fakes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPurpose {
    Compile,
    Simulate,
    Capture,
    Gui,
    View,
    FindSignals,
}

impl ToolPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolPurpose::Compile => "compile",
            ToolPurpose::Simulate => "simulate",
            ToolPurpose::Capture => "capture",
            ToolPurpose::Gui => "gui",
            ToolPurpose::View => "view",
            ToolPurpose::FindSignals => "find_signals",
        }
    }
}

/// One external simulator call. The working directory is always explicit;
/// nothing in the runner changes the process-wide cwd.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    pub purpose: ToolPurpose,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub log_path: Option<PathBuf>,
}

impl ToolInvocation {
    /// The `-do` script argument, if any.
    pub fn do_script(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == "-do")
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.contains(char::is_whitespace) {
                out.push('"');
                out.push_str(arg);
                out.push('"');
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

#[derive(Clone, Debug, Default)]
pub struct ToolOutput {
    pub exit_status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn ok(&self) -> bool {
        self.exit_status == 0
    }
}

/// Seam between the runner and the simulator binary.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Runs invocations as child processes.
#[derive(Clone, Debug, Default)]
pub struct ProcessTool;

impl ToolRunner for ProcessTool {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.current_dir(&invocation.cwd);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "spawn {} for {} in {}",
                invocation.program,
                invocation.purpose.as_str(),
                invocation.cwd.display()
            )
        })?;

        let mut stdout = child.stdout.take().context("take stdout")?;
        let mut stderr = child.stderr.take().context("take stderr")?;
        let stdout_thread = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf)?;
            Ok(buf)
        });
        let stderr_thread = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf)?;
            Ok(buf)
        });

        let status = child
            .wait()
            .with_context(|| format!("wait for {}", invocation.program))?;
        let stdout = stdout_thread.join().unwrap_or_else(|_| Ok(Vec::new()))?;
        let stderr = stderr_thread.join().unwrap_or_else(|_| Ok(Vec::new()))?;

        #[cfg(unix)]
        let exit_signal = {
            use std::os::unix::process::ExitStatusExt as _;
            status.signal()
        };
        #[cfg(not(unix))]
        let exit_signal: Option<i32> = None;

        let exit_status = match status.code() {
            Some(code) => code,
            None => exit_signal.map(|s| 128 + s).unwrap_or(1),
        };
        Ok(ToolOutput {
            exit_status,
            stdout,
            stderr,
        })
    }
}

/// Builds simulator command lines. Library and top-level names are resolved
/// relative to the invocation's working directory (the build unit).
#[derive(Clone, Debug)]
pub struct Simulator {
    pub program: String,
    pub top: String,
}

/// Arguments shared by every run of an already-compiled library.
#[derive(Clone, Debug)]
pub struct SimTarget<'a> {
    pub unit_dir: &'a Path,
    pub library: &'a str,
    /// Cell library for gate-level runs; adds the timescale and `-L` flags.
    pub cell_library: Option<&'a Path>,
}

impl Simulator {
    pub fn new(program: impl Into<String>, top: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            top: top.into(),
        }
    }

    fn invocation(
        &self,
        purpose: ToolPurpose,
        cwd: &Path,
        args: Vec<String>,
        log_path: Option<&Path>,
    ) -> ToolInvocation {
        ToolInvocation {
            purpose,
            program: self.program.clone(),
            args,
            cwd: cwd.to_path_buf(),
            log_path: log_path.map(Path::to_path_buf),
        }
    }

    fn design_unit(&self, target: &SimTarget<'_>) -> String {
        format!("{}.{}", target.library, self.top)
    }

    fn gate_level_args(target: &SimTarget<'_>, args: &mut Vec<String>) {
        if let Some(lib) = target.cell_library {
            let lib = lib.display().to_string();
            args.extend([
                "-t".to_string(),
                "ns".to_string(),
                "-L".to_string(),
                lib.clone(),
                "-Lf".to_string(),
                lib,
            ]);
        }
    }

    pub fn compile(
        &self,
        unit_dir: &Path,
        library: &str,
        files: &[PathBuf],
        log_path: &Path,
    ) -> ToolInvocation {
        let mut script = format!("vlog -work {library} -vopt -stats=none");
        for f in files {
            script.push(' ');
            script.push_str(&f.display().to_string());
        }
        script.push_str("; quit -f;");
        let args = vec![
            "-c".to_string(),
            "-logfile".to_string(),
            log_path.display().to_string(),
            "-do".to_string(),
            script,
        ];
        self.invocation(ToolPurpose::Compile, unit_dir, args, Some(log_path))
    }

    pub fn simulate(&self, target: &SimTarget<'_>, log_path: &Path) -> ToolInvocation {
        let mut args = vec![
            "-c".to_string(),
            self.design_unit(target),
            "-logfile".to_string(),
            log_path.display().to_string(),
        ];
        Self::gate_level_args(target, &mut args);
        if target.cell_library.is_some() {
            args.push("-voptargs=+acc".to_string());
        }
        args.push("-do".to_string());
        args.push("run -all; log -flush /*; quit -f;".to_string());
        self.invocation(ToolPurpose::Simulate, target.unit_dir, args, Some(log_path))
    }

    /// Waveform-recording run. Batch captures quit when done; interactive
    /// sessions stay open until the user closes them.
    pub fn capture(
        &self,
        target: &SimTarget<'_>,
        log_path: &Path,
        wave: &WaveArtifacts,
        add_wave: &str,
        interactive: bool,
    ) -> ToolInvocation {
        let mut args = Vec::new();
        if !interactive {
            args.push("-c".to_string());
        }
        args.extend([
            "-wlf".to_string(),
            wave.wlf.display().to_string(),
            self.design_unit(target),
            "-voptargs=+acc".to_string(),
            "-logfile".to_string(),
            log_path.display().to_string(),
        ]);
        Self::gate_level_args(target, &mut args);

        let mut script = String::new();
        if !add_wave.is_empty() {
            script.push_str(add_wave);
            script.push(' ');
        }
        script.push_str(&format!(
            "run -all; write format wave -window {WAVE_WINDOW} {}; log -flush /*;",
            wave.format.display()
        ));
        if !interactive {
            script.push_str(" quit -f;");
        }
        args.push("-do".to_string());
        args.push(script);

        let purpose = if interactive {
            ToolPurpose::Gui
        } else {
            ToolPurpose::Capture
        };
        self.invocation(purpose, target.unit_dir, args, Some(log_path))
    }

    /// Opens saved waves; runs inside the waves directory so the format
    /// script's relative references resolve.
    pub fn view(&self, wave: &WaveArtifacts) -> ToolInvocation {
        let cwd = wave
            .wlf
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let args = vec![
            "-view".to_string(),
            file_name(&wave.wlf),
            "-do".to_string(),
            file_name(&wave.format),
        ];
        self.invocation(ToolPurpose::View, &cwd, args, None)
    }

    pub fn find_signals(&self, target: &SimTarget<'_>, name: &str) -> ToolInvocation {
        let args = vec![
            "-c".to_string(),
            self.design_unit(target),
            "-do".to_string(),
            format!(
                "find signals /{}/{name}* -recursive; quit -f;",
                self.top
            ),
        ];
        self.invocation(ToolPurpose::FindSignals, target.unit_dir, args, None)
    }
}

/// Waveform database plus the wave-window format script saved beside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveArtifacts {
    pub wlf: PathBuf,
    pub format: PathBuf,
}

impl WaveArtifacts {
    pub fn for_stem(waves_dir: &Path, stem: &str) -> Self {
        Self {
            wlf: waves_dir.join(format!("{stem}.wlf")),
            format: waves_dir.join(format!("{stem}.do")),
        }
    }
}

/// Some simulator builds only print the transcript; keep one on disk either way.
pub fn ensure_log_written(log_path: &Path, output: &ToolOutput) -> Result<()> {
    if log_path.is_file() {
        return Ok(());
    }
    let mut bytes = output.stdout.clone();
    bytes.extend_from_slice(&output.stderr);
    std::fs::write(log_path, bytes)
        .with_context(|| format!("write transcript: {}", log_path.display()))
}

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod catalog_cmd;
mod logging;
mod project;
mod report;
mod solve_cmd;
mod test_cmd;
mod util;

#[derive(Parser, Debug)]
#[command(name = "ktreg")]
#[command(about = "KnightsTour regression runner.", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write structured JSON log events to this file.
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile, simulate and classify catalogued tests.
    Test(test_cmd::TestArgs),
    /// List catalogued tests.
    List(catalog_cmd::ListArgs),
    /// Solve a knight's tour with the reference oracle.
    Solve(solve_cmd::SolveArgs),
    /// Inspect the test catalog.
    Catalog(CatalogArgs),
}

#[derive(Args, Debug)]
struct CatalogArgs {
    #[command(subcommand)]
    cmd: catalog_cmd::CatalogCommand,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Command::Test(args) => test_cmd::cmd_test(args, cli.verbose),
        Command::List(args) => catalog_cmd::cmd_list(args),
        Command::Solve(args) => solve_cmd::cmd_solve(args),
        Command::Catalog(args) => catalog_cmd::cmd_catalog(args.cmd),
    }
}

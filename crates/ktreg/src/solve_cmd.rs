use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use ktreg_contracts::KTREG_SOLVE_REPORT_SCHEMA_VERSION;
use ktreg_oracle::{solve, Board, Cell, TourError};
use serde::Serialize;

#[derive(Debug, Clone, Args)]
pub struct SolveArgs {
    /// Starting row.
    pub x: usize,
    /// Starting column.
    pub y: usize,

    #[arg(long, default_value_t = 5)]
    pub rows: usize,

    #[arg(long, default_value_t = 5)]
    pub cols: usize,

    /// Write the path to this file, one `(x, y)` per line.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    #[arg(long, action = ArgAction::Set, default_value = "false", value_name = "BOOL")]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct SolveReport<'a> {
    schema_version: &'static str,
    board: Board,
    start: Cell,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a [Cell]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn write_path_file(path: &Path, cells: &[Cell]) -> Result<()> {
    let mut body = String::new();
    for c in cells {
        body.push_str(&format!("{c}\n"));
    }
    std::fs::write(path, body).with_context(|| format!("write tour: {}", path.display()))
}

/// Exit 0 with the tour, 1 when none exists from that start, 2 for bad input.
pub fn cmd_solve(args: SolveArgs) -> Result<ExitCode> {
    let board = Board::new(args.rows, args.cols)?;
    let start = Cell::new(args.x, args.y);

    let outcome = solve(board, start);
    let path = match &outcome {
        Ok(tour) => Some(tour.path.as_slice()),
        Err(TourError::Infeasible { .. }) => None,
        Err(err) => return Err(err.clone().into()),
    };

    if let (Some(out), Some(cells)) = (&args.out, path) {
        write_path_file(out, cells)?;
    }

    if args.json {
        let report = SolveReport {
            schema_version: KTREG_SOLVE_REPORT_SCHEMA_VERSION,
            board,
            start,
            ok: path.is_some(),
            path,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        };
        println!("{}", serde_json::to_string(&report)?);
    } else if let Some(cells) = path {
        println!("Solution Found!");
        for c in cells {
            println!("{c}");
        }
    } else {
        println!("No solution exists.");
    }

    Ok(if path.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

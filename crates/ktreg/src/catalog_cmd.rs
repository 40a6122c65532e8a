use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Args, Subcommand};
use ktreg_catalog::manifest::load_manifest;
use ktreg_catalog::sources::SourceTree;
use ktreg_catalog::{Catalog, VariantSelector};
use serde::Serialize;

use crate::project::{load_project, locate_manifest, ProjectArgs};
use crate::util::display_path;

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    #[arg(long, value_enum, default_value = "both")]
    pub variant: VariantSelector,

    #[arg(long, action = ArgAction::Set, default_value = "false", value_name = "BOOL")]
    pub json: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CatalogCommand {
    /// Validate the catalog manifest and print each variant's partition.
    Check(CheckArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Debug, Serialize)]
struct ListedTest {
    variant: String,
    id: u32,
    category: String,
    testbench: String,
    verified_by_oracle: bool,
    signal_set: Option<String>,
}

fn listed(catalog: &Catalog, tree: &SourceTree, selector: VariantSelector) -> Vec<ListedTest> {
    catalog
        .all_cases(selector.variants())
        .into_iter()
        .map(|case| ListedTest {
            variant: case.variant.as_str().to_string(),
            id: case.id,
            testbench: display_path(tree.testbench_path(catalog, &case)),
            verified_by_oracle: catalog.is_verification_era(case.id),
            signal_set: catalog
                .signal_set_for(case.variant, case.id)
                .map(|s| s.name.clone()),
            category: case.category,
        })
        .collect()
}

pub fn cmd_list(args: ListArgs) -> Result<ExitCode> {
    let project = load_project(&args.project)?;
    let tree = SourceTree::new(&project.root);
    let tests = listed(&project.catalog, &tree, args.variant);
    if args.json {
        println!("{}", serde_json::to_string(&tests)?);
    } else {
        for t in &tests {
            println!("{}\t{}\t{}\t{}", t.variant, t.id, t.category, t.testbench);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_partition(catalog: &Catalog) {
    println!(
        "testbench_prefix={} verification_threshold={}",
        catalog.testbench_prefix(),
        catalog.verification_threshold()
    );
    for table in catalog.tables() {
        let spans: Vec<String> = table
            .categories
            .iter()
            .map(|c| format!("{} {}-{}", c.name, c.first, c.last))
            .collect();
        println!("{}: {}", table.variant, spans.join(", "));
    }
}

pub fn cmd_catalog(cmd: CatalogCommand) -> Result<ExitCode> {
    match cmd {
        CatalogCommand::Check(args) => {
            let Some(path) = locate_manifest(&args.project) else {
                println!("no manifest found; using the built-in catalog");
                print_partition(&Catalog::builtin());
                return Ok(ExitCode::SUCCESS);
            };
            match load_manifest(&path) {
                Ok(loaded) => {
                    println!("ok: {}", path.display());
                    print_partition(&loaded.catalog);
                    Ok(ExitCode::SUCCESS)
                }
                Err(diags) => {
                    for d in &diags {
                        println!("{d}");
                    }
                    eprintln!("{} problem(s) in {}", diags.len(), path.display());
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn listing_marks_oracle_tests_and_signal_sets() {
        let catalog = Catalog::builtin();
        let tree = SourceTree::new(Path::new("/proj"));
        let tests = listed(&catalog, &tree, VariantSelector::Main);
        assert_eq!(tests.len(), 19);
        assert!(!tests[14].verified_by_oracle);
        assert!(tests[15].verified_by_oracle);
        assert_eq!(tests[15].category, "logic");
        assert!(tests[3].testbench.ends_with("KnightsTour_tb_3.sv"));
    }
}

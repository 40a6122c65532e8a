//! Resolution of a test to the files the simulator must compile.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::{Catalog, TestCase, TestId};

/// TestId whose testbench targets the synthesized netlist instead of RTL.
pub const POST_SYNTHESIS_TEST_ID: TestId = 0;

const POST_SYNTHESIS_PATTERNS: &[&str] = &["*.sv", "*.vg"];

/// Fixed layout of a checked-out KnightsTour project.
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn designs_dir(&self) -> PathBuf {
        self.root.join("designs")
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.root.join("tests")
    }

    pub fn post_synthesis_dir(&self) -> PathBuf {
        self.tests_dir().join("post_synthesis")
    }

    /// Standard-cell library used by the post-synthesis simulation.
    pub fn cell_library_dir(&self) -> PathBuf {
        self.post_synthesis_dir().join("SAED32_lib")
    }

    pub fn testbench_path(&self, catalog: &Catalog, case: &TestCase) -> PathBuf {
        let subdir = catalog
            .table(case.variant)
            .map(|t| t.tests_subdir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        self.tests_dir()
            .join(subdir)
            .join(&case.category)
            .join(format!("{}.sv", catalog.testbench_stem(case.id)))
    }
}

/// Files every RTL test compiles alongside its own testbench.
#[derive(Debug, Clone, Default)]
pub struct SharedSources {
    pub design_files: Vec<PathBuf>,
    pub testbench_files: Vec<PathBuf>,
}

/// Ordered compile inputs of one test; `testbench` is always last in `files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    pub files: Vec<PathBuf>,
    pub testbench: PathBuf,
    pub post_synthesis: bool,
}

/// Collect design `.sv` files (skipping any `tests/` directory) and the shared
/// testbench files that exist.
pub fn collect_shared_sources(tree: &SourceTree, catalog: &Catalog) -> Result<SharedSources> {
    let designs = tree.designs_dir();
    let mut design_files = Vec::new();

    let walker = WalkDir::new(&designs)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.depth() > 0 && e.file_name() == "tests"));
    for entry in walker {
        let entry = entry.with_context(|| format!("walk design dir: {}", designs.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "sv")
        {
            design_files.push(entry.into_path());
        }
    }
    if design_files.is_empty() {
        anyhow::bail!("no design files found under {}", designs.display());
    }

    let tests = tree.tests_dir();
    let testbench_files: Vec<PathBuf> = catalog
        .shared_testbench()
        .iter()
        .map(|name| tests.join(name))
        .filter(|p| p.is_file())
        .collect();
    if testbench_files.is_empty() {
        anyhow::bail!(
            "no shared testbench files found in {} (expected one of: {})",
            tests.display(),
            catalog.shared_testbench().join(", ")
        );
    }

    Ok(SharedSources {
        design_files,
        testbench_files,
    })
}

fn post_synthesis_globs() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in POST_SYNTHESIS_PATTERNS {
        builder.add(Glob::new(pat).with_context(|| format!("bad glob: {pat}"))?);
    }
    builder.build().context("build post-synthesis globset")
}

/// Netlist (`*.vg`) and wrapper (`*.sv`) files of the post-synthesis directory.
pub fn collect_post_synthesis_sources(tree: &SourceTree) -> Result<Vec<PathBuf>> {
    let dir = tree.post_synthesis_dir();
    let globs = post_synthesis_globs()?;
    let mut out = Vec::new();
    for entry in WalkDir::new(&dir).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("read post-synthesis dir: {}", dir.display()))?;
        if entry.file_type().is_file() && globs.is_match(entry.file_name()) {
            out.push(entry.into_path());
        }
    }
    if out.is_empty() {
        anyhow::bail!("no post-synthesis sources found in {}", dir.display());
    }
    Ok(out)
}

/// Full compile input list for one test.
///
/// `shared` may be `None` only when the post-synthesis test is the sole
/// selection; every other test needs the shared RTL sources.
pub fn source_set_for(
    tree: &SourceTree,
    catalog: &Catalog,
    shared: Option<&SharedSources>,
    case: &TestCase,
) -> Result<SourceSet> {
    let testbench = tree.testbench_path(catalog, case);

    let (mut files, post_synthesis) = if case.id == POST_SYNTHESIS_TEST_ID {
        (collect_post_synthesis_sources(tree)?, true)
    } else {
        let shared = shared.context("shared design sources were not collected")?;
        let mut files = shared.design_files.clone();
        files.extend(shared.testbench_files.iter().cloned());
        (files, false)
    };
    files.push(testbench.clone());

    Ok(SourceSet {
        files,
        testbench,
        post_synthesis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Variant;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"// sv\n").unwrap();
    }

    fn fixture() -> (tempfile::TempDir, SourceTree) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("designs/KnightsTour.sv"));
        touch(&root.join("designs/cmd/cmd_proc.sv"));
        touch(&root.join("designs/cmd/notes.txt"));
        touch(&root.join("designs/tests/ignored_tb.sv"));
        touch(&root.join("tests/tb_tasks.sv"));
        touch(&root.join("tests/KnightPhysics.sv"));
        touch(&root.join("tests/post_synthesis/KnightsTour.vg"));
        touch(&root.join("tests/post_synthesis/wrapper.sv"));
        touch(&root.join("tests/post_synthesis/readme.md"));
        let tree = SourceTree::new(root);
        (dir, tree)
    }

    #[test]
    fn shared_sources_skip_tests_dirs_and_missing_testbench_files() {
        let (_dir, tree) = fixture();
        let shared = collect_shared_sources(&tree, &Catalog::builtin()).unwrap();
        let names: Vec<String> = shared
            .design_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["KnightsTour.sv", "cmd_proc.sv"]);
        assert_eq!(shared.testbench_files.len(), 2);
    }

    #[test]
    fn missing_design_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SourceTree::new(dir.path());
        assert!(collect_shared_sources(&tree, &Catalog::builtin()).is_err());
    }

    #[test]
    fn rtl_test_compiles_design_shared_and_own_testbench() {
        let (_dir, tree) = fixture();
        let catalog = Catalog::builtin();
        let shared = collect_shared_sources(&tree, &catalog).unwrap();
        let case = catalog.lookup(Variant::Main, 5).unwrap();
        let set = source_set_for(&tree, &catalog, Some(&shared), &case).unwrap();
        assert!(!set.post_synthesis);
        assert_eq!(set.files.len(), 5);
        assert_eq!(set.files.last(), Some(&set.testbench));
        assert!(set.testbench.ends_with("tests/move/KnightsTour_tb_5.sv"));
    }

    #[test]
    fn post_synthesis_test_uses_netlist_sources_only() {
        let (_dir, tree) = fixture();
        let catalog = Catalog::builtin();
        let case = catalog.lookup(Variant::Extra, 0).unwrap();
        let set = source_set_for(&tree, &catalog, None, &case).unwrap();
        assert!(set.post_synthesis);
        let names: Vec<String> = set
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["KnightsTour.vg", "wrapper.sv", "KnightsTour_tb_0.sv"]
        );
        assert!(set.testbench.ends_with("tests/extra/simple/KnightsTour_tb_0.sv"));
    }

    #[test]
    fn rtl_test_without_shared_sources_is_an_error() {
        let (_dir, tree) = fixture();
        let catalog = Catalog::builtin();
        let case = catalog.lookup(Variant::Main, 3).unwrap();
        assert!(source_set_for(&tree, &catalog, None, &case).is_err());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use ktreg_catalog::manifest::{load_manifest, LoadedManifest, ManifestDiag, MarkerOverrides};
use ktreg_catalog::Catalog;
use ktreg_contracts::{ENV_SIMULATOR, KTREG_MANIFEST_FILE};
use ktreg_runner::{Markers, DEFAULT_SIMULATOR};
use tracing::debug;

use crate::util::{absolutize, find_upwards};

#[derive(Debug, Clone, Default, Args)]
pub struct ProjectArgs {
    /// Project root holding `designs/` and `tests/`.
    ///
    /// Defaults to the directory of the catalog manifest when one is found,
    /// otherwise the current directory.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Catalog manifest. Defaults to the nearest `ktreg.json` searched upwards
    /// from the root; the built-in catalog is used when there is none.
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,
}

/// Resolved inputs shared by every command.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub catalog: Arc<Catalog>,
    pub simulator: String,
    pub markers: Markers,
    pub manifest_path: Option<PathBuf>,
}

pub fn locate_manifest(args: &ProjectArgs) -> Option<PathBuf> {
    if let Some(p) = &args.manifest {
        return Some(absolutize(p));
    }
    let start = args
        .root
        .as_deref()
        .map(absolutize)
        .unwrap_or_else(|| absolutize(Path::new(".")));
    find_upwards(&start, Path::new(KTREG_MANIFEST_FILE))
}

pub fn format_diags(diags: &[ManifestDiag]) -> String {
    diags
        .iter()
        .map(|d| format!("  {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Simulator program: environment first, then the manifest, then `vsim`.
fn pick_simulator(from_manifest: Option<&str>) -> String {
    if let Ok(v) = std::env::var(ENV_SIMULATOR) {
        if !v.trim().is_empty() {
            return v;
        }
    }
    from_manifest.unwrap_or(DEFAULT_SIMULATOR).to_string()
}

pub fn load_project(args: &ProjectArgs) -> Result<Project> {
    let manifest_path = locate_manifest(args);
    let loaded = match &manifest_path {
        Some(path) => {
            debug!(manifest = %path.display(), "loading catalog manifest");
            load_manifest(path).map_err(|diags| {
                anyhow::anyhow!(
                    "invalid catalog manifest {}:\n{}",
                    path.display(),
                    format_diags(&diags)
                )
            })?
        }
        None => LoadedManifest {
            catalog: Catalog::builtin(),
            simulator: None,
            markers: MarkerOverrides::default(),
        },
    };

    let root = match (&args.root, &manifest_path) {
        (Some(r), _) => absolutize(r),
        (None, Some(m)) => m
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| absolutize(Path::new("."))),
        (None, None) => absolutize(Path::new(".")),
    };
    if !root.is_dir() {
        anyhow::bail!("project root is not a directory: {}", root.display());
    }

    Ok(Project {
        root,
        catalog: Arc::new(loaded.catalog),
        simulator: pick_simulator(loaded.simulator.as_deref()),
        markers: Markers::with_overrides(&loaded.markers),
        manifest_path,
    })
}

//! `ktreg.json` catalog manifest.
//!
//! Every field is optional except `schema_version`; absent fields fall back to
//! [`Catalog::builtin`]. Validation collects all problems instead of stopping at
//! the first one so a broken manifest can be fixed in a single pass.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use ktreg_contracts::KTREG_CATALOG_SCHEMA_VERSION;
use serde::Deserialize;

use crate::catalog::{Catalog, CatalogError, CategorySpan, VariantTable};
use crate::signals::SignalSetDecl;
use crate::{TestId, Variant};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestRaw {
    schema_version: String,
    #[serde(default)]
    testbench_prefix: Option<String>,
    #[serde(default)]
    verification_threshold: Option<TestId>,
    #[serde(default)]
    shared_testbench: Option<Vec<String>>,
    #[serde(default)]
    variants: Option<BTreeMap<String, VariantRaw>>,
    #[serde(default)]
    signal_sets: Option<Vec<SignalSetRaw>>,
    #[serde(default)]
    simulator: Option<String>,
    #[serde(default)]
    markers: Option<MarkerOverrides>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariantRaw {
    #[serde(default)]
    tests_subdir: Option<String>,
    #[serde(default)]
    categories: Vec<CategoryRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategoryRaw {
    name: String,
    first: TestId,
    last: TestId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignalSetRaw {
    name: String,
    first: TestId,
    last: TestId,
    #[serde(default)]
    variant: Option<String>,
    #[serde(default)]
    signals: Vec<String>,
}

/// Transcript/compile-log marker overrides; `None` keeps the built-in marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerOverrides {
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub compile_error: Option<String>,
    #[serde(default)]
    pub compile_warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub catalog: Catalog,
    pub simulator: Option<String>,
    pub markers: MarkerOverrides,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDiag {
    pub code: &'static str,
    pub message: String,
    pub path: String,
}

impl ManifestDiag {
    fn new(code: &'static str, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for ManifestDiag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.code, self.message, self.path)
    }
}

pub fn load_manifest(path: &Path) -> Result<LoadedManifest, Vec<ManifestDiag>> {
    let bytes = std::fs::read(path).map_err(|err| {
        vec![ManifestDiag::new(
            "ECAT_MANIFEST_IO",
            format!("failed to read manifest {}: {err}", path.display()),
            "",
        )]
    })?;
    parse_manifest(&bytes)
}

pub fn parse_manifest(bytes: &[u8]) -> Result<LoadedManifest, Vec<ManifestDiag>> {
    let raw: ManifestRaw = serde_json::from_slice(bytes).map_err(|err| {
        vec![ManifestDiag::new(
            "ECAT_MANIFEST_JSON",
            format!("invalid JSON: {err}"),
            "",
        )]
    })?;

    let mut diags: Vec<ManifestDiag> = Vec::new();
    let builtin = Catalog::builtin();

    if raw.schema_version != KTREG_CATALOG_SCHEMA_VERSION {
        diags.push(ManifestDiag::new(
            "ECAT_SCHEMA_VERSION",
            format!(
                "schema_version must be {KTREG_CATALOG_SCHEMA_VERSION}, got {}",
                raw.schema_version
            ),
            "/schema_version",
        ));
    }

    let tables = match raw.variants {
        None => builtin.tables().to_vec(),
        Some(map) => {
            let mut tables = Vec::with_capacity(map.len());
            for (name, v) in map {
                let base = format!("/variants/{name}");
                let Some(variant) = Variant::parse(&name) else {
                    diags.push(ManifestDiag::new(
                        "ECAT_VARIANT_INVALID",
                        format!("invalid variant: {name} (allowed: main, extra)"),
                        base,
                    ));
                    continue;
                };
                let tests_subdir = match v.tests_subdir.as_deref() {
                    None => default_tests_subdir(variant),
                    Some(raw) => match safe_rel_path(raw) {
                        Ok(p) => p,
                        Err(msg) => {
                            diags.push(ManifestDiag::new(
                                "ECAT_UNSAFE_PATH",
                                format!("unsafe tests_subdir {raw:?}: {msg}"),
                                format!("{base}/tests_subdir"),
                            ));
                            continue;
                        }
                    },
                };
                tables.push(VariantTable {
                    variant,
                    tests_subdir,
                    categories: v
                        .categories
                        .into_iter()
                        .map(|c| CategorySpan::new(c.name, c.first, c.last))
                        .collect(),
                });
            }
            tables
        }
    };

    let signal_sets = match raw.signal_sets {
        None => builtin.signal_sets().to_vec(),
        Some(sets) => {
            let mut out = Vec::with_capacity(sets.len());
            for (i, s) in sets.into_iter().enumerate() {
                let variant = match s.variant.as_deref() {
                    None => None,
                    Some(v) => match Variant::parse(v) {
                        Some(v) => Some(v),
                        None => {
                            diags.push(ManifestDiag::new(
                                "ECAT_VARIANT_INVALID",
                                format!("invalid variant: {v} (allowed: main, extra)"),
                                format!("/signal_sets/{i}/variant"),
                            ));
                            continue;
                        }
                    },
                };
                if s.signals.is_empty() {
                    diags.push(ManifestDiag::new(
                        "ECAT_SIGNAL_SET",
                        format!("signal set {:?} lists no signals", s.name),
                        format!("/signal_sets/{i}/signals"),
                    ));
                    continue;
                }
                out.push(SignalSetDecl {
                    name: s.name,
                    first: s.first,
                    last: s.last,
                    variant,
                    signals: s.signals,
                });
            }
            out
        }
    };

    let shared_testbench = raw
        .shared_testbench
        .unwrap_or_else(|| builtin.shared_testbench().to_vec());
    for (i, name) in shared_testbench.iter().enumerate() {
        if let Err(msg) = safe_rel_path(name) {
            diags.push(ManifestDiag::new(
                "ECAT_UNSAFE_PATH",
                format!("unsafe shared testbench path {name:?}: {msg}"),
                format!("/shared_testbench/{i}"),
            ));
        }
    }

    if let Some(sim) = raw.simulator.as_deref() {
        if sim.trim().is_empty() {
            diags.push(ManifestDiag::new(
                "ECAT_SIMULATOR_EMPTY",
                "simulator must be non-empty",
                "/simulator",
            ));
        }
    }

    let markers = raw.markers.unwrap_or_default();
    for (field, value) in [
        ("pass", &markers.pass),
        ("fail", &markers.fail),
        ("compile_error", &markers.compile_error),
        ("compile_warning", &markers.compile_warning),
    ] {
        if value.as_deref().is_some_and(str::is_empty) {
            diags.push(ManifestDiag::new(
                "ECAT_MARKER_EMPTY",
                format!("marker {field} must be non-empty"),
                format!("/markers/{field}"),
            ));
        }
    }

    let catalog = Catalog::new(
        raw.testbench_prefix
            .unwrap_or_else(|| builtin.testbench_prefix().to_string()),
        raw.verification_threshold
            .unwrap_or_else(|| builtin.verification_threshold()),
        shared_testbench,
        tables,
        signal_sets,
    );

    let catalog = match catalog {
        Ok(c) => Some(c),
        Err(errors) => {
            diags.extend(errors.iter().map(catalog_error_diag));
            None
        }
    };

    if !diags.is_empty() {
        diags.sort_by(|a, b| {
            (a.path.as_str(), a.code, a.message.as_str()).cmp(&(
                b.path.as_str(),
                b.code,
                b.message.as_str(),
            ))
        });
        return Err(diags);
    }

    match catalog {
        Some(catalog) => Ok(LoadedManifest {
            catalog,
            simulator: raw.simulator,
            markers,
        }),
        None => Err(vec![ManifestDiag::new(
            "ECAT_INTERNAL",
            "catalog rejected without diagnostics",
            "",
        )]),
    }
}

fn default_tests_subdir(variant: Variant) -> PathBuf {
    match variant {
        Variant::Main => PathBuf::from("."),
        Variant::Extra => PathBuf::from("extra"),
    }
}

fn safe_rel_path(raw: &str) -> Result<PathBuf, &'static str> {
    if raw.contains('\\') {
        return Err("must not contain '\\'");
    }
    let p = Path::new(raw);
    if p.is_absolute() {
        return Err("must be relative");
    }
    for c in p.components() {
        match c {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err("must not contain '..'"),
            Component::RootDir | Component::Prefix(_) => return Err("must be relative"),
        }
    }
    Ok(p.to_path_buf())
}

fn catalog_error_diag(err: &CatalogError) -> ManifestDiag {
    let (code, path) = match err {
        CatalogError::NoVariants => ("ECAT_VARIANTS_EMPTY", "/variants".to_string()),
        CatalogError::DuplicateVariant { variant } => {
            ("ECAT_VARIANT_DUPLICATE", format!("/variants/{variant}"))
        }
        CatalogError::EmptyVariant { variant } => (
            "ECAT_CATEGORIES_EMPTY",
            format!("/variants/{variant}/categories"),
        ),
        CatalogError::DuplicateCategory { variant, .. } => (
            "ECAT_CATEGORY_DUPLICATE",
            format!("/variants/{variant}/categories"),
        ),
        CatalogError::InvertedRange { variant, .. } => (
            "ECAT_RANGE_INVERTED",
            format!("/variants/{variant}/categories"),
        ),
        CatalogError::NotFromZero { variant, .. }
        | CatalogError::Overlap { variant, .. }
        | CatalogError::Gap { variant, .. } => {
            ("ECAT_PARTITION", format!("/variants/{variant}/categories"))
        }
        CatalogError::InvalidPrefix { .. } => ("ECAT_PREFIX_INVALID", "/testbench_prefix".to_string()),
        CatalogError::DuplicateSignalSet { .. } | CatalogError::SignalSetInverted { .. } => {
            ("ECAT_SIGNAL_SET", "/signal_sets".to_string())
        }
    };
    ManifestDiag::new(code, err.to_string(), path)
}

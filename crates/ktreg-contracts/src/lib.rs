//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O (catalog manifests, build-unit stamps and run
//! reports). Bump the suffix whenever the shape of the document changes.

pub const KTREG_CATALOG_SCHEMA_VERSION: &str = "ktreg.catalog@0.1.0";
pub const KTREG_REPORT_SCHEMA_VERSION: &str = "ktreg.report@0.1.0";
pub const KTREG_BUILD_STAMP_SCHEMA_VERSION: &str = "ktreg.build-stamp@0.1.0";
pub const KTREG_SOLVE_REPORT_SCHEMA_VERSION: &str = "ktreg.solve.report@0.1.0";

/// Default manifest file name, searched upwards from the working directory.
pub const KTREG_MANIFEST_FILE: &str = "ktreg.json";

/// Environment override for the simulator executable.
pub const ENV_SIMULATOR: &str = "KTREG_VSIM";

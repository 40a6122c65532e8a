//! Test catalog for the KnightsTour regression suite.
//!
//! The catalog is the only place that knows which TestId belongs to which
//! category, which variant subtree holds its testbench and which default
//! signal set applies to it. Everything downstream (runner, CLI, reports)
//! asks the catalog instead of re-deriving ranges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod catalog;
pub mod manifest;
mod signals;
pub mod sources;

pub use catalog::{
    Catalog, CatalogError, CategorySpan, TestCase, VariantTable, DEFAULT_SHARED_TESTBENCH,
    DEFAULT_TESTBENCH_PREFIX, DEFAULT_VERIFICATION_THRESHOLD,
};
pub use signals::{default_signal_sets, SignalSetDecl};

pub type TestId = u32;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Main,
    Extra,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Main, Variant::Extra];

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Main => "main",
            Variant::Extra => "extra",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "main" => Some(Variant::Main),
            "extra" => Some(Variant::Extra),
            _ => None,
        }
    }

    /// Suffix appended to per-test artifact stems so both variants of one
    /// TestId can coexist in the same output directory.
    pub fn artifact_suffix(self) -> &'static str {
        match self {
            Variant::Main => "",
            Variant::Extra => "_extra",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CLI-level variant choice; `Both` fans out to every variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VariantSelector {
    #[default]
    Main,
    Extra,
    Both,
}

impl VariantSelector {
    pub fn as_str(self) -> &'static str {
        match self {
            VariantSelector::Main => "main",
            VariantSelector::Extra => "extra",
            VariantSelector::Both => "both",
        }
    }

    pub fn variants(self) -> &'static [Variant] {
        match self {
            VariantSelector::Main => &[Variant::Main],
            VariantSelector::Extra => &[Variant::Extra],
            VariantSelector::Both => &Variant::ALL,
        }
    }
}

impl From<Variant> for VariantSelector {
    fn from(v: Variant) -> Self {
        match v {
            Variant::Main => VariantSelector::Main,
            Variant::Extra => VariantSelector::Extra,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid variant {value:?} (expected one of: main, extra, both)")]
pub struct VariantParseError {
    value: String,
}

impl FromStr for VariantSelector {
    type Err = VariantParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "main" => Ok(VariantSelector::Main),
            "extra" => Ok(VariantSelector::Extra),
            "both" | "all" => Ok(VariantSelector::Both),
            _ => Err(VariantParseError { value: s }),
        }
    }
}

#[cfg(feature = "clap")]
impl clap::ValueEnum for VariantSelector {
    fn value_variants<'a>() -> &'a [Self] {
        const ALL: [VariantSelector; 3] = [
            VariantSelector::Main,
            VariantSelector::Extra,
            VariantSelector::Both,
        ];
        &ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            VariantSelector::Main => Some(clap::builder::PossibleValue::new("main")),
            VariantSelector::Extra => Some(clap::builder::PossibleValue::new("extra")),
            VariantSelector::Both => Some(clap::builder::PossibleValue::new("both").alias("all")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_round_trips_through_str() {
        for v in Variant::ALL {
            assert_eq!(Variant::parse(v.as_str()), Some(v));
        }
        assert_eq!(Variant::parse("both"), None);
    }

    #[test]
    fn selector_parse_and_expand() {
        assert_eq!(
            VariantSelector::from_str("both").unwrap().variants(),
            &[Variant::Main, Variant::Extra]
        );
        assert_eq!(
            VariantSelector::from_str(" Extra ").unwrap().variants(),
            &[Variant::Extra]
        );
        assert_eq!(VariantSelector::from_str("all").unwrap(), VariantSelector::Both);
        let err = VariantSelector::from_str("wat").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid variant \"wat\" (expected one of: main, extra, both)"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }
}

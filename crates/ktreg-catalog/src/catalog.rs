use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::signals::{default_signal_sets, SignalSetDecl};
use crate::{TestId, Variant};

pub const DEFAULT_TESTBENCH_PREFIX: &str = "KnightsTour_tb";
pub const DEFAULT_VERIFICATION_THRESHOLD: TestId = 15;
pub const DEFAULT_SHARED_TESTBENCH: &[&str] = &["tb_tasks.sv", "KnightPhysics.sv", "SPI_iNEMO4.sv"];

/// Inclusive TestId span owned by one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpan {
    pub name: String,
    pub first: TestId,
    pub last: TestId,
}

impl CategorySpan {
    pub fn new(name: impl Into<String>, first: TestId, last: TestId) -> Self {
        Self {
            name: name.into(),
            first,
            last,
        }
    }

    pub fn contains(&self, id: TestId) -> bool {
        self.first <= id && id <= self.last
    }
}

#[derive(Debug, Clone)]
pub struct VariantTable {
    pub variant: Variant,
    /// Testbench subtree below `tests/` (`.` for the main variant).
    pub tests_subdir: PathBuf,
    pub categories: Vec<CategorySpan>,
}

/// One resolved test: the unit of scheduling.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestCase {
    pub variant: Variant,
    pub id: TestId,
    pub category: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog declares no variants")]
    NoVariants,
    #[error("variant {variant} is declared more than once")]
    DuplicateVariant { variant: Variant },
    #[error("variant {variant}: no categories declared")]
    EmptyVariant { variant: Variant },
    #[error("variant {variant}: category {name:?} is declared more than once")]
    DuplicateCategory { variant: Variant, name: String },
    #[error("variant {variant}: category {name:?} has inverted range {first}..={last}")]
    InvertedRange {
        variant: Variant,
        name: String,
        first: TestId,
        last: TestId,
    },
    #[error("variant {variant}: TestId domain must start at 0 (category {name:?} starts at {first})")]
    NotFromZero {
        variant: Variant,
        name: String,
        first: TestId,
    },
    #[error("variant {variant}: categories {left:?} and {right:?} both claim TestId {at}")]
    Overlap {
        variant: Variant,
        left: String,
        right: String,
        at: TestId,
    },
    #[error("variant {variant}: TestIds {from}..={to} are not claimed by any category")]
    Gap {
        variant: Variant,
        from: TestId,
        to: TestId,
    },
    #[error("testbench prefix {prefix:?} must be non-empty ASCII without path separators")]
    InvalidPrefix { prefix: String },
    #[error("signal set {name:?} is declared more than once")]
    DuplicateSignalSet { name: String },
    #[error("signal set {name:?} has inverted range {first}..={last}")]
    SignalSetInverted {
        name: String,
        first: TestId,
        last: TestId,
    },
}

/// Validated, immutable view of the test space.
///
/// Invariant: for every variant table, the category spans sorted by `first`
/// cover `0..=max` exactly once.
#[derive(Debug, Clone)]
pub struct Catalog {
    testbench_prefix: String,
    verification_threshold: TestId,
    shared_testbench: Vec<String>,
    tables: Vec<VariantTable>,
    signal_sets: Vec<SignalSetDecl>,
}

impl Catalog {
    pub fn new(
        testbench_prefix: String,
        verification_threshold: TestId,
        shared_testbench: Vec<String>,
        mut tables: Vec<VariantTable>,
        signal_sets: Vec<SignalSetDecl>,
    ) -> Result<Self, Vec<CatalogError>> {
        let mut errors = Vec::new();

        if testbench_prefix.is_empty()
            || !testbench_prefix.is_ascii()
            || testbench_prefix.contains(['/', '\\'])
        {
            errors.push(CatalogError::InvalidPrefix {
                prefix: testbench_prefix.clone(),
            });
        }

        if tables.is_empty() {
            errors.push(CatalogError::NoVariants);
        }

        let mut seen_variants: BTreeSet<Variant> = BTreeSet::new();
        for table in &mut tables {
            if !seen_variants.insert(table.variant) {
                errors.push(CatalogError::DuplicateVariant {
                    variant: table.variant,
                });
                continue;
            }
            errors.extend(partition_errors(table));
        }

        let mut seen_sets: BTreeSet<&str> = BTreeSet::new();
        for set in &signal_sets {
            if !seen_sets.insert(set.name.as_str()) {
                errors.push(CatalogError::DuplicateSignalSet {
                    name: set.name.clone(),
                });
            }
            if set.first > set.last {
                errors.push(CatalogError::SignalSetInverted {
                    name: set.name.clone(),
                    first: set.first,
                    last: set.last,
                });
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        tables.sort_by_key(|t| t.variant);

        Ok(Self {
            testbench_prefix,
            verification_threshold,
            shared_testbench,
            tables,
            signal_sets,
        })
    }

    /// The historical KnightsTour table: simple 0-1, move 2-14, logic 15-18,
    /// mirrored for the `extra` variant under `tests/extra/`.
    pub fn builtin() -> Self {
        let categories = || {
            vec![
                CategorySpan::new("simple", 0, 1),
                CategorySpan::new("move", 2, 14),
                CategorySpan::new("logic", 15, 18),
            ]
        };
        Self {
            testbench_prefix: DEFAULT_TESTBENCH_PREFIX.to_string(),
            verification_threshold: DEFAULT_VERIFICATION_THRESHOLD,
            shared_testbench: DEFAULT_SHARED_TESTBENCH
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tables: vec![
                VariantTable {
                    variant: Variant::Main,
                    tests_subdir: PathBuf::from("."),
                    categories: categories(),
                },
                VariantTable {
                    variant: Variant::Extra,
                    tests_subdir: PathBuf::from("extra"),
                    categories: categories(),
                },
            ],
            signal_sets: default_signal_sets(),
        }
    }

    pub fn testbench_prefix(&self) -> &str {
        &self.testbench_prefix
    }

    pub fn verification_threshold(&self) -> TestId {
        self.verification_threshold
    }

    /// True if transcripts of this test carry a tour trace the oracle must check.
    pub fn is_verification_era(&self, id: TestId) -> bool {
        id >= self.verification_threshold
    }

    pub fn shared_testbench(&self) -> &[String] {
        &self.shared_testbench
    }

    pub fn tables(&self) -> &[VariantTable] {
        &self.tables
    }

    pub fn table(&self, variant: Variant) -> Option<&VariantTable> {
        self.tables.iter().find(|t| t.variant == variant)
    }

    pub fn signal_sets(&self) -> &[SignalSetDecl] {
        &self.signal_sets
    }

    /// Inclusive `(first, last)` TestId domain of a variant.
    pub fn domain(&self, variant: Variant) -> Option<(TestId, TestId)> {
        let table = self.table(variant)?;
        let first = table.categories.first()?.first;
        let last = table.categories.last()?.last;
        Some((first, last))
    }

    pub fn lookup(&self, variant: Variant, id: TestId) -> Option<TestCase> {
        let table = self.table(variant)?;
        table
            .categories
            .iter()
            .find(|c| c.contains(id))
            .map(|c| TestCase {
                variant,
                id,
                category: c.name.clone(),
            })
    }

    /// Every catalogued test of the given variants whose id lies in `start..=end`.
    pub fn cases_in_range(&self, variants: &[Variant], start: TestId, end: TestId) -> Vec<TestCase> {
        let mut out = Vec::new();
        for &variant in variants {
            let Some(table) = self.table(variant) else {
                continue;
            };
            for span in &table.categories {
                let lo = span.first.max(start);
                let hi = span.last.min(end);
                for id in lo..=hi {
                    out.push(TestCase {
                        variant,
                        id,
                        category: span.name.clone(),
                    });
                }
            }
        }
        out.sort();
        out
    }

    pub fn all_cases(&self, variants: &[Variant]) -> Vec<TestCase> {
        self.cases_in_range(variants, TestId::MIN, TestId::MAX)
    }

    /// `<prefix>_<id>`: the testbench file stem.
    pub fn testbench_stem(&self, id: TestId) -> String {
        format!("{}_{}", self.testbench_prefix, id)
    }

    /// Testbench stem plus the variant suffix; names logs and waveforms.
    pub fn artifact_stem(&self, case: &TestCase) -> String {
        format!(
            "{}{}",
            self.testbench_stem(case.id),
            case.variant.artifact_suffix()
        )
    }

    /// The signal set that claims `id`, preferring a variant-specific declaration.
    pub fn signal_set_for(&self, variant: Variant, id: TestId) -> Option<&SignalSetDecl> {
        let in_range = |s: &&SignalSetDecl| s.first <= id && id <= s.last;
        self.signal_sets
            .iter()
            .filter(in_range)
            .find(|s| s.variant == Some(variant))
            .or_else(|| {
                self.signal_sets
                    .iter()
                    .filter(in_range)
                    .find(|s| s.variant.is_none())
            })
    }
}

fn partition_errors(table: &mut VariantTable) -> Vec<CatalogError> {
    let variant = table.variant;
    let mut errors = Vec::new();

    if table.categories.is_empty() {
        errors.push(CatalogError::EmptyVariant { variant });
        return errors;
    }

    let mut names: BTreeSet<&str> = BTreeSet::new();
    for span in &table.categories {
        if !names.insert(span.name.as_str()) {
            errors.push(CatalogError::DuplicateCategory {
                variant,
                name: span.name.clone(),
            });
        }
        if span.first > span.last {
            errors.push(CatalogError::InvertedRange {
                variant,
                name: span.name.clone(),
                first: span.first,
                last: span.last,
            });
        }
    }
    if !errors.is_empty() {
        return errors;
    }

    table
        .categories
        .sort_by(|a, b| (a.first, a.last).cmp(&(b.first, b.last)));

    let head = &table.categories[0];
    if head.first != 0 {
        errors.push(CatalogError::NotFromZero {
            variant,
            name: head.name.clone(),
            first: head.first,
        });
    }

    for pair in table.categories.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.first <= prev.last {
            errors.push(CatalogError::Overlap {
                variant,
                left: prev.name.clone(),
                right: next.name.clone(),
                at: next.first,
            });
        } else if next.first > prev.last + 1 {
            errors.push(CatalogError::Gap {
                variant,
                from: prev.last + 1,
                to: next.first - 1,
            });
        }
    }

    errors
}

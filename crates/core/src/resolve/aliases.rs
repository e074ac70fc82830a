//! Field-name aliases and the source each one reads from.
//!
//! Every non-price shortcut lives here. Names are matched ignoring ASCII case.

use crate::derived::DerivedField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasSource {
    /// Snapshot key only. Used by the legacy 52-week names.
    Snapshot(&'static str),
    /// Snapshot key first, then the full-metadata key.
    SnapshotThenFull {
        snapshot: &'static str,
        full: &'static str,
    },
    /// A value precomputed by [`crate::derived::DerivedFundamentals`].
    Derived(DerivedField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasEntry {
    pub names: &'static [&'static str],
    pub source: AliasSource,
    /// Rendered through the deployment's money format.
    pub monetary: bool,
}

pub const YEAR_HIGH_KEY: &str = "yearHigh";
pub const YEAR_LOW_KEY: &str = "yearLow";

pub static FIELD_ALIASES: &[AliasEntry] = &[
    AliasEntry {
        names: &["52weekhigh", "52wh"],
        source: AliasSource::Snapshot(YEAR_HIGH_KEY),
        monetary: false,
    },
    AliasEntry {
        names: &["52weeklow", "52wl"],
        source: AliasSource::Snapshot(YEAR_LOW_KEY),
        monetary: false,
    },
    AliasEntry {
        names: &["marketcap", "mcap"],
        source: AliasSource::SnapshotThenFull {
            snapshot: "marketCap",
            full: "marketCap",
        },
        monetary: true,
    },
    AliasEntry {
        names: &["pe", "p/e", "trailingpe"],
        source: AliasSource::SnapshotThenFull {
            snapshot: "trailingPE",
            full: "trailingPE",
        },
        monetary: false,
    },
    AliasEntry {
        names: &["sector"],
        source: AliasSource::Derived(DerivedField::Sector),
        monetary: false,
    },
    AliasEntry {
        names: &["qoq_revenue_yoy", "yoy_quarterly_revenue"],
        source: AliasSource::Derived(DerivedField::RevenueYoy),
        monetary: false,
    },
    AliasEntry {
        names: &["qoq_profit_yoy", "yoy_quarterly_profit"],
        source: AliasSource::Derived(DerivedField::ProfitYoy),
        monetary: false,
    },
    AliasEntry {
        names: &["earningsquarterlygrowth"],
        source: AliasSource::Derived(DerivedField::EarningsQuarterlyGrowth),
        monetary: false,
    },
    AliasEntry {
        names: &["revenuequarterlygrowth"],
        source: AliasSource::Derived(DerivedField::RevenueQuarterlyGrowth),
        monetary: false,
    },
    AliasEntry {
        names: &["last_quarter", "quarter_name"],
        source: AliasSource::Derived(DerivedField::LastQuarter),
        monetary: false,
    },
];

/// Snapshot keys that duplicate the daily price columns. They are never
/// served by the generic snapshot lookup.
pub static SNAPSHOT_DENY_LIST: &[&str] = &[
    "lastPrice",
    "dayHigh",
    "dayLow",
    "previousClose",
    "regularMarketPreviousClose",
];

pub fn lookup(field: &str) -> Option<&'static AliasEntry> {
    FIELD_ALIASES
        .iter()
        .find(|entry| entry.names.iter().any(|n| n.eq_ignore_ascii_case(field)))
}

pub fn is_denied_snapshot_key(key: &str) -> bool {
    SNAPSHOT_DENY_LIST
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(key))
}

//! Field resolution: turns one requested field name into one cell for one
//! trading day.
//!
//! Resolution is an ordered chain of strategies. Each one either claims the
//! field (returning a cell, possibly `Null`) or passes. The first claim wins;
//! a field nobody claims resolves to `Null`.

pub mod aliases;

use crate::derived::DerivedFundamentals;
use crate::domain::metadata::{Metadata, Scalar};
use crate::domain::price::{PriceColumn, PriceRecord};
use crate::domain::table::Cell;
use crate::format::{safe_number, MoneyFormat};
use aliases::{AliasEntry, AliasSource};

/// Request-scoped, read-only inputs shared by every (row, field) pair.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub snapshot: &'a Metadata,
    pub full: &'a Metadata,
    pub derived: &'a DerivedFundamentals,
    pub money: MoneyFormat,
}

pub type Strategy = fn(&PriceRecord, &str, &ResolveContext<'_>) -> Option<Cell>;

/// Precedence order, highest first.
pub static STRATEGIES: &[(&str, Strategy)] = &[
    ("price_column", price_column),
    ("legacy_alias", legacy_alias),
    ("snapshot_first", snapshot_first),
    ("derived", derived),
    ("snapshot", generic_snapshot),
    ("full_metadata", generic_full_metadata),
];

pub fn resolve(record: &PriceRecord, field: &str, ctx: &ResolveContext<'_>) -> Cell {
    STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(record, field, ctx))
        .unwrap_or(Cell::Null)
}

/// Whether `field` can only be answered with the full metadata source, given
/// what the snapshot already holds.
pub fn requires_full_metadata(field: &str, snapshot: &Metadata) -> bool {
    if PriceColumn::parse(field).is_some() {
        return false;
    }
    match aliases::lookup(field).map(|entry| entry.source) {
        Some(AliasSource::Snapshot(_)) => false,
        Some(AliasSource::SnapshotThenFull { snapshot: key, .. }) => {
            safe_number(snapshot_value(snapshot, key)).is_none()
        }
        Some(AliasSource::Derived(d)) => d.requires_full_metadata(),
        None => snapshot_hit(snapshot, field).is_none(),
    }
}

pub fn requires_quarterly(field: &str) -> bool {
    matches!(
        aliases::lookup(field).map(|entry| entry.source),
        Some(AliasSource::Derived(d)) if d.requires_quarterly()
    )
}

fn price_column(record: &PriceRecord, field: &str, _ctx: &ResolveContext<'_>) -> Option<Cell> {
    PriceColumn::parse(field).map(|column| record.cell(column))
}

fn legacy_alias(_record: &PriceRecord, field: &str, ctx: &ResolveContext<'_>) -> Option<Cell> {
    let entry = aliases::lookup(field)?;
    let AliasSource::Snapshot(key) = entry.source else {
        return None;
    };
    Some(number_cell(entry, snapshot_value(ctx.snapshot, key), ctx))
}

fn snapshot_first(_record: &PriceRecord, field: &str, ctx: &ResolveContext<'_>) -> Option<Cell> {
    let entry = aliases::lookup(field)?;
    let AliasSource::SnapshotThenFull { snapshot, full } = entry.source else {
        return None;
    };
    let value = snapshot_value(ctx.snapshot, snapshot)
        .filter(|v| safe_number(Some(*v)).is_some())
        .or_else(|| ctx.full.get_ci(full).map(|(_, v)| v));
    Some(number_cell(entry, value, ctx))
}

fn derived(_record: &PriceRecord, field: &str, ctx: &ResolveContext<'_>) -> Option<Cell> {
    match aliases::lookup(field)?.source {
        AliasSource::Derived(d) => Some(ctx.derived.cell(d)),
        _ => None,
    }
}

fn generic_snapshot(_record: &PriceRecord, field: &str, ctx: &ResolveContext<'_>) -> Option<Cell> {
    let value = snapshot_hit(ctx.snapshot, field)?;
    Some(match value {
        Scalar::Text(s) => Cell::Text(s.clone()),
        other => Cell::from_number(safe_number(Some(other))),
    })
}

fn generic_full_metadata(
    _record: &PriceRecord,
    field: &str,
    ctx: &ResolveContext<'_>,
) -> Option<Cell> {
    let (_, value) = ctx.full.get_ci(field)?;
    Some(match value {
        Scalar::Number(_) => Cell::from_number(safe_number(Some(value))),
        // Text and flags would make the column mixed-type.
        Scalar::Text(_) | Scalar::Bool(_) => Cell::Null,
    })
}

fn snapshot_value<'m>(snapshot: &'m Metadata, key: &str) -> Option<&'m Scalar> {
    snapshot.get_ci(key).map(|(_, v)| v)
}

fn snapshot_hit<'m>(snapshot: &'m Metadata, field: &str) -> Option<&'m Scalar> {
    let (key, value) = snapshot.get_ci(field)?;
    if aliases::is_denied_snapshot_key(key) {
        return None;
    }
    Some(value)
}

fn number_cell(entry: &AliasEntry, value: Option<&Scalar>, ctx: &ResolveContext<'_>) -> Cell {
    if entry.monetary {
        ctx.money.cell(value)
    } else {
        Cell::from_number(safe_number(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::DerivedField;
    use chrono::NaiveDate;

    fn record() -> PriceRecord {
        PriceRecord {
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            open: 101.25,
            high: 104.5,
            low: 100.75,
            close: 103.125,
            volume: 5_400_321,
            ..Default::default()
        }
    }

    fn snapshot() -> Metadata {
        [
            ("yearHigh", Scalar::Number(199.62)),
            ("yearLow", Scalar::Number(164.08)),
            ("marketCap", Scalar::Number(2_950_000_000_000.0)),
            ("lastPrice", Scalar::Number(999.0)),
            ("previousClose", Scalar::Number(998.0)),
            ("dayHigh", Scalar::Number(997.0)),
            ("currency", Scalar::from("USD")),
            ("fiftyDayAverage", Scalar::Number(180.5)),
            ("52weekHigh", Scalar::Number(1.0)),
        ]
        .into_iter()
        .collect()
    }

    fn full() -> Metadata {
        [
            ("marketCap", Scalar::Number(1.0)),
            ("trailingPE", Scalar::Number(28.44)),
            ("sector", Scalar::from("Technology")),
            ("beta", Scalar::Number(1.26)),
            ("longBusinessSummary", Scalar::from("Designs phones.")),
            ("dayHigh", Scalar::Number(104.5)),
        ]
        .into_iter()
        .collect()
    }

    fn run(field: &str, snapshot: &Metadata, full: &Metadata, money: MoneyFormat) -> Cell {
        let derived = DerivedFundamentals::compute(full, None);
        let ctx = ResolveContext {
            snapshot,
            full,
            derived: &derived,
            money,
        };
        resolve(&record(), field, &ctx)
    }

    fn plain(field: &str) -> Cell {
        run(field, &snapshot(), &full(), MoneyFormat::Plain)
    }

    #[test]
    fn price_columns_return_exact_row_values() {
        for field in ["Open", "open", "OPEN"] {
            assert_eq!(plain(field), Cell::Float(101.25));
        }
        assert_eq!(plain("high"), Cell::Float(104.5));
        assert_eq!(plain("Low"), Cell::Float(100.75));
        assert_eq!(plain("cLoSe"), Cell::Float(103.125));
        assert_eq!(plain("volume"), Cell::Int(5_400_321));
    }

    #[test]
    fn history_columns_come_from_the_row() {
        let mut record = record();
        record.adj_close = Some(102.9);
        record.dividends = 0.24;
        record.stock_splits = 4.0;
        let (snapshot, full) = (snapshot(), full());
        let derived = DerivedFundamentals::compute(&full, None);
        let ctx = ResolveContext {
            snapshot: &snapshot,
            full: &full,
            derived: &derived,
            money: MoneyFormat::Plain,
        };
        assert_eq!(resolve(&record, "Adj Close", &ctx), Cell::Float(102.9));
        assert_eq!(resolve(&record, "Dividends", &ctx), Cell::Float(0.24));
        assert_eq!(resolve(&record, "Stock Splits", &ctx), Cell::Float(4.0));
        assert!(!requires_full_metadata("Adj Close", &Metadata::new()));
    }

    #[test]
    fn legacy_52_week_aliases_read_year_keys() {
        for field in ["52weekHigh", "52WEEKHIGH", "52wh", "52WH"] {
            assert_eq!(plain(field), Cell::Float(199.62), "field {field}");
        }
        for field in ["52weeklow", "52WL"] {
            assert_eq!(plain(field), Cell::Float(164.08), "field {field}");
        }
    }

    #[test]
    fn legacy_alias_beats_colliding_snapshot_key() {
        // The snapshot literally holds "52weekHigh" = 1.0; the alias path must win.
        assert_eq!(plain("52weekHigh"), Cell::Float(199.62));
    }

    #[test]
    fn legacy_alias_without_snapshot_value_is_null() {
        let empty = Metadata::new();
        assert_eq!(run("52wh", &empty, &full(), MoneyFormat::Plain), Cell::Null);
    }

    #[test]
    fn market_cap_prefers_snapshot_then_full() {
        assert_eq!(plain("marketCap"), Cell::Float(2_950_000_000_000.0));
        assert_eq!(plain("MCAP"), Cell::Float(2_950_000_000_000.0));

        let mut no_cap = snapshot();
        no_cap.insert("marketCap", "n/a");
        assert_eq!(run("marketcap", &no_cap, &full(), MoneyFormat::Plain), Cell::Float(1.0));
    }

    #[test]
    fn market_cap_honours_crore_mode() {
        assert_eq!(
            run("marketcap", &snapshot(), &full(), MoneyFormat::Crore),
            Cell::Text("2,95,000.00 Cr".to_string())
        );
        // Non-monetary fields are unaffected.
        assert_eq!(run("pe", &snapshot(), &full(), MoneyFormat::Crore), Cell::Float(28.44));
    }

    #[test]
    fn pe_aliases_fall_back_to_full_metadata() {
        for field in ["pe", "P/E", "trailingPE"] {
            assert_eq!(plain(field), Cell::Float(28.44), "field {field}");
        }
    }

    #[test]
    fn derived_shortcuts_read_precomputed_values() {
        assert_eq!(plain("Sector"), Cell::Text("Technology".to_string()));
        assert_eq!(plain("qoq_revenue_yoy"), Cell::Null);
        assert_eq!(plain("last_quarter"), Cell::Null);
    }

    #[test]
    fn deny_listed_snapshot_keys_never_leak() {
        let empty_full = Metadata::new();
        for field in ["previousclose", "lastPrice", "DAYHIGH"] {
            assert_eq!(run(field, &snapshot(), &empty_full, MoneyFormat::Plain), Cell::Null);
        }
        // With a full-metadata entry the later step answers instead of the snapshot.
        assert_eq!(plain("dayHigh"), Cell::Float(104.5));
    }

    #[test]
    fn generic_snapshot_lookup_ignores_case() {
        assert_eq!(plain("FiftyDayAverage"), Cell::Float(180.5));
        assert_eq!(plain("currency"), Cell::Text("USD".to_string()));
    }

    #[test]
    fn generic_full_metadata_suppresses_text() {
        assert_eq!(plain("BETA"), Cell::Float(1.26));
        assert_eq!(plain("longBusinessSummary"), Cell::Null);
    }

    #[test]
    fn unknown_fields_resolve_to_null() {
        assert_eq!(plain("definitelyNotAField"), Cell::Null);
        assert_eq!(plain(""), Cell::Null);
    }

    #[test]
    fn full_metadata_requirement_tracks_snapshot_contents() {
        let snap = snapshot();
        assert!(!requires_full_metadata("close", &snap));
        assert!(!requires_full_metadata("52wh", &snap));
        assert!(!requires_full_metadata("marketcap", &snap));
        assert!(!requires_full_metadata("currency", &snap));
        assert!(requires_full_metadata("pe", &snap));
        assert!(requires_full_metadata("sector", &snap));
        assert!(requires_full_metadata("previousClose", &snap));
        assert!(requires_full_metadata("beta", &snap));
        assert!(!requires_full_metadata("qoq_profit_yoy", &snap));
    }

    #[test]
    fn quarterly_requirement_only_for_quarter_fields() {
        assert!(requires_quarterly("YOY_QUARTERLY_REVENUE"));
        assert!(requires_quarterly("quarter_name"));
        assert!(!requires_quarterly("earningsQuarterlyGrowth"));
        assert!(!requires_quarterly("close"));
        assert!(DerivedField::LastQuarter.requires_quarterly());
    }
}

use crate::domain::table::Cell;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    #[serde(default)]
    pub adj_close: Option<f64>,
    /// Cash dividend paid on this date, 0.0 when none.
    #[serde(default)]
    pub dividends: f64,
    /// Split ratio effective on this date (4:1 is 4.0), 0.0 when none.
    #[serde(default)]
    pub stock_splits: f64,
}

impl PriceRecord {
    pub fn cell(&self, column: PriceColumn) -> Cell {
        match column {
            PriceColumn::Open => Cell::Float(self.open),
            PriceColumn::High => Cell::Float(self.high),
            PriceColumn::Low => Cell::Float(self.low),
            PriceColumn::Close => Cell::Float(self.close),
            PriceColumn::Volume => Cell::Int(self.volume),
            PriceColumn::AdjClose => Cell::from_number(self.adj_close),
            PriceColumn::Dividends => Cell::Float(self.dividends),
            PriceColumn::StockSplits => Cell::Float(self.stock_splits),
        }
    }
}

/// Columns of the daily price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceColumn {
    Open,
    High,
    Low,
    Close,
    Volume,
    AdjClose,
    Dividends,
    StockSplits,
}

impl PriceColumn {
    /// Canonical columns, matched ignoring case.
    pub const ALL: [PriceColumn; 5] = [
        PriceColumn::Open,
        PriceColumn::High,
        PriceColumn::Low,
        PriceColumn::Close,
        PriceColumn::Volume,
    ];

    /// History extras, matched by exact spelling only.
    pub const EXTRA: [PriceColumn; 3] = [
        PriceColumn::AdjClose,
        PriceColumn::Dividends,
        PriceColumn::StockSplits,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PriceColumn::Open => "Open",
            PriceColumn::High => "High",
            PriceColumn::Low => "Low",
            PriceColumn::Close => "Close",
            PriceColumn::Volume => "Volume",
            PriceColumn::AdjClose => "Adj Close",
            PriceColumn::Dividends => "Dividends",
            PriceColumn::StockSplits => "Stock Splits",
        }
    }

    /// `"close"`, `"CLOSE"` and `"Close"` are the same column; `"Adj Close"`
    /// must be spelled exactly.
    pub fn parse(field: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|column| column.name().eq_ignore_ascii_case(field))
            .or_else(|| Self::EXTRA.into_iter().find(|column| column.name() == field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PriceRecord {
        PriceRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            open: 1.5,
            high: 2.0,
            low: 1.0,
            close: 1.75,
            volume: 1200,
            ..Default::default()
        }
    }

    #[test]
    fn parses_columns_case_insensitively() {
        assert_eq!(PriceColumn::parse("close"), Some(PriceColumn::Close));
        assert_eq!(PriceColumn::parse("VOLUME"), Some(PriceColumn::Volume));
        assert_eq!(PriceColumn::parse("oPeN"), Some(PriceColumn::Open));
        assert_eq!(PriceColumn::parse(""), None);
    }

    #[test]
    fn history_extras_need_exact_spelling() {
        assert_eq!(PriceColumn::parse("Adj Close"), Some(PriceColumn::AdjClose));
        assert_eq!(PriceColumn::parse("Dividends"), Some(PriceColumn::Dividends));
        assert_eq!(PriceColumn::parse("Stock Splits"), Some(PriceColumn::StockSplits));
        assert_eq!(PriceColumn::parse("adj close"), None);
        assert_eq!(PriceColumn::parse("dividends"), None);
    }

    #[test]
    fn volume_is_an_integer_cell() {
        let record = record();
        assert_eq!(record.cell(PriceColumn::Volume), Cell::Int(1200));
        assert_eq!(record.cell(PriceColumn::Close), Cell::Float(1.75));
    }

    #[test]
    fn history_extras_default_to_zero_or_null() {
        let mut record = record();
        assert_eq!(record.cell(PriceColumn::AdjClose), Cell::Null);
        assert_eq!(record.cell(PriceColumn::Dividends), Cell::Float(0.0));
        assert_eq!(record.cell(PriceColumn::StockSplits), Cell::Float(0.0));

        record.adj_close = Some(1.7);
        record.dividends = 0.24;
        record.stock_splits = 4.0;
        assert_eq!(record.cell(PriceColumn::AdjClose), Cell::Float(1.7));
        assert_eq!(record.cell(PriceColumn::Dividends), Cell::Float(0.24));
        assert_eq!(record.cell(PriceColumn::StockSplits), Cell::Float(4.0));
    }
}

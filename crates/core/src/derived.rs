//! Values computed once per request from full metadata and the quarterly table.

use crate::domain::fundamentals::QuarterlyFundamentals;
use crate::domain::metadata::Metadata;
use crate::domain::table::Cell;
use crate::format::safe_number;

pub const TOTAL_REVENUE: &str = "Total Revenue";
pub const NET_INCOME: &str = "Net Income";

/// Current quarter plus the same quarter one year earlier.
const YOY_MIN_QUARTERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedField {
    Sector,
    RevenueYoy,
    ProfitYoy,
    EarningsQuarterlyGrowth,
    RevenueQuarterlyGrowth,
    LastQuarter,
}

impl DerivedField {
    pub fn requires_full_metadata(self) -> bool {
        matches!(
            self,
            DerivedField::Sector
                | DerivedField::EarningsQuarterlyGrowth
                | DerivedField::RevenueQuarterlyGrowth
        )
    }

    pub fn requires_quarterly(self) -> bool {
        matches!(
            self,
            DerivedField::RevenueYoy | DerivedField::ProfitYoy | DerivedField::LastQuarter
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFundamentals {
    pub sector: Option<String>,
    pub revenue_yoy: Option<f64>,
    pub profit_yoy: Option<f64>,
    pub earnings_quarterly_growth: Option<f64>,
    pub revenue_quarterly_growth: Option<f64>,
    pub last_quarter: Option<String>,
}

impl DerivedFundamentals {
    pub fn compute(full: &Metadata, quarterly: Option<&QuarterlyFundamentals>) -> Self {
        let number = |key: &str| safe_number(full.get_ci(key).map(|(_, v)| v));

        Self {
            sector: full
                .get_ci("sector")
                .and_then(|(_, v)| v.as_text())
                .map(str::to_string),
            revenue_yoy: yoy_growth(quarterly, TOTAL_REVENUE),
            profit_yoy: yoy_growth(quarterly, NET_INCOME),
            earnings_quarterly_growth: number("earningsQuarterlyGrowth"),
            revenue_quarterly_growth: number("revenueQuarterlyGrowth")
                .or_else(|| number("revenueGrowth")),
            last_quarter: most_recent_quarter_label(quarterly),
        }
    }

    pub fn cell(&self, field: DerivedField) -> Cell {
        match field {
            DerivedField::Sector => Cell::from_text(self.sector.clone()),
            DerivedField::RevenueYoy => Cell::from_number(self.revenue_yoy),
            DerivedField::ProfitYoy => Cell::from_number(self.profit_yoy),
            DerivedField::EarningsQuarterlyGrowth => {
                Cell::from_number(self.earnings_quarterly_growth)
            }
            DerivedField::RevenueQuarterlyGrowth => Cell::from_number(self.revenue_quarterly_growth),
            DerivedField::LastQuarter => Cell::from_text(self.last_quarter.clone()),
        }
    }
}

/// Year-over-year growth of `line_item` in percent, comparing the latest
/// reported quarter with the fourth one before it. Missing quarters are
/// skipped, so the comparison is between the 1st and 5th reported values.
pub fn yoy_growth(quarterly: Option<&QuarterlyFundamentals>, line_item: &str) -> Option<f64> {
    let values: Vec<f64> = quarterly?
        .line_item(line_item)?
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();

    if values.len() < YOY_MIN_QUARTERS {
        return None;
    }

    let (current, year_ago) = (values[0], values[YOY_MIN_QUARTERS - 1]);
    if year_ago == 0.0 {
        return None;
    }

    let pct = (current - year_ago) / year_ago * 100.0;
    Some((pct * 100.0).round() / 100.0)
}

/// `YYYY-MM-DD` of the most recent fiscal quarter end.
pub fn most_recent_quarter_label(quarterly: Option<&QuarterlyFundamentals>) -> Option<String> {
    quarterly?
        .most_recent_period()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

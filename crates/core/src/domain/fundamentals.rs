use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Fiscal-quarter table of financial line items.
///
/// `periods` is ordered most-recent-first and every line item holds one
/// slot per period, `None` where the provider reported nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuarterlyFundamentals {
    periods: Vec<NaiveDate>,
    line_items: BTreeMap<String, Vec<Option<f64>>>,
}

impl QuarterlyFundamentals {
    /// Builds the table from loose `(line item, quarter end, value)` observations.
    pub fn from_observations<I, S>(observations: I) -> Self
    where
        I: IntoIterator<Item = (S, NaiveDate, Option<f64>)>,
        S: Into<String>,
    {
        let observations: Vec<(String, NaiveDate, Option<f64>)> = observations
            .into_iter()
            .map(|(item, date, value)| (item.into(), date, value))
            .collect();

        let periods: Vec<NaiveDate> = observations
            .iter()
            .map(|(_, date, _)| *date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .rev()
            .collect();

        let mut line_items: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for (item, date, value) in observations {
            let Some(idx) = periods.iter().position(|p| *p == date) else {
                continue;
            };
            let slots = line_items
                .entry(item)
                .or_insert_with(|| vec![None; periods.len()]);
            if slots[idx].is_none() {
                slots[idx] = value;
            }
        }

        Self {
            periods,
            line_items,
        }
    }

    pub fn periods(&self) -> &[NaiveDate] {
        &self.periods
    }

    pub fn most_recent_period(&self) -> Option<NaiveDate> {
        self.periods.first().copied()
    }

    pub fn line_item(&self, name: &str) -> Option<&[Option<f64>]> {
        self.line_items.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn orders_periods_most_recent_first() {
        let table = QuarterlyFundamentals::from_observations([
            ("Total Revenue", d(2023, 12, 31), Some(10.0)),
            ("Total Revenue", d(2024, 6, 30), Some(12.0)),
            ("Total Revenue", d(2024, 3, 31), Some(11.0)),
        ]);

        assert_eq!(table.periods(), &[d(2024, 6, 30), d(2024, 3, 31), d(2023, 12, 31)]);
        assert_eq!(
            table.line_item("Total Revenue"),
            Some(&[Some(12.0), Some(11.0), Some(10.0)][..])
        );
        assert_eq!(table.most_recent_period(), Some(d(2024, 6, 30)));
    }

    #[test]
    fn aligns_sparse_line_items_to_shared_periods() {
        let table = QuarterlyFundamentals::from_observations([
            ("Total Revenue", d(2024, 6, 30), Some(12.0)),
            ("Total Revenue", d(2024, 3, 31), Some(11.0)),
            ("Net Income", d(2024, 3, 31), Some(2.0)),
        ]);

        assert_eq!(table.line_item("Net Income"), Some(&[None, Some(2.0)][..]));
        assert!(table.line_item("Gross Profit").is_none());
    }
}

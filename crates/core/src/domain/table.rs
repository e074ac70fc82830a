use chrono::NaiveDate;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

pub const DATE_HEADER: &str = "Date";

/// One resolved value. `Null` is the placeholder for anything unresolved and
/// serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn from_number(value: Option<f64>) -> Self {
        value.map(Cell::Float).unwrap_or(Cell::Null)
    }

    pub fn from_text(value: Option<String>) -> Self {
        value.map(Cell::Text).unwrap_or(Cell::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub date: NaiveDate,
    pub cells: Vec<Cell>,
}

impl Serialize for TableRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.cells.len() + 1))?;
        seq.serialize_element(&self.date.format("%Y-%m-%d").to_string())?;
        for cell in &self.cells {
            seq.serialize_element(cell)?;
        }
        seq.end()
    }
}

/// Header row plus one row per trading day, serialized as a 2-D JSON array:
/// `[["Date", f1, ...], ["2024-01-02", c1, ...], ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    fields: Vec<String>,
    rows: Vec<TableRow>,
}

impl ResultTable {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            rows: Vec::new(),
        }
    }

    /// Appends a row. The cell count must match the requested fields.
    pub fn push_row(&mut self, date: NaiveDate, cells: Vec<Cell>) -> anyhow::Result<()> {
        anyhow::ensure!(
            cells.len() == self.fields.len(),
            "row for {date} has {} cells, expected {}",
            cells.len(),
            self.fields.len()
        );
        self.rows.push(TableRow { date, cells });
        Ok(())
    }

    pub fn header(&self) -> Vec<&str> {
        std::iter::once(DATE_HEADER)
            .chain(self.fields.iter().map(String::as_str))
            .collect()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }
}

impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len() + 1))?;
        seq.serialize_element(&self.header())?;
        for row in &self.rows {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_header_then_rows() {
        let mut table = ResultTable::new(vec!["close".to_string(), "sector".to_string(), "nope".to_string()]);
        table
            .push_row(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                vec![Cell::Float(185.5), Cell::Text("Technology".to_string()), Cell::Null],
            )
            .unwrap();

        let v = serde_json::to_value(&table).unwrap();
        assert_eq!(
            v,
            json!([
                ["Date", "close", "sector", "nope"],
                ["2024-01-02", 185.5, "Technology", null],
            ])
        );
    }

    #[test]
    fn rejects_rows_with_wrong_width() {
        let mut table = ResultTable::new(vec!["Close".to_string()]);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(table.push_row(date, vec![]).is_err());
        assert!(table.push_row(date, vec![Cell::Null, Cell::Null]).is_err());
        assert!(table.rows().is_empty());
    }

    #[test]
    fn integer_cells_stay_integers() {
        let v = serde_json::to_value(Cell::Int(1_000_000)).unwrap();
        assert_eq!(v, json!(1_000_000));
        assert!(v.is_i64());
    }
}

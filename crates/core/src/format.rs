use crate::domain::metadata::Scalar;
use crate::domain::table::Cell;
use std::str::FromStr;

/// One crore is ten million.
pub const CRORE: f64 = 10_000_000.0;
pub const CRORE_LABEL: &str = "Cr";

/// How monetary fields (market cap) are presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MoneyFormat {
    #[default]
    Plain,
    Crore,
}

impl FromStr for MoneyFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "plain" => Ok(Self::Plain),
            "crore" | "cr" => Ok(Self::Crore),
            other => anyhow::bail!("unknown money format: {other} (expected plain or crore)"),
        }
    }
}

impl MoneyFormat {
    pub fn cell(self, value: Option<&Scalar>) -> Cell {
        match self {
            MoneyFormat::Plain => Cell::from_number(safe_number(value)),
            MoneyFormat::Crore => Cell::from_text(format_regional_currency(value)),
        }
    }
}

/// Coerces a metadata value to a finite float. Never fails; `None` is the null marker.
///
/// Numeric strings are accepted. Booleans are not numbers here.
pub fn safe_number(value: Option<&Scalar>) -> Option<f64> {
    let n = match value? {
        Scalar::Number(n) => *n,
        Scalar::Text(s) => s.trim().parse::<f64>().ok()?,
        Scalar::Bool(_) => return None,
    };
    n.is_finite().then_some(n)
}

/// Renders a raw amount in crore units with Indian digit grouping, e.g.
/// `123456789` -> `"12.35 Cr"`, `12345678901234` -> `"12,34,567.89 Cr"`.
pub fn format_regional_currency(value: Option<&Scalar>) -> Option<String> {
    let crores = safe_number(value)? / CRORE;
    let fixed = format!("{:.2}", crores.abs());
    let (int_part, frac_part) = fixed.split_once('.')?;
    let sign = if crores < 0.0 && fixed != "0.00" { "-" } else { "" };
    Some(format!(
        "{sign}{}.{frac_part} {CRORE_LABEL}",
        group_indian(int_part)
    ))
}

// Last three digits form one group, everything to the left goes in pairs.
fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);

    let mut groups = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}

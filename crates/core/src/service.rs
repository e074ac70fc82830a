//! One `get_stock_data_between_dates` request, from raw query parameters to a
//! resolved table or a single-key error payload.

use crate::derived::DerivedFundamentals;
use crate::domain::metadata::Metadata;
use crate::domain::price::PriceColumn;
use crate::domain::table::ResultTable;
use crate::format::MoneyFormat;
use crate::resolve::{self, ResolveContext};
use crate::source::MarketDataSource;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FIELD: &str = "Close";
const DATE_FORMAT: &str = "%Y-%m-%d";
const WARMUP_WINDOW_DAYS: i64 = 5;

/// Raw query parameters. Every field is optional so that absence is reported
/// as a structured error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockDataQuery {
    pub symbol: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub fields: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub fields: Vec<String>,
}

impl StockDataQuery {
    pub fn validate(&self) -> Result<ValidatedQuery, RequestError> {
        let (Some(symbol), Some(start), Some(end)) = (
            present(&self.symbol),
            present(&self.start),
            present(&self.end),
        ) else {
            return Err(RequestError::MissingParameters);
        };

        Ok(ValidatedQuery {
            symbol: symbol.to_string(),
            start: parse_date("start", start)?,
            end: parse_date("end", end)?,
            fields: parse_fields(self.fields.as_deref()),
        })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(param: &'static str, value: &str) -> Result<NaiveDate, RequestError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| RequestError::InvalidDate {
        param,
        value: value.to_string(),
    })
}

/// Splits the comma-separated `fields` parameter, keeping user casing, order
/// and duplicates. Blank entries are dropped; nothing left means `Close`.
pub fn parse_fields(raw: Option<&str>) -> Vec<String> {
    let fields: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    if fields.is_empty() {
        vec![DEFAULT_FIELD.to_string()]
    } else {
        fields
    }
}

#[derive(Debug)]
pub enum RequestError {
    MissingParameters,
    InvalidDate { param: &'static str, value: String },
    EmptyResult {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    Upstream(anyhow::Error),
    Internal(anyhow::Error),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::MissingParameters => {
                write!(f, "Missing parameters: symbol, start, end")
            }
            RequestError::InvalidDate { param, value } => {
                write!(f, "Invalid date '{value}' for {param}; expected YYYY-MM-DD")
            }
            RequestError::EmptyResult { symbol, start, end } => {
                write!(f, "No data found for {symbol} between {start} and {end}.")
            }
            RequestError::Upstream(err) | RequestError::Internal(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Upstream(err) | RequestError::Internal(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// The body returned instead of a table: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl RequestError {
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.to_string(),
        }
    }
}

pub async fn get_stock_data(
    source: &dyn MarketDataSource,
    query: &StockDataQuery,
    money: MoneyFormat,
) -> Result<ResultTable, RequestError> {
    let query = query.validate()?;
    let symbol = query.symbol.as_str();

    let records = source
        .fetch_prices(symbol, query.start, query.end)
        .await
        .map_err(RequestError::Upstream)?;
    if records.is_empty() {
        return Err(RequestError::EmptyResult {
            symbol: query.symbol.clone(),
            start: query.start,
            end: query.end,
        });
    }

    let snapshot = if query.fields.iter().any(|f| PriceColumn::parse(f).is_none()) {
        source
            .fetch_snapshot(symbol)
            .await
            .map_err(RequestError::Upstream)?
    } else {
        Metadata::default()
    };

    let full = if query
        .fields
        .iter()
        .any(|f| resolve::requires_full_metadata(f, &snapshot))
    {
        source
            .fetch_full_metadata(symbol)
            .await
            .map_err(RequestError::Upstream)?
    } else {
        Metadata::default()
    };

    let quarterly = if query.fields.iter().any(|f| resolve::requires_quarterly(f)) {
        match source.fetch_quarterly(symbol).await {
            Ok(q) => q,
            Err(err) => {
                tracing::warn!(symbol, error = %err, "quarterly fundamentals unavailable; growth fields will be null");
                None
            }
        }
    } else {
        None
    };

    let derived = DerivedFundamentals::compute(&full, quarterly.as_ref());
    let ctx = ResolveContext {
        snapshot: &snapshot,
        full: &full,
        derived: &derived,
        money,
    };

    let mut table = ResultTable::new(query.fields.clone());
    for record in &records {
        let cells = query
            .fields
            .iter()
            .map(|field| resolve::resolve(record, field, &ctx))
            .collect();
        table
            .push_row(record.date, cells)
            .map_err(RequestError::Internal)?;
    }

    tracing::info!(
        provider = source.provider_name(),
        symbol,
        start = %query.start,
        end = %query.end,
        rows = records.len(),
        fields = query.fields.len(),
        "resolved stock data table"
    );
    Ok(table)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmupReport {
    pub status: &'static str,
    pub symbol: String,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Throwaway fetch for `symbol` over the five days ending with `today`, to
/// open upstream connections and obtain session credentials. Never fails.
pub async fn warm_up(source: &dyn MarketDataSource, symbol: &str, today: NaiveDate) -> WarmupReport {
    let end = today + Duration::days(1);
    let start = end - Duration::days(WARMUP_WINDOW_DAYS);

    let result = async {
        let rows = source.fetch_prices(symbol, start, end).await?;
        source.fetch_snapshot(symbol).await?;
        anyhow::Ok(rows.len())
    }
    .await;

    match result {
        Ok(rows) => {
            tracing::info!(symbol, rows, "upstream warm");
            WarmupReport {
                status: "warm",
                symbol: symbol.to_string(),
                rows,
                error: None,
            }
        }
        Err(err) => {
            tracing::warn!(symbol, error = %err, "warm-up fetch failed");
            WarmupReport {
                status: "cold",
                symbol: symbol.to_string(),
                rows: 0,
                error: Some(format!("{err:#}")),
            }
        }
    }
}

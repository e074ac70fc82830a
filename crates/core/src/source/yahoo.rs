use crate::config::Settings;
use crate::derived::{NET_INCOME, TOTAL_REVENUE};
use crate::domain::fundamentals::QuarterlyFundamentals;
use crate::domain::metadata::{Metadata, Scalar};
use crate::domain::price::PriceRecord;
use crate::source::MarketDataSource;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
// Caps the retry sleep at 32s.
const MAX_BACKOFF_SHIFT: u32 = 5;
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

// First module to provide a key wins when flattening.
const SUMMARY_MODULES: [&str; 5] = [
    "assetProfile",
    "summaryDetail",
    "defaultKeyStatistics",
    "financialData",
    "price",
];

// (quote field, snapshot key)
const SNAPSHOT_FIELDS: &[(&str, &str)] = &[
    ("regularMarketPrice", "lastPrice"),
    ("regularMarketOpen", "open"),
    ("regularMarketDayHigh", "dayHigh"),
    ("regularMarketDayLow", "dayLow"),
    ("regularMarketPreviousClose", "previousClose"),
    ("regularMarketPreviousClose", "regularMarketPreviousClose"),
    ("regularMarketVolume", "lastVolume"),
    ("fiftyTwoWeekHigh", "yearHigh"),
    ("fiftyTwoWeekLow", "yearLow"),
    ("fiftyDayAverage", "fiftyDayAverage"),
    ("twoHundredDayAverage", "twoHundredDayAverage"),
    ("averageDailyVolume10Day", "tenDayAverageVolume"),
    ("averageDailyVolume3Month", "threeMonthAverageVolume"),
    ("marketCap", "marketCap"),
    ("sharesOutstanding", "shares"),
    ("currency", "currency"),
    ("exchange", "exchange"),
    ("quoteType", "quoteType"),
    ("exchangeTimezoneName", "timezone"),
];

// (timeseries type, line item)
const QUARTERLY_SERIES: &[(&str, &str)] = &[
    ("quarterlyTotalRevenue", TOTAL_REVENUE),
    ("quarterlyNetIncome", NET_INCOME),
];

// Enough history for five reported quarters plus reporting lag.
const QUARTERLY_LOOKBACK_DAYS: i64 = 800;

#[derive(Debug)]
pub struct YahooSource {
    http: reqwest::Client,
    base_url: String,
    cookie_url: String,
    retries: u32,

    // Crumb is tied to the session cookie held by `http`; reused until Yahoo rejects it.
    crumb_cache: tokio::sync::Mutex<Option<String>>,
}

enum Attempt {
    Retry(anyhow::Error),
    Fail(anyhow::Error),
}

impl YahooSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .yahoo_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let cookie_url = std::env::var("YAHOO_COOKIE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COOKIE_URL.to_string());

        let timeout_secs = std::env::var("YAHOO_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("YAHOO_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let mut headers = HeaderMap::new();
        headers.insert("referer", HeaderValue::from_static("https://finance.yahoo.com/"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .context("failed to build Yahoo http client")?;

        Ok(Self {
            http,
            base_url,
            cookie_url,
            retries,
            crumb_cache: tokio::sync::Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid Yahoo base url: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Yahoo base url cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn crumb(&self) -> Result<String> {
        let mut guard = self.crumb_cache.lock().await;
        if let Some(crumb) = guard.as_ref() {
            return Ok(crumb.clone());
        }
        let crumb = self.fetch_crumb().await?;
        *guard = Some(crumb.clone());
        Ok(crumb)
    }

    async fn invalidate_crumb(&self) {
        *self.crumb_cache.lock().await = None;
    }

    async fn fetch_crumb(&self) -> Result<String> {
        // Only the Set-Cookie matters here; fc.yahoo.com answers 404 regardless.
        self.http
            .get(&self.cookie_url)
            .send()
            .await
            .context("Yahoo cookie request failed")?;

        let res = self
            .http
            .get(self.endpoint(&["v1", "test", "getcrumb"])?)
            .send()
            .await
            .context("Yahoo crumb request failed")?;
        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Yahoo crumb response")?;
        let crumb = text.trim();

        anyhow::ensure!(status.is_success(), "Yahoo crumb HTTP {status}: {crumb}");
        anyhow::ensure!(is_plausible_crumb(crumb), "Yahoo returned an unusable crumb: {crumb}");
        tracing::debug!("obtained Yahoo crumb");
        Ok(crumb.to_string())
    }

    async fn get_json(
        &self,
        url: reqwest::Url,
        query: &[(&str, String)],
        with_crumb: bool,
    ) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(url.clone(), query, with_crumb).await {
                Ok(body) => return Ok(body),
                Err(Attempt::Fail(err)) => return Err(err),
                Err(Attempt::Retry(err)) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(attempt, ?backoff, url = %url.path(), error = %err, "Yahoo request failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn get_once(
        &self,
        url: reqwest::Url,
        query: &[(&str, String)],
        with_crumb: bool,
    ) -> std::result::Result<Value, Attempt> {
        let mut req = self.http.get(url).query(query);
        if with_crumb {
            let crumb = self.crumb().await.map_err(Attempt::Retry)?;
            req = req.query(&[("crumb", crumb)]);
        }

        let res = req
            .send()
            .await
            .context("Yahoo request failed")
            .map_err(Attempt::Retry)?;
        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Yahoo response")
            .map_err(Attempt::Retry)?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::TOO_MANY_REQUESTS {
            self.invalidate_crumb().await;
            return Err(Attempt::Retry(anyhow::anyhow!("Yahoo HTTP {status}")));
        }
        if status.is_server_error() {
            return Err(Attempt::Retry(anyhow::anyhow!("Yahoo HTTP {status}: {text}")));
        }

        let body = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("Yahoo response is not valid JSON (HTTP {status}): {text}"))
            .map_err(Attempt::Fail)?;

        if !status.is_success() {
            return Err(Attempt::Fail(anyhow::anyhow!(
                "Yahoo HTTP {status}: {}",
                describe_error(&body)
            )));
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl MarketDataSource for YahooSource {
    fn provider_name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>> {
        if start >= end {
            tracing::debug!(symbol, %start, %end, "empty date range; skipping chart request");
            return Ok(Vec::new());
        }

        let url = self.endpoint(&["v8", "finance", "chart", symbol])?;
        let (period1, period2) = chart_bounds(start, end)?;
        let query = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_string()),
            ("events", "div,splits".to_string()),
            ("includePrePost", "false".to_string()),
        ];
        let body = self.get_json(url, &query, false).await?;

        let rows = clip_to_range(parse_chart_prices(body)?, start, end);
        tracing::debug!(symbol, rows = rows.len(), "fetched Yahoo price history");
        Ok(rows)
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<Metadata> {
        let url = self.endpoint(&["v7", "finance", "quote"])?;
        let body = self
            .get_json(url, &[("symbols", symbol.to_string())], true)
            .await?;
        parse_quote_snapshot(&body).with_context(|| format!("no snapshot for {symbol}"))
    }

    async fn fetch_full_metadata(&self, symbol: &str) -> Result<Metadata> {
        let url = self.endpoint(&["v10", "finance", "quoteSummary", symbol])?;
        let body = self
            .get_json(url, &[("modules", SUMMARY_MODULES.join(","))], true)
            .await?;
        flatten_quote_summary(&body).with_context(|| format!("no metadata for {symbol}"))
    }

    async fn fetch_quarterly(&self, symbol: &str) -> Result<Option<QuarterlyFundamentals>> {
        let url = self.endpoint(&[
            "ws",
            "fundamentals-timeseries",
            "v1",
            "finance",
            "timeseries",
            symbol,
        ])?;
        let now = Utc::now();
        let from = now - chrono::Duration::days(QUARTERLY_LOOKBACK_DAYS);
        let types: Vec<&str> = QUARTERLY_SERIES.iter().map(|(t, _)| *t).collect();
        let query = [
            ("symbol", symbol.to_string()),
            ("type", types.join(",")),
            ("period1", from.timestamp().to_string()),
            ("period2", now.timestamp().to_string()),
        ];
        let body = self.get_json(url, &query, false).await?;
        parse_timeseries(&body)
    }
}

fn day_start_timestamp(date: NaiveDate) -> Result<i64> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .with_context(|| format!("invalid date {date}"))
}

/// `period1`/`period2` for a `[start, end)` request. Exchanges east of UTC
/// stamp their daily bar before midnight UTC, so `period1` starts a day early
/// and [`clip_to_range`] drops the surplus row.
fn chart_bounds(start: NaiveDate, end: NaiveDate) -> Result<(i64, i64)> {
    let widened = start
        .pred_opt()
        .with_context(|| format!("invalid date {start}"))?;
    Ok((day_start_timestamp(widened)?, day_start_timestamp(end)?))
}

fn clip_to_range(rows: Vec<PriceRecord>, start: NaiveDate, end: NaiveDate) -> Vec<PriceRecord> {
    rows.into_iter()
        .filter(|r| r.date >= start && r.date < end)
        .collect()
}

fn retry_backoff(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_secs(1 << shift)
}

fn is_plausible_crumb(crumb: &str) -> bool {
    !crumb.is_empty()
        && crumb.len() < 100
        && !crumb.contains(char::is_whitespace)
        && !crumb.contains('<')
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.description) {
            (_, Some(description)) => f.write_str(description),
            (Some(code), None) => f.write_str(code),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: ChartIndicators,
    #[serde(default)]
    events: ChartEvents,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    // Seconds east of UTC for the listing exchange.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

// Keyed by event timestamp.
#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: BTreeMap<String, DividendEvent>,
    #[serde(default)]
    splits: BTreeMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    date: i64,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn at(values: &[Option<f64>], idx: usize) -> Option<f64> {
    values.get(idx).copied().flatten().filter(|v| v.is_finite())
}

fn local_date(ts: i64, gmtoffset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts + gmtoffset, 0).map(|dt| dt.date_naive())
}

impl ChartEvents {
    fn dividends_by_date(&self, gmtoffset: i64) -> BTreeMap<NaiveDate, f64> {
        let mut by_date = BTreeMap::new();
        for event in self.dividends.values() {
            if let Some(date) = local_date(event.date, gmtoffset) {
                *by_date.entry(date).or_insert(0.0) += event.amount;
            }
        }
        by_date
    }

    fn splits_by_date(&self, gmtoffset: i64) -> BTreeMap<NaiveDate, f64> {
        self.splits
            .values()
            .filter(|event| event.denominator != 0.0)
            .filter_map(|event| {
                let date = local_date(event.date, gmtoffset)?;
                Some((date, event.numerator / event.denominator))
            })
            .collect()
    }
}

/// Daily rows from a chart response, ascending and one per exchange-local date.
/// Rows missing any of open/high/low/close are dropped. Dividend and split
/// events land on the row of the same local date.
fn parse_chart_prices(body: Value) -> Result<Vec<PriceRecord>> {
    let parsed: ChartResponse =
        serde_json::from_value(body).context("failed to parse Yahoo chart response")?;
    if let Some(err) = parsed.chart.error {
        anyhow::bail!("Yahoo chart error: {err}");
    }
    let Some(result) = parsed.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let gmtoffset = result.meta.gmtoffset;
    let dividends = result.events.dividends_by_date(gmtoffset);
    let splits = result.events.splits_by_date(gmtoffset);
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .unwrap_or_default()
        .adjclose;
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut rows = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close)) = (
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
        ) else {
            continue;
        };
        let Some(date) = local_date(*ts, gmtoffset) else {
            continue;
        };
        let volume = at(&quote.volume, i).map(|v| v.round() as i64).unwrap_or(0);

        rows.push(PriceRecord {
            date,
            open,
            high,
            low,
            close,
            volume,
            adj_close: at(&adjclose, i),
            dividends: dividends.get(&date).copied().unwrap_or(0.0),
            stock_splits: splits.get(&date).copied().unwrap_or(0.0),
        });
    }

    rows.sort_by_key(|r| r.date);
    rows.dedup_by_key(|r| r.date);
    Ok(rows)
}

fn parse_quote_snapshot(body: &Value) -> Result<Metadata> {
    if let Some(err) = body.pointer("/quoteResponse/error").filter(|e| !e.is_null()) {
        anyhow::bail!("Yahoo quote error: {}", describe_error_value(err));
    }
    let quote = body
        .pointer("/quoteResponse/result/0")
        .context("Yahoo quote response has no result")?;

    let mut snapshot = Metadata::new();
    for (quote_key, snapshot_key) in SNAPSHOT_FIELDS {
        if let Some(value) = quote.get(*quote_key).and_then(scalar_from_json) {
            snapshot.insert_if_absent(snapshot_key, value);
        }
    }
    Ok(snapshot)
}

fn flatten_quote_summary(body: &Value) -> Result<Metadata> {
    if let Some(err) = body.pointer("/quoteSummary/error").filter(|e| !e.is_null()) {
        anyhow::bail!("Yahoo quoteSummary error: {}", describe_error_value(err));
    }
    let result = body
        .pointer("/quoteSummary/result/0")
        .context("Yahoo quoteSummary response has no result")?;

    let mut full = Metadata::new();
    for module in SUMMARY_MODULES {
        let Some(fields) = result.get(module).and_then(Value::as_object) else {
            continue;
        };
        for (key, value) in fields {
            if let Some(scalar) = scalar_from_json(value) {
                full.insert_if_absent(key, scalar);
            }
        }
    }
    Ok(full)
}

fn parse_timeseries(body: &Value) -> Result<Option<QuarterlyFundamentals>> {
    let results = body
        .pointer("/timeseries/result")
        .and_then(Value::as_array)
        .context("Yahoo timeseries response has no result")?;

    let mut observations = Vec::new();
    for series in results {
        let Some(kind) = series.pointer("/meta/type/0").and_then(Value::as_str) else {
            continue;
        };
        let Some(line_item) = QUARTERLY_SERIES
            .iter()
            .find(|(t, _)| *t == kind)
            .map(|(_, item)| *item)
        else {
            continue;
        };
        let Some(points) = series.get(kind).and_then(Value::as_array) else {
            continue;
        };
        for point in points {
            let Some(date) = point
                .get("asOfDate")
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            else {
                continue;
            };
            let value = point.pointer("/reportedValue/raw").and_then(Value::as_f64);
            observations.push((line_item, date, value));
        }
    }

    if observations.is_empty() {
        return Ok(None);
    }
    Ok(Some(QuarterlyFundamentals::from_observations(observations)))
}

/// Provider values are either bare scalars or `{"raw": 1.0, "fmt": "1.00"}` wrappers.
fn scalar_from_json(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => n.as_f64().map(Scalar::Number),
        Value::String(s) => Some(Scalar::Text(s.clone())),
        Value::Object(obj) => obj.get("raw").and_then(Value::as_f64).map(Scalar::Number),
        Value::Null | Value::Array(_) => None,
    }
}

// Error bodies look like {"chart": {"result": null, "error": {"code": .., "description": ..}}}.
fn describe_error(body: &Value) -> String {
    body.as_object()
        .and_then(|obj| obj.values().find_map(|v| v.get("error")))
        .filter(|e| !e.is_null())
        .map(describe_error_value)
        .unwrap_or_else(|| body.to_string())
}

fn describe_error_value(err: &Value) -> String {
    err.get("description")
        .or_else(|| err.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

pub mod yahoo;

use crate::domain::fundamentals::QuarterlyFundamentals;
use crate::domain::metadata::Metadata;
use crate::domain::price::PriceRecord;
use anyhow::Result;
use chrono::NaiveDate;

/// Upstream market data for one symbol. Each method is called at most once per request.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily rows in `[start, end)`, ascending by date.
    async fn fetch_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>>;

    /// Point-in-time snapshot (`yearHigh`, `yearLow`, `marketCap`, ...).
    async fn fetch_snapshot(&self, symbol: &str) -> Result<Metadata>;

    /// Descriptive and fundamental attributes (`trailingPE`, `sector`, ...).
    async fn fetch_full_metadata(&self, symbol: &str) -> Result<Metadata>;

    /// Quarterly line items, or `None` when the provider has none for the symbol.
    async fn fetch_quarterly(&self, symbol: &str) -> Result<Option<QuarterlyFundamentals>>;
}

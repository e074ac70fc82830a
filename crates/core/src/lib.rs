pub mod derived;
pub mod domain;
pub mod format;
pub mod resolve;
pub mod service;
pub mod source;

pub mod config {
    use crate::format::MoneyFormat;
    use anyhow::Context;

    pub const DEFAULT_WARMUP_SYMBOL: &str = "AAPL";

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub yahoo_base_url: Option<String>,
        pub money_format: Option<String>,
        pub warmup_symbol: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                yahoo_base_url: non_empty_var("YAHOO_BASE_URL"),
                money_format: non_empty_var("MONEY_FORMAT"),
                warmup_symbol: non_empty_var("WARMUP_SYMBOL"),
            })
        }

        pub fn money_format(&self) -> anyhow::Result<MoneyFormat> {
            match self.money_format.as_deref() {
                Some(raw) => raw.parse().context("MONEY_FORMAT is invalid"),
                None => Ok(MoneyFormat::default()),
            }
        }

        pub fn warmup_symbol(&self) -> &str {
            self.warmup_symbol
                .as_deref()
                .unwrap_or(DEFAULT_WARMUP_SYMBOL)
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn defaults_apply_when_unset() {
            let settings = Settings::default();
            assert_eq!(settings.money_format().unwrap(), MoneyFormat::Plain);
            assert_eq!(settings.warmup_symbol(), DEFAULT_WARMUP_SYMBOL);
        }

        #[test]
        fn money_format_is_validated() {
            let settings = Settings {
                money_format: Some("crore".to_string()),
                ..Default::default()
            };
            assert_eq!(settings.money_format().unwrap(), MoneyFormat::Crore);

            let settings = Settings {
                money_format: Some("lakh".to_string()),
                ..Default::default()
            };
            assert!(settings.money_format().is_err());
        }
    }
}

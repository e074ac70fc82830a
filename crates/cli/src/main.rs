use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockfields_core::format::MoneyFormat;
use stockfields_core::service::{self, StockDataQuery};
use stockfields_core::source::yahoo::YahooSource;

#[derive(Debug, Parser)]
#[command(name = "stockfields")]
struct Args {
    /// Ticker symbol, e.g. AAPL or RELIANCE.NS.
    #[arg(long)]
    symbol: Option<String>,

    /// First date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    start: Option<String>,

    /// Last date (YYYY-MM-DD), exclusive.
    #[arg(long)]
    end: Option<String>,

    /// Comma-separated field names. Defaults to Close.
    #[arg(long)]
    fields: Option<String>,

    /// Overrides MONEY_FORMAT (plain or crore).
    #[arg(long)]
    money_format: Option<MoneyFormatArg>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum MoneyFormatArg {
    Plain,
    Crore,
}

impl From<MoneyFormatArg> for MoneyFormat {
    fn from(value: MoneyFormatArg) -> Self {
        match value {
            MoneyFormatArg::Plain => MoneyFormat::Plain,
            MoneyFormatArg::Crore => MoneyFormat::Crore,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockfields_core::config::Settings::from_env()?;
    let sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let money_format = match args.money_format {
        Some(arg) => arg.into(),
        None => settings.money_format()?,
    };
    let source = YahooSource::from_settings(&settings)?;

    let query = StockDataQuery {
        symbol: args.symbol,
        start: args.start,
        end: args.end,
        fields: args.fields,
    };

    let (body, ok) = match service::get_stock_data(&source, &query, money_format).await {
        Ok(table) => (serde_json::to_value(&table)?, true),
        Err(err) => {
            if let service::RequestError::Upstream(e) = &err {
                sentry_anyhow::capture_anyhow(e);
            }
            tracing::error!(error = %err, "request failed");
            (serde_json::to_value(err.payload())?, false)
        }
    };

    let out = if args.pretty {
        serde_json::to_string_pretty(&body)?
    } else {
        serde_json::to_string(&body)?
    };
    println!("{out}");

    if !ok {
        drop(sentry_guard);
        std::process::exit(1);
    }
    Ok(())
}

fn init_sentry(settings: &stockfields_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

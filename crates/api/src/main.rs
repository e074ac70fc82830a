use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockfields_core::format::MoneyFormat;
use stockfields_core::service::{self, RequestError, StockDataQuery, WarmupReport};
use stockfields_core::source::yahoo::YahooSource;
use stockfields_core::source::MarketDataSource;

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockfields_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let money_format = settings.money_format()?;
    let source = YahooSource::from_settings(&settings)?;

    let state = AppState {
        source: Arc::new(source),
        money_format,
        warmup_symbol: settings.warmup_symbol().to_string(),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, ?money_format, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/warmup", get(warmup))
        .route(
            "/get_stock_data_between_dates",
            get(get_stock_data_between_dates),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    source: Arc<dyn MarketDataSource>,
    money_format: MoneyFormat,
    warmup_symbol: String,
}

async fn warmup(State(state): State<AppState>) -> Json<WarmupReport> {
    let today = chrono::Utc::now().date_naive();
    Json(service::warm_up(state.source.as_ref(), &state.warmup_symbol, today).await)
}

async fn get_stock_data_between_dates(
    State(state): State<AppState>,
    Query(query): Query<StockDataQuery>,
) -> Response {
    match service::get_stock_data(state.source.as_ref(), &query, state.money_format).await {
        Ok(table) => Json(table).into_response(),
        Err(err) => {
            match &err {
                RequestError::Upstream(e) | RequestError::Internal(e) => {
                    sentry_anyhow::capture_anyhow(e);
                    tracing::error!(symbol = ?query.symbol, error = %err, "stock data request failed");
                }
                _ => tracing::info!(symbol = ?query.symbol, error = %err, "stock data request rejected"),
            }
            (status_for(&err), Json(err.payload())).into_response()
        }
    }
}

fn status_for(err: &RequestError) -> StatusCode {
    match err {
        RequestError::MissingParameters | RequestError::InvalidDate { .. } => {
            StatusCode::BAD_REQUEST
        }
        RequestError::EmptyResult { .. } => StatusCode::NOT_FOUND,
        RequestError::Upstream(_) => StatusCode::BAD_GATEWAY,
        RequestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_request_errors_to_statuses() {
        assert_eq!(status_for(&RequestError::MissingParameters), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&RequestError::InvalidDate {
                param: "end",
                value: "tomorrow".to_string()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&RequestError::Upstream(anyhow::anyhow!("timeout"))),
            StatusCode::BAD_GATEWAY
        );
    }
}

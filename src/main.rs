// src/main.rs
use crate::config::AppConfig;
use crate::connectors::binance::{connect_trade_feed, spawn_notice_feed, spawn_trade_receiver, BinanceClient};
use crate::connectors::traits::MarketData;
use crate::core::engine::{FeedInbox, IngestionEngine};
use crate::core::filter::MarketCache;
use crate::core::refresher::TickerRefresher;
use crate::core::subscriptions::SubscriptionManager;
use crate::storage::EventStore;
use crate::tui::TuiContext;
use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod config;
mod connectors;
mod core;
mod error;
mod storage;
mod tui;
mod types;
mod utils;

const LOG_FILE: &str = "bintel.log";
const UI_CHANNEL_CAPACITY: usize = 1000;

/// File logging only: the terminal belongs to the dashboard. The returned
/// guard flushes the writer when dropped.
fn init_logging(config: &AppConfig) -> Option<WorkerGuard> {
    if config.disable_logging {
        return None;
    }

    let appender = tracing_appender::rolling::never(&config.data_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Configuration and logging
    let config = Arc::new(AppConfig::new().context("Failed to load configuration")?);
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("Unable to create data directory {}", config.data_dir.display())
    })?;
    let _log_guard = init_logging(&config);
    info!("bintel {} starting", env!("CARGO_PKG_VERSION"));

    let log_raw = config.log_raw();

    // 2. Storage and REST collaborators
    let store = Arc::new(EventStore::open(&config).context("Unable to open event database")?);
    let market: Arc<dyn MarketData> =
        Arc::new(BinanceClient::new(config.endpoints.rest_url.as_str()));
    let cache = MarketCache::shared();

    // 3. Feeds
    let (notice_tx, notices) = mpsc::unbounded_channel();
    let (notice_control_tx, notice_control) = mpsc::unbounded_channel();
    let notice_task = spawn_notice_feed(
        &config.endpoints.notices_url,
        notice_tx,
        notice_control_tx,
        log_raw,
    )?;

    let (trade_sink, trade_source) = connect_trade_feed(&config.endpoints.trades_url)
        .await
        .context("Unable to open trade websocket connection")?;
    let (trade_tx, trades) = mpsc::unbounded_channel();
    let (trade_control_tx, trade_control) = mpsc::unbounded_channel();
    let trade_task = spawn_trade_receiver(trade_source, trade_tx, trade_control_tx, log_raw);

    let (subscription_manager, subscriptions) = SubscriptionManager::new(log_raw);
    let transmit_task = tokio::spawn(subscription_manager.run(trade_sink));

    // 4. Ingestion and periodic refresh
    let (ui_tx, ui_rx) = mpsc::channel(UI_CHANNEL_CAPACITY);
    let (selection_tx, selection_rx) = watch::channel(None);

    let engine = IngestionEngine::new(
        config.clone(),
        market.clone(),
        cache.clone(),
        store.clone(),
        ui_tx.clone(),
    );
    let engine_task = tokio::spawn(engine.run(FeedInbox {
        notices,
        notice_control,
        trades,
        trade_control,
    }));

    let refresher = TickerRefresher::new(
        market,
        cache.clone(),
        store,
        config.ticker_timer(),
        selection_rx,
        ui_tx,
    );
    let refresh_task = tokio::spawn(refresher.run());

    // 5. Terminal on the main task
    let result = tui::run(
        ui_rx,
        TuiContext {
            subscriptions,
            selection: selection_tx,
            cache,
            quotes: config.trades.quotes.clone(),
        },
    )
    .await;

    for task in [notice_task, trade_task, transmit_task, engine_task, refresh_task] {
        task.abort();
    }
    info!("Shutdown complete");

    result
}

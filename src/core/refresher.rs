// src/core/refresher.rs
use crate::connectors::traits::MarketData;
use crate::core::filter::SharedCache;
use crate::storage::EventStore;
use crate::types::UiEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

/// Periodic ticker refresh, independent from the ingestion loop.
pub struct TickerRefresher {
    market: Arc<dyn MarketData>,
    cache: SharedCache,
    store: Arc<EventStore>,
    period: Duration,
    /// Symbol shown in the detail pane, e.g. `ADAUSDT`.
    selection: watch::Receiver<Option<String>>,
    ui_sender: mpsc::Sender<UiEvent>,
}

impl TickerRefresher {
    pub fn new(
        market: Arc<dyn MarketData>,
        cache: SharedCache,
        store: Arc<EventStore>,
        period: Duration,
        selection: watch::Receiver<Option<String>>,
        ui_sender: mpsc::Sender<UiEvent>,
    ) -> Self {
        Self {
            market,
            cache,
            store,
            period,
            selection,
            ui_sender,
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            if self.ui_sender.is_closed() {
                break;
            }
            self.refresh_once().await;
        }
    }

    /// Refreshes every symbol seen in the sample window, then the selected
    /// one. Returns how many tickers were updated.
    pub async fn refresh_once(&self) -> usize {
        let mut symbols = match self.store.recent_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                error!("Error fetching recent symbols: {}", e);
                Vec::new()
            }
        };

        let selected = self.selection.borrow().clone();
        if let Some(symbol) = &selected {
            if !symbols.contains(symbol) {
                symbols.push(symbol.clone());
            }
        }

        let mut updated = 0;
        for symbol in &symbols {
            match self.market.fetch_ticker(symbol).await {
                Ok(ticker) => {
                    self.cache.write().insert_ticker(symbol, ticker);
                    updated += 1;
                }
                Err(e) => warn!("Ticker refresh failed for {}: {}", symbol, e),
            }
        }
        debug!(updated, "Ticker refresh done");

        if let Some(symbol) = selected {
            let ticker = self.cache.read().ticker(&symbol).cloned();
            if let Some(ticker) = ticker {
                if let Err(mpsc::error::TrySendError::Closed(_)) =
                    self.ui_sender.try_send(UiEvent::Detail { symbol, ticker })
                {
                    error!("UI Channel closed! Interface is likely dead.");
                }
            }
        }

        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::core::filter::MarketCache;
    use crate::core::testing::{notice, StubMarket};
    use crate::types::NoticeType;

    #[tokio::test]
    async fn test_refresh_recent_and_selected() {
        let market = StubMarket::new()
            .with_pair("ADAUSDT", "ADA", "USDT", 0.3)
            .with_pair("BTCUSDT", "BTC", "USDT", 20_000.0);
        let store = Arc::new(EventStore::open_in_memory(&DbConfig::default()).unwrap());
        store
            .insert_event(&notice(NoticeType::BlockTrade, "ADA", "USDT"))
            .await
            .unwrap();
        // unknown to the exchange
        store
            .insert_event(&notice(NoticeType::BlockTrade, "NOPE", "USDT"))
            .await
            .unwrap();

        let cache = MarketCache::shared();
        let (_select_tx, select_rx) = watch::channel(Some("BTCUSDT".to_string()));
        let (ui_tx, mut ui_rx) = mpsc::channel(8);
        let refresher = TickerRefresher::new(
            Arc::new(market),
            cache.clone(),
            store,
            Duration::from_secs(30),
            select_rx,
            ui_tx,
        );

        assert_eq!(refresher.refresh_once().await, 2);
        assert_eq!(cache.read().ticker("ADAUSDT").unwrap().last_price, 0.3);

        match ui_rx.try_recv().unwrap() {
            UiEvent::Detail { symbol, ticker } => {
                assert_eq!(symbol, "BTCUSDT");
                assert_eq!(ticker.last_price, 20_000.0);
            }
            other => panic!("unexpected ui event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_without_selection_sends_nothing() {
        let store = Arc::new(EventStore::open_in_memory(&DbConfig::default()).unwrap());
        let (_select_tx, select_rx) = watch::channel(None);
        let (ui_tx, mut ui_rx) = mpsc::channel(8);
        let refresher = TickerRefresher::new(
            Arc::new(StubMarket::new()),
            MarketCache::shared(),
            store,
            Duration::from_secs(30),
            select_rx,
            ui_tx,
        );

        assert_eq!(refresher.refresh_once().await, 0);
        assert!(ui_rx.try_recv().is_err());
    }
}

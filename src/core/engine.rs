// src/core/engine.rs
use crate::config::AppConfig;
use crate::connectors::traits::MarketData;
use crate::core::filter::{EventFilter, SharedCache, TradeFilter};
use crate::core::stats::RollingTradeStats;
use crate::storage::EventStore;
use crate::tui::render::{notice_row, trade_row};
use crate::types::{Feed, FeedControl, NoticeEvent, TickerSnapshot, Trade, UiEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Receiving ends of both feed tasks.
pub struct FeedInbox {
    pub notices: mpsc::UnboundedReceiver<NoticeEvent>,
    pub notice_control: mpsc::UnboundedReceiver<FeedControl>,
    pub trades: mpsc::UnboundedReceiver<Trade>,
    pub trade_control: mpsc::UnboundedReceiver<FeedControl>,
}

/// Single consumer of both feeds: filters, persists, keeps the running
/// trade statistics and pushes view updates to the terminal.
pub struct IngestionEngine {
    config: Arc<AppConfig>,
    market: Arc<dyn MarketData>,
    cache: SharedCache,
    store: Arc<EventStore>,
    trade_filter: TradeFilter,
    stats: RollingTradeStats,
    ui_sender: mpsc::Sender<UiEvent>,
}

impl IngestionEngine {
    pub fn new(
        config: Arc<AppConfig>,
        market: Arc<dyn MarketData>,
        cache: SharedCache,
        store: Arc<EventStore>,
        ui_sender: mpsc::Sender<UiEvent>,
    ) -> Self {
        let trade_filter =
            TradeFilter::new(&config.trades, market.clone(), cache.clone(), config.log_raw());
        Self {
            config,
            market,
            cache,
            store,
            trade_filter,
            stats: RollingTradeStats::new(),
            ui_sender,
        }
    }

    fn send_ui_event(&self, event: UiEvent) {
        match self.ui_sender.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("UI Channel closed! Interface is likely dead.");
            }
        }
    }

    /// Runs until every feed channel is closed.
    pub async fn run(mut self, mut inbox: FeedInbox) {
        info!("Ingestion loop running");

        loop {
            tokio::select! {
                Some(event) = inbox.notices.recv() => {
                    self.handle_notice(event).await;
                }
                Some(signal) = inbox.notice_control.recv() => {
                    self.handle_control(Feed::Notices, signal);
                }
                Some(trade) = inbox.trades.recv() => {
                    self.handle_trade(trade).await;
                }
                Some(signal) = inbox.trade_control.recv() => {
                    self.handle_control(Feed::Trades, signal);
                }
                else => break,
            }

            self.refresh_views().await;
        }

        info!("Ingestion loop finished: all feeds closed");
    }

    /// Filter snapshot is rebuilt per notice from the configuration.
    pub async fn handle_notice(&mut self, event: NoticeEvent) -> bool {
        let filter = EventFilter::from_config(&self.config.filter);
        if !filter.matches(&event) {
            return false;
        }

        if let Err(e) = self.store.insert_event(&event).await {
            error!("Error inserting event into db: {}", e);
        }

        let ticker = self.ticker_for(&event.symbol, true).await;
        if let Some(row) = notice_row(&event, &ticker) {
            self.send_ui_event(UiEvent::Feed(row));
        }
        true
    }

    pub async fn handle_trade(&mut self, trade: Trade) -> bool {
        if !self.trade_filter.matches(&trade, &mut self.stats).await {
            return false;
        }

        let info = self.cache.read().symbol_info(&trade.symbol).cloned();
        let Some(info) = info else {
            warn!("Accepted trade for {} without metadata", trade.symbol);
            return false;
        };

        if let Err(e) = self.store.insert_trade(&trade, &info).await {
            error!("Error inserting trade into db: {}", e);
        }

        let ticker = self.ticker_for(&trade.symbol, false).await;
        self.send_ui_event(UiEvent::Feed(trade_row(&trade, &info, &ticker)));
        true
    }

    fn handle_control(&self, feed: Feed, signal: FeedControl) {
        let status = match &signal {
            FeedControl::Connected => {
                info!("{} feed connected", feed);
                format!("{} feed connected", feed)
            }
            FeedControl::Error(reason) => {
                warn!("{} feed error: {}", feed, reason);
                format!("{} feed error: {}", feed, reason)
            }
            FeedControl::Disconnected => {
                warn!("{} feed disconnected", feed);
                format!("{} feed disconnected", feed)
            }
        };
        self.send_ui_event(UiEvent::Status(status));
    }

    /// Cached ticker for `symbol`, refetched when it looks unpopulated.
    /// Fetch failures yield an empty snapshot.
    async fn ticker_for(&self, symbol: &str, needs_price: bool) -> TickerSnapshot {
        let cached = self.cache.read().ticker(symbol).cloned();
        if let Some(ticker) = cached {
            let populated = ticker.price_change_percent != 0.0
                && (!needs_price || ticker.last_price != 0.0);
            if populated {
                return ticker;
            }
        }

        match self.market.fetch_ticker(symbol).await {
            Ok(ticker) => {
                self.cache.write().insert_ticker(symbol, ticker.clone());
                ticker
            }
            Err(e) => {
                warn!("Failed to fetch ticker for {}: {}", symbol, e);
                TickerSnapshot::default()
            }
        }
    }

    /// Pushes the trend statistics and the momentum ranking. The terminal
    /// keeps its previous text while either renders empty.
    async fn refresh_views(&self) {
        self.send_ui_event(UiEvent::Trend(self.stats));

        let rows = match self.store.momentum().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Error executing momentum query: {}", e);
                return;
            }
        };
        let block_buy_share = match self.store.block_buy_share().await {
            Ok(share) => share,
            Err(e) => {
                error!("Error executing block trade balance query: {}", e);
                None
            }
        };
        self.send_ui_event(UiEvent::Momentum {
            rows,
            block_buy_share,
        });
    }

    #[cfg(test)]
    pub fn stats(&self) -> RollingTradeStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::filter::MarketCache;
    use crate::core::testing::{notice, trade, StubMarket};
    use crate::types::NoticeType;

    fn engine_with(
        config: AppConfig,
        market: StubMarket,
    ) -> (IngestionEngine, Arc<EventStore>, mpsc::Receiver<UiEvent>) {
        let store = Arc::new(EventStore::open_in_memory(&config.db).unwrap());
        let (ui_tx, ui_rx) = mpsc::channel(256);
        let engine = IngestionEngine::new(
            Arc::new(config),
            Arc::new(market),
            MarketCache::shared(),
            store.clone(),
            ui_tx,
        );
        (engine, store, ui_rx)
    }

    fn threshold_config(threshold: f64) -> AppConfig {
        let mut config = AppConfig::default();
        config.trades.threshold = threshold;
        config
    }

    #[tokio::test]
    async fn test_single_insert_after_eleventh_trade() {
        let market = StubMarket::new().with_pair("XUSDT", "X", "USDT", 10.0);
        let (mut engine, store, _ui) = engine_with(threshold_config(1_000.0), market);

        for i in 0..10 {
            let accepted = engine
                .handle_trade(trade("XUSDT", 10.0, 5.0, i % 2 == 0))
                .await;
            assert!(!accepted);
            assert_eq!(store.row_counts().await.unwrap(), (0, 0));
        }

        assert!(engine.handle_trade(trade("XUSDT", 10.0, 150.0, true)).await);
        assert_eq!(store.row_counts().await.unwrap(), (0, 1));
        assert_eq!(engine.stats().count, 11);
    }

    #[tokio::test]
    async fn test_notice_filter_gates_persistence() {
        let market = StubMarket::new().with_pair("ADAUSDT", "ADA", "USDT", 0.3);
        let mut config = AppConfig::default();
        config.filter.quote = "BTC".to_string();
        let (mut engine, store, mut ui) = engine_with(config, market);

        assert!(!engine.handle_notice(notice(NoticeType::BlockTrade, "ADA", "USDT")).await);
        assert!(engine.handle_notice(notice(NoticeType::BlockTrade, "ADA", "BTC")).await);

        assert_eq!(store.row_counts().await.unwrap(), (1, 0));
        match ui.try_recv().unwrap() {
            UiEvent::Feed(row) => {
                assert_eq!(row.label, "Large Buy");
                assert_eq!(row.symbol, "ADA/BTC");
            }
            other => panic!("unexpected ui event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_drains_feeds_and_stops() {
        let market = StubMarket::new().with_pair("XUSDT", "X", "USDT", 10.0);
        let (engine, store, mut ui) = engine_with(threshold_config(100.0), market);

        let (notice_tx, notices) = mpsc::unbounded_channel();
        let (notice_control_tx, notice_control) = mpsc::unbounded_channel();
        let (trade_tx, trades) = mpsc::unbounded_channel();
        let (trade_control_tx, trade_control) = mpsc::unbounded_channel();

        notice_tx
            .send(notice(NoticeType::BlockTrade, "X", "USDT"))
            .unwrap();
        trade_tx.send(trade("XUSDT", 10.0, 20.0, false)).unwrap();
        trade_control_tx.send(FeedControl::Disconnected).unwrap();
        drop((notice_tx, notice_control_tx, trade_tx, trade_control_tx));

        engine
            .run(FeedInbox {
                notices,
                notice_control,
                trades,
                trade_control,
            })
            .await;

        assert_eq!(store.row_counts().await.unwrap(), (1, 1));

        let mut saw_status = false;
        let mut saw_trend = false;
        while let Ok(event) = ui.try_recv() {
            match event {
                UiEvent::Status(text) => {
                    saw_status = true;
                    assert_eq!(text, "trades feed disconnected");
                }
                UiEvent::Trend(stats) => saw_trend |= stats.count == 1,
                _ => {}
            }
        }
        assert!(saw_status);
        assert!(saw_trend);
    }
}

// src/core/testing.rs
use crate::connectors::traits::MarketData;
use crate::error::{PulseError, PulseResult};
use crate::types::{NoticeEvent, NoticeType, SymbolInfo, TickerSnapshot, Trade};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-process REST stand-in. Unknown symbols fail both calls.
#[derive(Default)]
pub struct StubMarket {
    infos: HashMap<String, SymbolInfo>,
    prices: HashMap<String, f64>,
    ticker_calls: AtomicUsize,
    info_calls: AtomicUsize,
}

impl StubMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(mut self, symbol: &str, base: &str, quote: &str, price: f64) -> Self {
        self.infos.insert(
            symbol.to_string(),
            SymbolInfo {
                symbol: symbol.to_string(),
                base_asset: base.to_string(),
                quote_asset: quote.to_string(),
            },
        );
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn ticker_calls(&self) -> usize {
        self.ticker_calls.load(Ordering::SeqCst)
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketData for StubMarket {
    async fn fetch_ticker(&self, symbol: &str) -> PulseResult<TickerSnapshot> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        let price = self
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| PulseError::UnknownSymbol(symbol.to_string()))?;
        Ok(TickerSnapshot {
            symbol: symbol.to_string(),
            price_change_percent: 1.5,
            last_price: price,
            high_price: price * 1.1,
            low_price: price * 0.9,
            volume: 1000.0,
        })
    }

    async fn fetch_symbol_info(&self, symbol: &str) -> PulseResult<SymbolInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.infos
            .get(symbol)
            .cloned()
            .ok_or_else(|| PulseError::UnknownSymbol(symbol.to_string()))
    }
}

pub fn notice(notice_type: NoticeType, base: &str, quote: &str) -> NoticeEvent {
    NoticeEvent {
        event_type: "BLOCK_TRADES_BUY".to_string(),
        notice_type,
        symbol: format!("{}{}", base, quote),
        base_asset: base.to_string(),
        quote_asset: quote.to_string(),
        volume: 100.0,
        price_change: 0.0,
        period: "MINUTE_5".to_string(),
        send_timestamp: 1,
    }
}

pub fn trade(symbol: &str, price: f64, quantity: f64, is_maker: bool) -> Trade {
    Trade {
        event_type: "aggTrade".to_string(),
        symbol: symbol.to_string(),
        quantity,
        price,
        event_timestamp: 1,
        trade_timestamp: 1,
        trade_id: 1,
        is_maker,
    }
}

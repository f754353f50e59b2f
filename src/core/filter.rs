// src/core/filter.rs
use crate::config::{FilterConfig, TradesConfig};
use crate::connectors::traits::MarketData;
use crate::core::stats::RollingTradeStats;
use crate::error::PulseResult;
use crate::types::{NoticeEvent, SymbolInfo, TickerSnapshot, Trade};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub type SharedCache = Arc<RwLock<MarketCache>>;

/// Exchange metadata and ticker snapshots keyed by symbol.
///
/// Entries are populated on miss and never evicted; tickers are overwritten
/// by the periodic refresh.
#[derive(Debug, Default)]
pub struct MarketCache {
    symbols: HashMap<String, SymbolInfo>,
    tickers: HashMap<String, TickerSnapshot>,
}

impl MarketCache {
    pub fn shared() -> SharedCache {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn symbol_info(&self, symbol: &str) -> Option<&SymbolInfo> {
        self.symbols.get(symbol)
    }

    pub fn ticker(&self, symbol: &str) -> Option<&TickerSnapshot> {
        self.tickers.get(symbol)
    }

    pub fn insert_symbol_info(&mut self, symbol: &str, info: SymbolInfo) {
        self.symbols.insert(symbol.to_string(), info);
    }

    pub fn insert_ticker(&mut self, symbol: &str, ticker: TickerSnapshot) {
        self.tickers.insert(symbol.to_string(), ticker);
    }
}

/// Notice filter snapshot. Empty lists and a zero percent mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    quotes: Vec<String>,
    bases: Vec<String>,
    /// Positive: change must be at least this many percent. Negative: at most.
    percent: f32,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

impl EventFilter {
    pub fn new(quotes: &str, bases: &str, percent: f32) -> Self {
        Self {
            quotes: split_list(quotes),
            bases: split_list(bases),
            percent,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(&config.quote, &config.base, config.percent)
    }

    pub fn is_unset(&self) -> bool {
        self.quotes.is_empty() && self.bases.is_empty() && self.percent == 0.0
    }

    pub fn matches(&self, event: &NoticeEvent) -> bool {
        if self.is_unset() {
            return true;
        }

        let quote_ok = self.quotes.is_empty() || self.quotes.contains(&event.quote_asset);
        let base_ok = self.bases.is_empty() || self.bases.contains(&event.base_asset);

        let change = event.price_change * 100.0;
        let percent_ok = if self.percent > 0.0 {
            change >= self.percent
        } else if self.percent < 0.0 {
            change <= self.percent
        } else {
            true
        };

        quote_ok && base_ok && percent_ok
    }
}

/// Notional threshold over the trade stream.
///
/// Resolving metadata for an unseen symbol is a blocking REST round-trip on
/// the ingestion task; it stalls trade processing until it returns.
pub struct TradeFilter {
    market: Arc<dyn MarketData>,
    cache: SharedCache,
    default_quote: String,
    threshold: f64,
    log_raw: bool,
}

impl TradeFilter {
    pub fn new(
        config: &TradesConfig,
        market: Arc<dyn MarketData>,
        cache: SharedCache,
        log_raw: bool,
    ) -> Self {
        Self {
            market,
            cache,
            default_quote: config.default_quote.to_uppercase(),
            threshold: config.threshold,
            log_raw,
        }
    }

    /// Symbol metadata from the cache, fetching metadata and ticker on miss.
    async fn resolve(&self, symbol: &str) -> PulseResult<SymbolInfo> {
        let (info, has_ticker) = {
            let cache = self.cache.read();
            (cache.symbol_info(symbol).cloned(), cache.ticker(symbol).is_some())
        };

        if let (Some(info), true) = (&info, has_ticker) {
            return Ok(info.clone());
        }

        let ticker = self.market.fetch_ticker(symbol).await?;
        self.cache.write().insert_ticker(symbol, ticker);

        let info = match info {
            Some(info) => info,
            None => {
                let info = self.market.fetch_symbol_info(symbol).await?;
                self.cache.write().insert_symbol_info(symbol, info.clone());
                info
            }
        };
        Ok(info)
    }

    /// Threshold expressed in `quote` units.
    async fn price_ceiling(&self, quote: &str) -> f64 {
        if quote == self.default_quote {
            return self.threshold;
        }

        let rate_symbol = format!("{}{}", quote, self.default_quote);
        let cached = self
            .cache
            .read()
            .ticker(&rate_symbol)
            .map(|t| t.last_price)
            .filter(|p| *p > 0.0);

        let rate = match cached {
            Some(rate) => Some(rate),
            None => match self.market.fetch_ticker(&rate_symbol).await {
                Ok(ticker) => {
                    let price = ticker.last_price;
                    self.cache.write().insert_ticker(&rate_symbol, ticker);
                    Some(price).filter(|p| *p > 0.0)
                }
                Err(e) => {
                    warn!("No conversion rate for {}: {}", rate_symbol, e);
                    None
                }
            },
        };

        match rate {
            Some(rate) => self.threshold / rate,
            None => self.threshold,
        }
    }

    /// Updates `stats` with every resolvable trade and accepts the trade when
    /// its notional reaches the threshold. Metadata failures reject.
    pub async fn matches(&self, trade: &Trade, stats: &mut RollingTradeStats) -> bool {
        let info = match self.resolve(&trade.symbol).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Rejecting trade for {}: {}", trade.symbol, e);
                return false;
            }
        };

        let ceiling = self.price_ceiling(&info.quote_asset).await;

        // normalise to default-quote units so pairs are comparable
        let scale = if ceiling > 0.0 {
            self.threshold / ceiling
        } else {
            1.0
        };
        stats.record(trade.notional() * scale, trade.is_maker);

        let accepted = trade.notional() >= ceiling;
        if accepted && self.log_raw {
            debug!(ceiling, symbol = %trade.symbol, "Large trade: {:?}", trade);
        }
        accepted
    }
}

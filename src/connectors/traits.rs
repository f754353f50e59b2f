// src/connectors/traits.rs
use crate::error::PulseResult;
use crate::types::{SymbolInfo, TickerSnapshot};
use async_trait::async_trait;

/// Read-only REST collaborator used by the trade filter and the ticker refresh.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// 24h ticker snapshot for `symbol`.
    async fn fetch_ticker(&self, symbol: &str) -> PulseResult<TickerSnapshot>;

    /// Exchange metadata (base/quote assets) for `symbol`.
    async fn fetch_symbol_info(&self, symbol: &str) -> PulseResult<SymbolInfo>;
}

// src/types.rs
use serde::Deserialize;

/// Category of an abnormal-trading notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeType {
    PriceChange,
    PriceBreakthrough,
    BlockTrade,
    VolumePrice,
    #[serde(other)]
    Other,
}

impl NoticeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeType::PriceChange => "PRICE_CHANGE",
            NoticeType::PriceBreakthrough => "PRICE_BREAKTHROUGH",
            NoticeType::BlockTrade => "BLOCK_TRADE",
            NoticeType::VolumePrice => "VOLUME_PRICE",
            NoticeType::Other => "OTHER",
        }
    }
}

/// Exchange-pushed alert about unusual price or volume behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeEvent {
    pub event_type: String,
    pub notice_type: NoticeType,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub volume: f32,
    /// Fractional change, 0.05 == 5%.
    pub price_change: f32,
    pub period: String,
    pub send_timestamp: u64,
}

/// A single aggregated trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub event_type: String,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub event_timestamp: u64,
    pub trade_timestamp: u64,
    pub trade_id: u64,
    pub is_maker: bool,
}

impl Trade {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

/// Static exchange metadata for a trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
}

/// 24h rolling ticker for a trading pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub price_change_percent: f64,
    pub last_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: f64,
}

/// One row of the momentum ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetStat {
    pub name: String,
    pub momentum: f64,
    pub avg_volume: f64,
}

/// Connection-level signal emitted by a feed task.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedControl {
    Connected,
    Error(String),
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Notices,
    Trades,
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feed::Notices => write!(f, "notices"),
            Feed::Trades => write!(f, "trades"),
        }
    }
}

/// Colour family of a live feed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Rise,
    Fall,
    Maker,
    Taker,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Plain,
    Underline,
    Bold,
    BoldUnderline,
}

/// A rendered live feed line.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRow {
    pub label: String,
    pub period: String,
    /// `BASE/QUOTE`
    pub symbol: String,
    pub amount: String,
    pub percent: String,
    pub change_24h: String,
    pub price: String,
    pub tone: Tone,
    pub emphasis: Emphasis,
}

/// Messages from the ingestion side to the terminal.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Feed(FeedRow),
    Trend(crate::core::stats::RollingTradeStats),
    Momentum {
        rows: Vec<AssetStat>,
        /// Block-trade buy share over the retention window, if any.
        block_buy_share: Option<f64>,
    },
    /// Fresh ticker for the symbol currently shown in the detail pane.
    Detail {
        symbol: String,
        ticker: TickerSnapshot,
    },
    Status(String),
}

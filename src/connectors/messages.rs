// src/connectors/messages.rs
use crate::error::{PulseError, PulseResult};
use crate::types::{NoticeEvent, NoticeType, SymbolInfo, TickerSnapshot, Trade};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Binance sends most numbers as JSON strings.
fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<T>().map_err(serde::de::Error::custom)
}

/// Frame on `abnormaltradingnotices`.
#[derive(Debug, Deserialize)]
pub struct NoticeEnvelope {
    pub data: NoticeData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeData {
    pub event_type: String,
    pub notice_type: NoticeType,
    pub symbol: String,
    pub base_asset: String,
    // sic, the feed spells it this way
    pub quota_asset: String,
    #[serde(default)]
    pub volume: f32,
    #[serde(default)]
    pub price_change: f32,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub send_timestamp: u64,
}

impl From<NoticeData> for NoticeEvent {
    fn from(data: NoticeData) -> Self {
        Self {
            event_type: data.event_type,
            notice_type: data.notice_type,
            symbol: data.symbol,
            base_asset: data.base_asset,
            quote_asset: data.quota_asset,
            volume: data.volume,
            price_change: data.price_change,
            period: data.period,
            send_timestamp: data.send_timestamp,
        }
    }
}

/// Frame on the combined trade stream: either trade data or a request ack.
#[derive(Debug, Deserialize)]
pub struct TradeEnvelope {
    /// Request id echoed by acknowledgments. Distinct from `data.a`.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub data: Option<AggTradeData>,
}

/// Aggregate trade event (`<symbol>@aggTrade`).
#[derive(Debug, Deserialize)]
pub struct AggTradeData {
    #[serde(rename = "e")]
    pub event_type: String,

    #[serde(rename = "E")]
    pub event_time: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "a")]
    pub agg_trade_id: u64,

    #[serde(rename = "p", deserialize_with = "de_str")]
    pub price: f64,

    #[serde(rename = "q", deserialize_with = "de_str")]
    pub quantity: f64,

    #[serde(rename = "T")]
    pub trade_time: u64,

    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl From<AggTradeData> for Trade {
    fn from(data: AggTradeData) -> Self {
        Self {
            event_type: data.event_type,
            symbol: data.symbol,
            quantity: data.quantity,
            price: data.price,
            event_timestamp: data.event_time,
            trade_timestamp: data.trade_time,
            trade_id: data.agg_trade_id,
            is_maker: data.is_buyer_maker,
        }
    }
}

/// Outbound control frame for the trade stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    pub method: &'static str,
    pub params: Vec<String>,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    #[serde(deserialize_with = "de_str")]
    pub price_change_percent: f64,
    #[serde(deserialize_with = "de_str")]
    pub last_price: f64,
    #[serde(deserialize_with = "de_str")]
    pub high_price: f64,
    #[serde(deserialize_with = "de_str")]
    pub low_price: f64,
    #[serde(deserialize_with = "de_str")]
    pub volume: f64,
}

impl From<Ticker24h> for TickerSnapshot {
    fn from(t: Ticker24h) -> Self {
        Self {
            symbol: t.symbol,
            price_change_percent: t.price_change_percent,
            last_price: t.last_price,
            high_price: t.high_price,
            low_price: t.low_price,
            volume: t.volume,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

pub fn decode_notice(text: &str) -> PulseResult<NoticeEvent> {
    let envelope: NoticeEnvelope = serde_json::from_str(text)?;
    Ok(envelope.data.into())
}

/// Returns `Ok(None)` for acknowledgments and frames without trade data.
pub fn decode_trade(text: &str) -> PulseResult<Option<Trade>> {
    let envelope: TradeEnvelope = serde_json::from_str(text)?;
    if envelope.id.unwrap_or(0) != 0 {
        return Ok(None);
    }
    Ok(envelope.data.map(Trade::from))
}

pub fn first_symbol(info: ExchangeInfo, symbol: &str) -> PulseResult<SymbolInfo> {
    info.symbols
        .into_iter()
        .next()
        .ok_or_else(|| PulseError::UnknownSymbol(symbol.to_string()))
}

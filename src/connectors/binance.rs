// src/connectors/binance.rs
use crate::connectors::messages::{decode_notice, decode_trade, first_symbol, ExchangeInfo, Ticker24h};
use crate::connectors::traits::MarketData;
use crate::error::PulseResult;
use crate::types::{Feed, FeedControl, NoticeEvent, SymbolInfo, TickerSnapshot, Trade};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

const RECONNECT_INITIAL: Duration = Duration::from_secs(2);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

pub struct BinanceClient {
    http_client: Client,
    base_rest_url: String,
}

impl BinanceClient {
    pub fn new(base_rest_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_rest_url: base_rest_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> PulseResult<T> {
        let url = format!("{}{}", self.base_rest_url, endpoint);

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn fetch_ticker(&self, symbol: &str) -> PulseResult<TickerSnapshot> {
        let ticker: Ticker24h = self
            .get_json("/api/v3/ticker/24hr", &[("symbol", symbol)])
            .await?;
        Ok(ticker.into())
    }

    async fn fetch_symbol_info(&self, symbol: &str) -> PulseResult<SymbolInfo> {
        let upper = symbol.to_uppercase();
        info!("Fetching exchange info for {}", upper);
        let info: ExchangeInfo = self
            .get_json("/api/v3/exchangeInfo", &[("symbol", upper.as_str())])
            .await?;
        first_symbol(info, symbol)
    }
}

/// Errors after which the socket will not yield anything useful.
fn is_terminal(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Io(_)
    )
}

fn frame_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text),
        Message::Binary(bytes) => String::from_utf8(bytes).ok(),
        _ => None,
    }
}

/// Spawns the abnormal-notice feed. Each connection's receive loop ends on
/// close or transport error; the task then reconnects with backoff until the
/// event receiver is dropped.
pub fn spawn_notice_feed(
    url: &str,
    events: UnboundedSender<NoticeEvent>,
    control: UnboundedSender<FeedControl>,
    log_raw: bool,
) -> PulseResult<JoinHandle<()>> {
    let url = Url::parse(url)?;

    Ok(tokio::spawn(async move {
        let mut delay = RECONNECT_INITIAL;

        loop {
            match connect_async(url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!("WebSocket connected: {}", Feed::Notices);
                    delay = RECONNECT_INITIAL;
                    let _ = control.send(FeedControl::Connected);

                    let (_, read) = ws_stream.split();
                    receive_notices(read, &events, &control, log_raw).await;
                    let _ = control.send(FeedControl::Disconnected);
                }
                Err(e) => {
                    error!("Failed to connect {} feed: {}", Feed::Notices, e);
                    let _ = control.send(FeedControl::Error(e.to_string()));
                }
            }

            if events.is_closed() {
                break;
            }
            warn!("Reconnecting {} feed in {:?}", Feed::Notices, delay);
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(RECONNECT_MAX);
        }

        info!("WebSocket task finished: {}", Feed::Notices);
    }))
}

async fn receive_notices(
    mut read: WsSource,
    events: &UnboundedSender<NoticeEvent>,
    control: &UnboundedSender<FeedControl>,
    log_raw: bool,
) {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Close(_)) => {
                info!("Server closed {} feed", Feed::Notices);
                return;
            }
            Ok(msg) => {
                let Some(text) = frame_text(msg) else {
                    continue;
                };
                if log_raw {
                    debug!(feed = %Feed::Notices, "{}", text);
                }
                match decode_notice(&text) {
                    Ok(event) => {
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Dropping malformed notice: {}", e),
                }
            }
            Err(e) => {
                error!("WebSocket error on {} feed: {}", Feed::Notices, e);
                let _ = control.send(FeedControl::Error(e.to_string()));
                return;
            }
        }
    }
}

/// Opens the trade stream. Failure here is fatal for the caller.
pub async fn connect_trade_feed(url: &str) -> PulseResult<(WsSink, WsSource)> {
    let url = Url::parse(url)?;
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    info!("WebSocket connected: {}", Feed::Trades);
    Ok(ws_stream.split())
}

/// Forwards decoded trades; acknowledgments are swallowed here. Transport
/// errors are reported and reading continues unless the socket is gone.
pub fn spawn_trade_receiver(
    mut read: WsSource,
    trades: UnboundedSender<Trade>,
    control: UnboundedSender<FeedControl>,
    log_raw: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(msg) => {
                    let Some(text) = frame_text(msg) else {
                        continue;
                    };
                    if log_raw {
                        debug!(feed = %Feed::Trades, "{}", text);
                    }
                    match decode_trade(&text) {
                        Ok(Some(trade)) => {
                            if trades.send(trade).is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Dropping malformed trade frame: {}", e),
                    }
                }
                Err(e) => {
                    warn!("WebSocket error on {} feed: {}", Feed::Trades, e);
                    let _ = control.send(FeedControl::Error(e.to_string()));
                    if is_terminal(&e) {
                        break;
                    }
                }
            }
        }

        info!("End of {} stream", Feed::Trades);
        let _ = control.send(FeedControl::Disconnected);
    })
}

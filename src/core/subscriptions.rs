// src/core/subscriptions.rs
use crate::connectors::messages::SubscribeRequest;
use futures_util::{Sink, SinkExt};
use parking_lot::RwLock;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const TRADE_CHANNEL: &str = "@aggTrade";

/// Active pair symbols (e.g. `BTCUSDT`) in subscription order.
pub type SubscriptionView = Arc<RwLock<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionIntent {
    Subscribe(String),
    Unsubscribe(String),
    UnsubscribeAll,
}

pub fn stream_name(pair: &str) -> String {
    format!("{}{}", pair.to_lowercase(), TRADE_CHANNEL)
}

/// UI-side front of the subscription manager.
#[derive(Clone)]
pub struct SubscriptionHandle {
    intents: mpsc::UnboundedSender<SubscriptionIntent>,
    view: SubscriptionView,
}

impl SubscriptionHandle {
    /// `symbol` may be a bare base asset or a `BASE/QUOTE` pair; only the base
    /// part is kept and joined with `quote`.
    pub fn subscribe(&self, symbol: &str, quote: &str) {
        let base = symbol.split('/').next().unwrap_or(symbol).trim();
        if base.is_empty() {
            return;
        }
        let pair = format!("{}{}", base, quote).to_uppercase();
        self.post(SubscriptionIntent::Subscribe(pair));
    }

    pub fn unsubscribe(&self, symbol: &str) {
        let pair = symbol.replace('/', "").to_uppercase();
        self.post(SubscriptionIntent::Unsubscribe(pair));
    }

    pub fn unsubscribe_all(&self) {
        self.post(SubscriptionIntent::UnsubscribeAll);
    }

    /// Snapshot for display. May lag behind posted intents.
    pub fn active(&self) -> Vec<String> {
        self.view.read().clone()
    }

    fn post(&self, intent: SubscriptionIntent) {
        if self.intents.send(intent).is_err() {
            error!("Subscription channel closed, request dropped");
        }
    }
}

/// Sole owner of the subscription set. Turns intents into control frames.
pub struct SubscriptionManager {
    intents: mpsc::UnboundedReceiver<SubscriptionIntent>,
    view: SubscriptionView,
    next_id: u64,
    log_raw: bool,
}

impl SubscriptionManager {
    pub fn new(log_raw: bool) -> (Self, SubscriptionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let view: SubscriptionView = Arc::new(RwLock::new(Vec::new()));

        let manager = Self {
            intents: rx,
            view: view.clone(),
            next_id: 1,
            log_raw,
        };
        let handle = SubscriptionHandle { intents: tx, view };
        (manager, handle)
    }

    /// Applies `intent` to the set and returns the frame to send, if any.
    pub fn apply(&mut self, intent: SubscriptionIntent) -> Option<SubscribeRequest> {
        let (method, params) = {
            let mut set = self.view.write();
            match intent {
                SubscriptionIntent::Subscribe(pair) => {
                    let stream = stream_name(&pair);
                    if !set.contains(&pair) {
                        set.push(pair);
                    }
                    ("SUBSCRIBE", vec![stream])
                }
                SubscriptionIntent::Unsubscribe(pair) => {
                    let position = set.iter().position(|p| *p == pair)?;
                    set.remove(position);
                    ("UNSUBSCRIBE", vec![stream_name(&pair)])
                }
                SubscriptionIntent::UnsubscribeAll => {
                    if set.is_empty() {
                        return None;
                    }
                    let params = set.drain(..).map(|p| stream_name(&p)).collect();
                    ("UNSUBSCRIBE", params)
                }
            }
        };

        let request = SubscribeRequest {
            method,
            params,
            id: self.next_id,
        };
        self.next_id += 1;
        Some(request)
    }

    /// Drains intents until every handle is dropped, writing each resulting
    /// frame onto `sink`.
    pub async fn run<S>(mut self, mut sink: S)
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        info!("Subscription transmitter started");

        while let Some(intent) = self.intents.recv().await {
            let Some(request) = self.apply(intent) else {
                continue;
            };

            let payload = match serde_json::to_string(&request) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode subscription request: {}", e);
                    continue;
                }
            };
            if self.log_raw {
                debug!("-> {}", payload);
            }

            if let Err(e) = sink.send(Message::Text(payload)).await {
                warn!("Failed to send subscription request: {}", e);
            }
        }

        info!("Subscription transmitter finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;

    #[test]
    fn test_double_subscribe_keeps_one_entry() {
        let (mut manager, handle) = SubscriptionManager::new(false);

        let first = manager.apply(SubscriptionIntent::Subscribe("BTCUSDT".into()));
        let second = manager.apply(SubscriptionIntent::Subscribe("BTCUSDT".into()));

        assert_eq!(handle.active(), vec!["BTCUSDT".to_string()]);
        // the request is still sent
        let second = second.unwrap();
        assert_eq!(first.unwrap().id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.params, vec!["btcusdt@aggTrade".to_string()]);
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let (mut manager, handle) = SubscriptionManager::new(false);
        manager.apply(SubscriptionIntent::Subscribe("ETHBTC".into()));

        assert!(manager
            .apply(SubscriptionIntent::Unsubscribe("ADAUSDT".into()))
            .is_none());
        assert_eq!(handle.active(), vec!["ETHBTC".to_string()]);
    }

    #[test]
    fn test_unsubscribe_removes_entry() {
        let (mut manager, handle) = SubscriptionManager::new(false);
        manager.apply(SubscriptionIntent::Subscribe("ETHBTC".into()));
        manager.apply(SubscriptionIntent::Subscribe("ADAUSDT".into()));

        let request = manager
            .apply(SubscriptionIntent::Unsubscribe("ETHBTC".into()))
            .unwrap();
        assert_eq!(request.method, "UNSUBSCRIBE");
        assert_eq!(request.params, vec!["ethbtc@aggTrade".to_string()]);
        assert_eq!(handle.active(), vec!["ADAUSDT".to_string()]);
    }

    #[test]
    fn test_unsubscribe_all() {
        let (mut manager, handle) = SubscriptionManager::new(false);
        assert!(manager.apply(SubscriptionIntent::UnsubscribeAll).is_none());

        manager.apply(SubscriptionIntent::Subscribe("BTCUSDT".into()));
        manager.apply(SubscriptionIntent::Subscribe("ETHBTC".into()));
        let request = manager.apply(SubscriptionIntent::UnsubscribeAll).unwrap();

        assert_eq!(request.method, "UNSUBSCRIBE");
        assert_eq!(
            request.params,
            vec!["btcusdt@aggTrade".to_string(), "ethbtc@aggTrade".to_string()]
        );
        assert_eq!(request.id, 3);
        assert!(handle.active().is_empty());
    }

    #[test]
    fn test_handle_normalises_symbols() {
        let (mut manager, handle) = SubscriptionManager::new(false);
        handle.subscribe("ada/BTC", "usdt");
        handle.unsubscribe("ADA/USDT");

        let first = manager.intents.try_recv().unwrap();
        assert_eq!(first, SubscriptionIntent::Subscribe("ADAUSDT".into()));
        let second = manager.intents.try_recv().unwrap();
        assert_eq!(second, SubscriptionIntent::Unsubscribe("ADAUSDT".into()));
    }

    #[tokio::test]
    async fn test_run_writes_frames_in_order() {
        let (manager, handle) = SubscriptionManager::new(true);
        let (sink, mut frames) = fmpsc::unbounded::<Message>();

        handle.subscribe("BTC", "USDT");
        handle.unsubscribe("XRPUSDT");
        handle.unsubscribe_all();
        drop(handle);

        manager.run(sink).await;

        let sent: Vec<Message> = frames.by_ref().collect().await;
        assert_eq!(
            sent,
            vec![
                Message::Text(r#"{"method":"SUBSCRIBE","params":["btcusdt@aggTrade"],"id":1}"#.into()),
                Message::Text(r#"{"method":"UNSUBSCRIBE","params":["btcusdt@aggTrade"],"id":2}"#.into()),
            ]
        );
    }
}

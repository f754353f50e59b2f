// src/error.rs
use thiserror::Error;

/// Errors produced by the feed, REST, storage and configuration layers.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("exchange returned no metadata for symbol {0}")]
    UnknownSymbol(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PulseResult<T> = Result<T, PulseError>;

// src/storage.rs
//! SQLite sink for accepted notices and trades.
//!
//! Rows are append-only and carry the insertion time in unix milliseconds.
//! Every windowed read takes `now - window` as a bound parameter.

use crate::config::{AppConfig, DbConfig};
use crate::error::PulseResult;
use crate::types::{AssetStat, NoticeEvent, SymbolInfo, Trade};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

const MOMENTUM_LIMIT: usize = 7;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS events (
        timestamp INTEGER NOT NULL,
        eventtype TEXT,
        noticetype TEXT,
        symbol TEXT,
        baseasset TEXT,
        quotaasset TEXT,
        volume REAL,
        pricechange REAL,
        period TEXT,
        sendtimestamp INTEGER
    );

    CREATE TABLE IF NOT EXISTS trades (
        timestamp INTEGER NOT NULL,
        eventtype TEXT,
        symbol TEXT,
        quoteasset TEXT,
        baseasset TEXT,
        quantity REAL,
        price REAL,
        tradetimestamp INTEGER,
        ismaker BOOLEAN
    );

    CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp);
"#;

const MOMENTUM_QUERY: &str = r#"
    SELECT h.baseasset,
           COUNT(t.baseasset) * (SUM(DISTINCT t.volume) / SUM(DISTINCT h.volume)) AS momentum
    FROM events AS h
    JOIN events AS t ON h.baseasset = t.baseasset
    WHERE h.timestamp >= ?1
      AND t.timestamp >= ?2
      AND h.noticetype = 'BLOCK_TRADE'
      AND t.noticetype = 'BLOCK_TRADE'
    GROUP BY h.baseasset
    HAVING COUNT(*) > 5
    ORDER BY momentum DESC
    LIMIT ?3
"#;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn window_start(window: Duration) -> i64 {
    now_millis() - window.as_millis() as i64
}

pub struct EventStore {
    conn: Mutex<Connection>,
    retention: Duration,
    sample_period: Duration,
}

impl EventStore {
    /// Opens the store described by `config`: in memory, or
    /// `<data_dir>/event.db` on disk.
    pub fn open(config: &AppConfig) -> PulseResult<Self> {
        if config.db.in_memory {
            Self::open_in_memory(&config.db)
        } else {
            Self::open_path(&config.database_path(), &config.db)
        }
    }

    pub fn open_in_memory(db: &DbConfig) -> PulseResult<Self> {
        info!("Initializing in-memory database");
        let conn = Connection::open_in_memory()?;
        Self::init(conn, db, false)
    }

    /// An existing file is rotated: rows older than the retention window are
    /// deleted before the space is reclaimed.
    pub fn open_path(path: &Path, db: &DbConfig) -> PulseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let existed = path.exists();
        if existed {
            info!(path = %path.display(), "Rotating database");
        } else {
            info!(path = %path.display(), "Initializing database");
        }

        let conn = Connection::open(path)?;
        Self::init(conn, db, existed)
    }

    fn init(conn: Connection, db: &DbConfig, rotate: bool) -> PulseResult<Self> {
        conn.execute_batch(SCHEMA)?;

        if rotate {
            let cutoff = window_start(db.retention());
            let events = conn.execute("DELETE FROM events WHERE timestamp < ?1", params![cutoff])?;
            let trades = conn.execute("DELETE FROM trades WHERE timestamp < ?1", params![cutoff])?;
            info!(events, trades, "Pruned rows outside the retention window");
        }
        conn.execute_batch("VACUUM")?;

        Ok(Self {
            conn: Mutex::new(conn),
            retention: db.retention(),
            sample_period: db.sample_period(),
        })
    }

    pub async fn insert_event(&self, event: &NoticeEvent) -> PulseResult<()> {
        self.insert_event_at(event, now_millis()).await
    }

    async fn insert_event_at(&self, event: &NoticeEvent, timestamp: i64) -> PulseResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events (timestamp, eventtype, noticetype, symbol, baseasset, quotaasset, \
             volume, pricechange, period, sendtimestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                timestamp,
                event.event_type,
                event.notice_type.as_str(),
                event.symbol,
                event.base_asset,
                event.quote_asset,
                f64::from(event.volume),
                f64::from(event.price_change),
                event.period,
                event.send_timestamp as i64,
            ],
        )?;
        Ok(())
    }

    pub async fn insert_trade(&self, trade: &Trade, info: &SymbolInfo) -> PulseResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trades (timestamp, eventtype, symbol, quoteasset, baseasset, \
             quantity, price, tradetimestamp, ismaker) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                now_millis(),
                trade.event_type,
                trade.symbol,
                info.quote_asset,
                info.base_asset,
                trade.quantity,
                trade.price,
                trade.trade_timestamp as i64,
                trade.is_maker,
            ],
        )?;
        Ok(())
    }

    /// Base assets ranked by recent block-trade activity against the
    /// retention baseline. At most seven rows.
    pub async fn momentum(&self) -> PulseResult<Vec<AssetStat>> {
        let retention_start = window_start(self.retention);
        let conn = self.conn.lock().await;

        let ranked = {
            let mut stmt = conn.prepare(MOMENTUM_QUERY)?;
            let rows = stmt.query_map(
                params![
                    retention_start,
                    window_start(self.sample_period),
                    MOMENTUM_LIMIT as i64
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?)),
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut stats = Vec::with_capacity(ranked.len());
        for (name, momentum) in ranked {
            let avg_volume = avg_volume(&conn, &name, retention_start)?;
            stats.push(AssetStat {
                name,
                momentum: momentum.unwrap_or(0.0),
                avg_volume,
            });
        }
        Ok(stats)
    }

    /// Share of block-trade notices that were buys over the retention window.
    pub async fn block_buy_share(&self) -> PulseResult<Option<f64>> {
        let conn = self.conn.lock().await;
        let (buys, total): (Option<f64>, i64) = conn.query_row(
            "SELECT SUM(CASE WHEN eventtype LIKE '%BUY%' THEN 1.0 ELSE 0.0 END), COUNT(*) \
             FROM events WHERE noticetype = 'BLOCK_TRADE' AND timestamp >= ?1",
            params![window_start(self.retention)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(match buys {
            Some(buys) if total > 0 => Some(buys / total as f64),
            _ => None,
        })
    }

    /// Distinct symbols seen in either table during the sample window.
    pub async fn recent_symbols(&self) -> PulseResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT symbol FROM ( \
                 SELECT symbol, timestamp FROM events \
                 UNION SELECT symbol, timestamp FROM trades \
             ) WHERE timestamp >= ?1 ORDER BY symbol",
        )?;
        let symbols = stmt
            .query_map(params![window_start(self.sample_period)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(symbols)
    }

    #[cfg(test)]
    pub async fn row_counts(&self) -> PulseResult<(i64, i64)> {
        let conn = self.conn.lock().await;
        let events = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        let trades = conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok((events, trades))
    }
}

fn avg_volume(conn: &Connection, base_asset: &str, since: i64) -> PulseResult<f64> {
    let avg: Option<f64> = conn
        .query_row(
            "SELECT AVG(volume) FROM events WHERE baseasset = ?1 AND timestamp >= ?2",
            params![base_asset, since],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    Ok(avg.unwrap_or(0.0))
}

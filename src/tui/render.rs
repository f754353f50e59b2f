// src/tui/render.rs
//! Text builders for the panes. Everything here is pure; styling happens in
//! the parent module.

use crate::core::stats::RollingTradeStats;
use crate::types::{
    AssetStat, Emphasis, FeedRow, NoticeEvent, NoticeType, SymbolInfo, TickerSnapshot, Tone, Trade,
};
use crate::utils::format::{format_change, format_price, format_volume, pair_label};

pub const NOT_ENOUGH_EVENTS: &str = "Not enough events";
pub const NOT_ENOUGH_DATA: &str = "Not enough data";

const BAR_CELL: &str = "▓";
const MOMENTUM_CELL: &str = "▱";
const DIVIDER: &str = "│";
/// Wider momentum panes also show the average volume column.
const MOMENTUM_WIDE: usize = 42;

pub fn period_label(period: &str) -> &str {
    match period {
        "DAY_1" => "24H",
        "WEEK_1" => "7D",
        "MONTH_1" => "1M",
        "HOUR_2" => "2h",
        "MINUTE_15" => "15m",
        "MINUTE_5" => "5m",
        _ => "",
    }
}

/// Tier suffix (`_1`, `_2`, `_3`) of an event type.
fn tier(event_type: &str) -> u8 {
    match event_type.rsplit('_').next() {
        Some("2") => 2,
        Some("3") => 3,
        _ => 1,
    }
}

fn direction(event_type: &str) -> Tone {
    if event_type.starts_with("UP") || event_type.contains("RISE") || event_type.ends_with("BUY")
    {
        Tone::Rise
    } else if event_type.starts_with("DOWN")
        || event_type.contains("DROP")
        || event_type.ends_with("SELL")
    {
        Tone::Fall
    } else {
        Tone::Neutral
    }
}

/// Feed row for an accepted notice. `None` for notice types with no rendering.
pub fn notice_row(event: &NoticeEvent, ticker: &TickerSnapshot) -> Option<FeedRow> {
    let tone = direction(&event.event_type);
    let percent = format!("{:.2}%", event.price_change * 100.0);
    let volume = format!("{:.2}", event.volume);

    let (label, amount, percent, emphasis) = match event.notice_type {
        NoticeType::PriceChange => {
            let emphasis = match tier(&event.event_type) {
                2 => Emphasis::Underline,
                3 => Emphasis::Bold,
                _ => Emphasis::Plain,
            };
            ("Price Change", String::new(), percent, emphasis)
        }
        NoticeType::PriceBreakthrough => {
            let label = match tone {
                Tone::Rise => "Price High",
                Tone::Fall => "Price Low",
                _ => "Price Breakthrough",
            };
            (label, String::new(), percent, Emphasis::Plain)
        }
        NoticeType::VolumePrice => {
            let label = match tone {
                Tone::Rise => "Large Volume Rise",
                Tone::Fall => "Large Volume Fall",
                _ => "Large Volume",
            };
            let emphasis = match tier(&event.event_type) {
                2 => Emphasis::Bold,
                3 => Emphasis::BoldUnderline,
                _ => Emphasis::Underline,
            };
            let percent = format!("{:.2}", event.price_change * 100.0);
            (label, volume, percent, emphasis)
        }
        NoticeType::BlockTrade => {
            let label = match tone {
                Tone::Rise => "Large Buy",
                Tone::Fall => "Large Sell",
                _ => "Block Trade",
            };
            (label, volume, String::new(), Emphasis::Plain)
        }
        NoticeType::Other => return None,
    };

    Some(FeedRow {
        label: label.to_string(),
        period: period_label(&event.period).to_string(),
        symbol: pair_label(&event.base_asset, &event.quote_asset),
        amount,
        percent,
        change_24h: format_change(ticker.price_change_percent),
        price: format_price(ticker.last_price),
        tone,
        emphasis,
    })
}

pub fn trade_row(trade: &Trade, info: &SymbolInfo, ticker: &TickerSnapshot) -> FeedRow {
    let (label, tone) = if trade.is_maker {
        ("Large Maker", Tone::Maker)
    } else {
        ("Large Taker", Tone::Taker)
    };

    FeedRow {
        label: label.to_string(),
        period: String::new(),
        symbol: pair_label(&info.base_asset, &info.quote_asset),
        amount: format!("{:.2}", trade.quantity),
        percent: String::new(),
        change_24h: format_change(ticker.price_change_percent),
        price: format!("{:.2}", trade.price),
        tone,
        emphasis: Emphasis::Plain,
    }
}

/// Maker share as a bar of `width` cells: maker cells, `[NN%]`, taker cells.
///
/// Empty while either side has no volume, so the caller keeps what it shows.
/// Below ten trades only a placeholder is returned.
pub fn trend_bar(width: usize, stats: &RollingTradeStats) -> String {
    let Some(ratio) = stats.maker_ratio() else {
        return String::new();
    };
    if width <= 3 {
        return String::new();
    }
    if !stats.has_enough_samples() {
        return NOT_ENOUGH_EVENTS.to_string();
    }

    let label = format!("[{}%]", (ratio * 100.0).round() as u64);
    let room = width.saturating_sub(label.chars().count());

    let mut maker_cells = ((room as f64) * ratio).floor() as usize;
    // keep a cell on each side unless the split is total
    if room >= 2 && ratio > 0.0 && ratio < 1.0 {
        maker_cells = maker_cells.clamp(1, room - 1);
    }
    let taker_cells = room - maker_cells.min(room);

    format!(
        "{}{}{}",
        BAR_CELL.repeat(maker_cells),
        label,
        BAR_CELL.repeat(taker_cells)
    )
}

/// Horizontal bar chart scaled to the largest momentum. Rows whose bar would
/// not fit next to the name column are skipped.
pub fn momentum_chart(width: usize, rows: &[AssetStat]) -> String {
    if rows.is_empty() {
        return NOT_ENOUGH_DATA.to_string();
    }

    let max_momentum = rows.iter().map(|r| r.momentum).fold(0.0_f64, f64::max);
    let name_width = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0);
    let wide = width > MOMENTUM_WIDE;

    let mut lines = Vec::with_capacity(rows.len());
    for asset in rows {
        let mut padding = 3 + name_width;
        let mut avg_volume = String::new();
        if wide {
            padding += 8;
            avg_volume = format!(" {}", format_volume(asset.avg_volume));
        }

        if max_momentum <= 0.0 {
            continue;
        }
        let mut bar_width = ((asset.momentum / max_momentum) * width as f64) as usize;
        if bar_width < padding {
            continue;
        }
        if bar_width == padding {
            bar_width += 1;
        }

        let name_pad = " ".repeat(name_width - asset.name.chars().count());
        let mut line = format!(
            "{}{}{}{}",
            asset.name,
            name_pad,
            DIVIDER,
            MOMENTUM_CELL.repeat(bar_width - padding)
        );
        if wide {
            let used = line.chars().count() + avg_volume.chars().count();
            line.push_str(&" ".repeat(width.saturating_sub(used)));
            line.push_str(&avg_volume);
        }
        lines.push(line);
    }

    lines.join("\n")
}

pub fn detail_text(symbol: &str, ticker: &TickerSnapshot) -> String {
    format!(
        "Symbol: {}\nPrice: {}\n24H Change: {:.2}%\nVolume: {}\nDaily High: {}\nDaily Low: {}",
        symbol,
        format_price(ticker.last_price),
        ticker.price_change_percent,
        format_price(ticker.volume),
        format_price(ticker.high_price),
        format_price(ticker.low_price),
    )
}

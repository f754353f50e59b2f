// src/utils/format.rs

/// Shortest decimal representation, never scientific.
pub fn format_price(value: f64) -> String {
    format!("{}", value)
}

/// `1.5` -> `"1.50 %"`
pub fn format_change(percent: f64) -> String {
    format!("{:.2} %", percent)
}

/// Compact volume: scientific from ten thousand up.
pub fn format_volume(volume: f64) -> String {
    if volume >= 10_000.0 {
        format!("{:8.2e}", volume)
    } else {
        format!("{:8.2}", volume)
    }
}

pub fn pair_label(base: &str, quote: &str) -> String {
    format!("{}/{}", base, quote)
}

/// `ADA/USDT` -> `ADAUSDT`
pub fn pair_symbol(label: &str) -> String {
    label.replace('/', "")
}

/// Quote part of a `BASE/QUOTE` label, if any.
pub fn pair_quote(label: &str) -> Option<&str> {
    label.split_once('/').map(|(_, quote)| quote)
}

// src/core/stats.rs

/// Accumulators are divided by this factor every `DECAY_EVERY` trades.
const DECAY_FACTOR: f64 = 1000.0;
const DECAY_EVERY: u64 = 1000;

/// Trend is only meaningful from this many trades on.
pub const MIN_TREND_SAMPLES: u64 = 10;

/// Decaying maker/taker volume over the whole trade stream.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingTradeStats {
    pub maker: f64,
    pub taker: f64,
    pub count: u64,
}

impl RollingTradeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one trade's (normalised) notional to its side. On every
    /// thousandth trade both sides are first scaled down by 1000.
    pub fn record(&mut self, contribution: f64, is_maker: bool) {
        self.count += 1;
        if self.count % DECAY_EVERY == 0 {
            self.maker /= DECAY_FACTOR;
            self.taker /= DECAY_FACTOR;
        }

        if is_maker {
            self.maker += contribution;
        } else {
            self.taker += contribution;
        }
    }

    /// Maker share of volume, `None` while either side is still empty.
    pub fn maker_ratio(&self) -> Option<f64> {
        if self.count == 0 || self.maker == 0.0 || self.taker == 0.0 {
            return None;
        }
        Some(self.maker / (self.maker + self.taker))
    }

    pub fn has_enough_samples(&self) -> bool {
        self.count >= MIN_TREND_SAMPLES
    }
}

// In crates/strategies/src/micro_score.rs

use crate::types::MicroScoreSettings;
use crate::{Error, KlineSource, Result, SignalProvider};
use async_trait::async_trait;
use core_types::{Kline, Signal, Symbol};
use num_traits::cast::ToPrimitive;
use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage as Ema, RelativeStrengthIndex as Rsi,
    SimpleMovingAverage as Sma,
};
use ta::{DataItem, Next};

/// Last-bar indicator readings the score is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub close: f64,
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub atr: f64,
    pub volume_ratio: f64,
}

/// A short-horizon momentum scorer.
///
/// Long when RSI sits in a moderate band, price is stacked above a fast and a slow EMA,
/// and the last bar's volume is well above its recent mean. Short is the mirror image.
/// Strength grows with the volume ratio and saturates at 1.0.
#[derive(Debug, Clone)]
pub struct MicroScore {
    settings: MicroScoreSettings,
}

impl MicroScore {
    pub fn new(settings: MicroScoreSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MicroScoreSettings {
        &self.settings
    }

    fn required_bars(&self) -> usize {
        let s = &self.settings;
        s.rsi_period
            .max(s.ema_slow_period)
            .max(s.atr_period)
            .max(s.volume_window)
            + 1
    }

    /// Runs every indicator over `klines` (newest last) and returns the final readings.
    pub fn readings(&self, klines: &[Kline]) -> Result<Readings> {
        let needed = self.required_bars();
        if klines.len() < needed {
            return Err(Error::InsufficientData { needed, got: klines.len() });
        }

        let s = &self.settings;
        let ind = |e: ta::errors::TaError| Error::Indicator(e.to_string());
        let mut rsi = Rsi::new(s.rsi_period).map_err(ind)?;
        let mut ema_fast = Ema::new(s.ema_fast_period).map_err(ind)?;
        let mut ema_slow = Ema::new(s.ema_slow_period).map_err(ind)?;
        let mut atr = AverageTrueRange::new(s.atr_period).map_err(ind)?;
        let mut volume_sma = Sma::new(s.volume_window).map_err(ind)?;

        let mut out = Readings {
            close: 0.0,
            rsi: 50.0,
            ema_fast: 0.0,
            ema_slow: 0.0,
            atr: 0.0,
            volume_ratio: 0.0,
        };

        for kline in klines {
            let close = kline.close.to_f64().unwrap_or(0.0);
            let volume = kline.volume.to_f64().unwrap_or(0.0);
            let item = DataItem::builder()
                .open(kline.open.to_f64().unwrap_or(close))
                .high(kline.high.to_f64().unwrap_or(close))
                .low(kline.low.to_f64().unwrap_or(close))
                .close(close)
                .volume(volume)
                .build()
                .map_err(ind)?;

            let mean_volume = volume_sma.next(volume);
            out = Readings {
                close,
                rsi: rsi.next(close),
                ema_fast: ema_fast.next(close),
                ema_slow: ema_slow.next(close),
                atr: atr.next(&item),
                volume_ratio: if mean_volume > 0.0 { volume / mean_volume } else { 0.0 },
            };
        }

        Ok(out)
    }

    /// Turns indicator readings into a signal.
    pub fn score(&self, r: &Readings) -> Signal {
        let volume_ok = r.volume_ratio > self.settings.min_volume_ratio;
        let strength = (r.volume_ratio / 3.0).min(1.0);

        let long_strength = if volume_ok
            && r.rsi > 45.0
            && r.rsi < 65.0
            && r.close > r.ema_fast
            && r.ema_fast > r.ema_slow
        {
            strength
        } else {
            0.0
        };

        let short_strength = if volume_ok
            && r.rsi > 35.0
            && r.rsi < 55.0
            && r.close < r.ema_fast
            && r.ema_fast < r.ema_slow
        {
            strength
        } else {
            0.0
        };

        let volatility = if r.close > 0.0 { r.atr / r.close } else { 0.0 };

        Signal { long_strength, short_strength, volatility }
    }

    pub fn assess(&self, klines: &[Kline]) -> Result<Signal> {
        Ok(self.score(&self.readings(klines)?))
    }
}

/// Fetches recent klines from a [`KlineSource`] and scores them with [`MicroScore`].
pub struct KlineSignalProvider<S> {
    source: S,
    scorer: MicroScore,
}

impl<S: KlineSource> KlineSignalProvider<S> {
    pub fn new(source: S, settings: MicroScoreSettings) -> Self {
        Self { source, scorer: MicroScore::new(settings) }
    }
}

#[async_trait]
impl<S: KlineSource> SignalProvider for KlineSignalProvider<S> {
    fn name(&self) -> &'static str {
        "MicroScore"
    }

    async fn signal(&self, symbol: &Symbol) -> Result<Signal> {
        let settings = self.scorer.settings();
        let klines = self
            .source
            .recent_klines(symbol, &settings.kline_interval, settings.kline_limit)
            .await?;
        let signal = self.scorer.assess(&klines)?;
        tracing::debug!(
            symbol = %symbol,
            long = signal.long_strength,
            short = signal.short_strength,
            volatility = signal.volatility,
            "Signal scored."
        );
        Ok(signal)
    }
}

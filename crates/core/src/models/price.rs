use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candle resolution of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// One sample per trading day, timestamp truncated to midnight UTC.
    Daily,
    /// Sub-daily samples for a short trailing window.
    Intraday,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Daily => write!(f, "daily"),
            Resolution::Intraday => write!(f, "intraday"),
        }
    }
}

/// A single close-price sample for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// The three reference prices a dashboard needs for one ticker. Any of
/// them may be unknown; consumers render a gap, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub latest: Option<f64>,

    /// Prior trading session's close.
    pub previous_close: Option<f64>,

    /// First sample of the current calendar day — the "since midnight"
    /// P/L baseline, which differs from the previous close for
    /// instruments that trade across midnight.
    pub session_open: Option<f64>,
}

/// Truncate a timestamp to midnight UTC. Daily candles from the feed can
/// carry exchange-local open times; everything downstream assumes daily
/// samples sit on day boundaries.
pub fn truncate_to_midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

/// Merge a daily and an intraday series for the same ticker into one
/// timeline with at most one sample per instant.
///
/// Daily samples at or after the start of the intraday window are
/// discarded, then the intraday samples are appended and the whole
/// sequence sorted. Where both resolutions still land on the same
/// instant, the intraday sample wins — a stale daily midnight close must
/// never mask a same-day intraday reading.
pub fn stitch_price_series(
    daily: Vec<PriceSample>,
    intraday: Vec<PriceSample>,
) -> Vec<PriceSample> {
    // (sample, is_intraday); intraday sorts after daily at equal
    // timestamps so dedup can keep the last entry per instant.
    let mut merged: Vec<(PriceSample, bool)> = Vec::with_capacity(daily.len() + intraday.len());

    match intraday.iter().map(|s| s.timestamp).min() {
        Some(window_start) => {
            merged.extend(
                daily
                    .into_iter()
                    .filter(|s| s.timestamp < window_start)
                    .map(|s| (s, false)),
            );
            merged.extend(intraday.into_iter().map(|s| (s, true)));
        }
        None => {
            merged.extend(daily.into_iter().map(|s| (s, false)));
        }
    }

    merged.sort_by(|(a, a_intra), (b, b_intra)| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a_intra.cmp(b_intra))
    });

    let mut stitched: Vec<PriceSample> = Vec::with_capacity(merged.len());
    for (sample, _) in merged {
        match stitched.last_mut() {
            Some(last) if last.timestamp == sample.timestamp => *last = sample,
            _ => stitched.push(sample),
        }
    }
    stitched
}

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::providers::traits::MarketDataFeed;

/// Poll every 30 s while the venue is trading, every 5 min otherwise.
const ACTIVE_POLL: Duration = Duration::from_secs(30);
const IDLE_POLL: Duration = Duration::from_secs(300);

/// Primary venue clock: CET. TradeGate/Stuttgart trade 08:00–22:00 local
/// on weekdays.
const VENUE_UTC_OFFSET_SECS: i32 = 3600;
const VENUE_OPEN_HOUR: u32 = 8;
const VENUE_CLOSE_HOUR: u32 = 22;

/// Sleep is sliced so a stop request is honoured within a fraction of a
/// second rather than after a full idle interval.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Background quote refresher: one worker thread, many readers.
///
/// The worker is the only writer to the shared price map; readers call
/// `cached` and get whatever was last written — possibly stale, possibly
/// absent on the very first cycle — and are never blocked by network
/// I/O. The watchlist is mutated by readers (`watch`) and snapshotted by
/// the worker each cycle; neither mutex is ever held across a fetch.
///
/// Tickers refresh independently; two entries in the map may come from
/// different cycles and readers must not assume a common refresh instant.
pub struct PriceRefresher {
    feed: Arc<dyn MarketDataFeed>,
    watchlist: Arc<Mutex<HashSet<String>>>,
    prices: Arc<Mutex<HashMap<String, f64>>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PriceRefresher {
    pub fn new(feed: Arc<dyn MarketDataFeed>) -> Self {
        Self {
            feed,
            watchlist: Arc::new(Mutex::new(HashSet::new())),
            prices: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Register a ticker for background refresh. Additive and idempotent;
    /// callable from any thread without blocking the worker.
    pub fn watch(&self, ticker: &str) {
        let mut watchlist = self.watchlist.lock().unwrap_or_else(|e| e.into_inner());
        watchlist.insert(ticker.to_string());
    }

    /// Last refreshed price for a ticker, if any cycle has fetched one yet.
    pub fn cached(&self, ticker: &str) -> Option<f64> {
        let prices = self.prices.lock().unwrap_or_else(|e| e.into_inner());
        prices.get(ticker).copied()
    }

    /// Run one refresh cycle synchronously on the calling thread.
    /// Useful to warm the map before the worker's first interval elapses.
    pub fn poll_once(&self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                log::warn!("could not build refresh runtime: {e}");
                return;
            }
        };
        refresh_cycle(&runtime, self.feed.as_ref(), &self.watchlist, &self.prices);
    }

    /// Start the worker thread. Starting an already-running refresher is
    /// a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let feed = Arc::clone(&self.feed);
        let watchlist = Arc::clone(&self.watchlist);
        let prices = Arc::clone(&self.prices);
        let running = Arc::clone(&self.running);

        let handle = std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::warn!("refresh worker could not build runtime: {e}");
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            while running.load(Ordering::SeqCst) {
                refresh_cycle(&runtime, feed.as_ref(), &watchlist, &prices);

                let interval = poll_interval(Utc::now());
                let mut slept = Duration::ZERO;
                while slept < interval && running.load(Ordering::SeqCst) {
                    std::thread::sleep(SLEEP_SLICE);
                    slept += SLEEP_SLICE;
                }
            }
        });

        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        *worker = Some(handle);
    }

    /// Signal the worker to exit and wait for it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = {
            let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
            worker.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for PriceRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Snapshot the watchlist, fetch each member's latest quote, and write
/// results into the shared map. Feed failures leave the previous value
/// in place — stale beats absent for a dashboard read.
fn refresh_cycle(
    runtime: &tokio::runtime::Runtime,
    feed: &dyn MarketDataFeed,
    watchlist: &Mutex<HashSet<String>>,
    prices: &Mutex<HashMap<String, f64>>,
) {
    let tickers: Vec<String> = {
        let watchlist = watchlist.lock().unwrap_or_else(|e| e.into_inner());
        watchlist.iter().cloned().collect()
    };

    for ticker in tickers {
        match runtime.block_on(feed.latest_quote(&ticker)) {
            Ok(price) if price.is_finite() && price > 0.0 => {
                let mut prices = prices.lock().unwrap_or_else(|e| e.into_inner());
                prices.insert(ticker, price);
            }
            Ok(price) => {
                log::debug!("refresh skipped implausible price {price} for {ticker}");
            }
            Err(e) => {
                log::debug!("refresh for {ticker} failed: {e}");
            }
        }
    }
}

/// Poll interval for a given instant: short while the primary venue is
/// inside its weekday trading window, long otherwise.
pub fn poll_interval(now: DateTime<Utc>) -> Duration {
    let venue_offset = FixedOffset::east_opt(VENUE_UTC_OFFSET_SECS).unwrap();
    let venue_now = now.with_timezone(&venue_offset);

    let weekday = venue_now.weekday().number_from_monday() <= 5;
    let in_hours = (VENUE_OPEN_HOUR..VENUE_CLOSE_HOUR).contains(&venue_now.hour());

    if weekday && in_hours {
        ACTIVE_POLL
    } else {
        IDLE_POLL
    }
}

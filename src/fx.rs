use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://www.floatrates.com/daily/usd.json";
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FxError {
    #[error("Exchange rate request failed: {0}")]
    Network(String),
    #[error("Exchange rate service returned status {0}")]
    Status(u16),
    #[error("No exchange rate for {0}")]
    MissingRate(String),
    #[error("Unreadable exchange rate response: {0}")]
    Parse(String),
}

/// Fetches every USD-based rate in one call, keyed by lowercase currency code.
pub trait RateSource: Send + Sync {
    fn fetch_usd_rates(&self) -> Result<HashMap<String, f64>, FxError>;
}

/// Wall-clock time, so fetch times survive a restart.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Deserialize)]
struct QuotedRate {
    rate: f64,
}

#[derive(Clone)]
pub struct FloatRatesClient {
    client: Client,
    endpoint: String,
}

impl FloatRatesClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, FxError> {
        let client = Client::builder()
            .user_agent("freelance-ledger")
            .timeout(timeout)
            .build()
            .map_err(|err| FxError::Network(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl RateSource for FloatRatesClient {
    fn fetch_usd_rates(&self) -> Result<HashMap<String, f64>, FxError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .send()
            .map_err(|err| FxError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(FxError::Status(response.status().as_u16()));
        }

        let quotes = response
            .json::<HashMap<String, QuotedRate>>()
            .map_err(|err| FxError::Parse(err.to_string()))?;

        Ok(quotes
            .into_iter()
            .map(|(code, quote)| (code.to_ascii_lowercase(), quote.rate))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedRate {
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Cached rates keyed by uppercase currency code.
pub type RateTable = HashMap<String, CachedRate>;

/// USD to currency rates memoized per code for a fixed time-to-live.
///
/// The lock is held across the check, the fetch and the write, so concurrent
/// callers never issue duplicate fetches or overwrite each other's results.
pub struct ExchangeRateCache<S = FloatRatesClient, C = SystemClock> {
    source: S,
    clock: C,
    ttl: Duration,
    rates: Mutex<RateTable>,
    refreshed: AtomicBool,
}

impl<S: RateSource> ExchangeRateCache<S, SystemClock> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self::with_clock(source, SystemClock, ttl)
    }
}

impl<S: RateSource, C: Clock> ExchangeRateCache<S, C> {
    pub fn with_clock(source: S, clock: C, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            rates: Mutex::new(RateTable::new()),
            refreshed: AtomicBool::new(false),
        }
    }

    /// Seeds the cache with rates saved by an earlier run. Expired entries
    /// are refetched on first use like any other.
    pub fn with_rates(self, rates: RateTable) -> Self {
        Self {
            rates: Mutex::new(rates),
            ..self
        }
    }

    pub fn snapshot(&self) -> RateTable {
        self.rates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any rate was fetched since construction.
    pub fn is_refreshed(&self) -> bool {
        self.refreshed.load(Ordering::SeqCst)
    }

    fn is_fresh(&self, cached: &CachedRate, now: DateTime<Utc>) -> bool {
        (now - cached.fetched_at)
            .to_std()
            .is_ok_and(|age| age < self.ttl)
    }

    pub fn rate(&self, currency: &str) -> Result<f64, FxError> {
        let code = currency.trim().to_ascii_uppercase();
        if code == "USD" {
            return Ok(1.0);
        }

        let mut rates = self.rates.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        if let Some(cached) = rates.get(&code) {
            if self.is_fresh(cached, now) {
                tracing::debug!(currency = %code, rate = cached.rate, "Exchange rate cache hit");
                return Ok(cached.rate);
            }
        }

        tracing::debug!(currency = %code, "Fetching exchange rates");
        let quotes = self.source.fetch_usd_rates()?;
        let rate = quotes
            .get(&code.to_ascii_lowercase())
            .copied()
            .filter(|rate| rate.is_finite())
            .ok_or_else(|| FxError::MissingRate(code.clone()))?;

        rates.insert(
            code,
            CachedRate {
                rate,
                fetched_at: now,
            },
        );
        self.refreshed.store(true, Ordering::SeqCst);
        Ok(rate)
    }

    pub fn convert(&self, amount_usd: f64, currency: &str) -> Result<f64, FxError> {
        Ok(amount_usd * self.rate(currency)?)
    }

    /// Rate for report rendering: a failed lookup degrades to 1.0 and hands
    /// the error back so the caller can flag the figure as unconverted.
    pub fn rate_or_identity(&self, currency: &str) -> (f64, Option<FxError>) {
        match self.rate(currency) {
            Ok(rate) => (rate, None),
            Err(err) => {
                tracing::warn!(currency, error = %err, "Exchange rate unavailable, using 1.0");
                (1.0, Some(err))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    pub struct FakeClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
            Self {
                now: Arc::new(Mutex::new(start)),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    #[derive(Clone)]
    pub struct FakeSource {
        rates: Arc<Mutex<Result<HashMap<String, f64>, FxError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        pub fn with_rates(rates: &[(&str, f64)]) -> Self {
            let rates = rates
                .iter()
                .map(|(code, rate)| (code.to_string(), *rate))
                .collect();
            Self {
                rates: Arc::new(Mutex::new(Ok(rates))),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing(err: FxError) -> Self {
            Self {
                rates: Arc::new(Mutex::new(Err(err))),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn set_rate(&self, code: &str, rate: f64) {
            if let Ok(rates) = self.rates.lock().unwrap().as_mut() {
                rates.insert(code.to_string(), rate);
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RateSource for FakeSource {
        fn fetch_usd_rates(&self) -> Result<HashMap<String, f64>, FxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rates.lock().unwrap().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeClock, FakeSource};
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn cache(source: &FakeSource, clock: &FakeClock) -> ExchangeRateCache<FakeSource, FakeClock> {
        ExchangeRateCache::with_clock(source.clone(), clock.clone(), DEFAULT_TTL)
    }

    #[test]
    fn usd_short_circuits_without_fetch() {
        let source = FakeSource::with_rates(&[]);
        let cache = cache(&source, &FakeClock::new());

        assert_eq!(cache.rate("USD").unwrap(), 1.0);
        assert_eq!(cache.rate("usd").unwrap(), 1.0);
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn second_call_within_ttl_is_cached() {
        let source = FakeSource::with_rates(&[("eur", 0.92)]);
        let cache = cache(&source, &FakeClock::new());

        assert_eq!(cache.rate("EUR").unwrap(), 0.92);
        source.set_rate("eur", 0.95);
        assert_eq!(cache.rate("eur").unwrap(), 0.92);
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn expired_entry_triggers_one_refetch() {
        let source = FakeSource::with_rates(&[("eur", 0.92)]);
        let clock = FakeClock::new();
        let cache = cache(&source, &clock);

        cache.rate("EUR").unwrap();
        source.set_rate("eur", 0.95);
        clock.advance(DEFAULT_TTL + Duration::from_secs(1));

        assert_eq!(cache.rate("EUR").unwrap(), 0.95);
        assert_eq!(cache.rate("EUR").unwrap(), 0.95);
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn saved_rates_are_reused_by_a_new_cache() {
        let source = FakeSource::with_rates(&[("eur", 0.92)]);
        let clock = FakeClock::new();
        let first = cache(&source, &clock);
        first.rate("EUR").unwrap();
        assert!(first.is_refreshed());

        clock.advance(Duration::from_secs(60));
        let second = cache(&source, &clock).with_rates(first.snapshot());

        assert_eq!(second.rate("EUR").unwrap(), 0.92);
        assert!(!second.is_refreshed());
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn saved_rates_expire_like_fresh_ones() {
        let source = FakeSource::with_rates(&[("eur", 0.92)]);
        let clock = FakeClock::new();
        let first = cache(&source, &clock);
        first.rate("EUR").unwrap();

        source.set_rate("eur", 0.95);
        clock.advance(DEFAULT_TTL);
        let second = cache(&source, &clock).with_rates(first.snapshot());

        assert_eq!(second.rate("EUR").unwrap(), 0.95);
        assert!(second.is_refreshed());
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn rate_stamped_in_the_future_is_refetched() {
        let source = FakeSource::with_rates(&[("eur", 0.92)]);
        let clock = FakeClock::new();
        let mut saved = RateTable::new();
        saved.insert(
            "EUR".to_string(),
            CachedRate {
                rate: 0.5,
                fetched_at: clock.now() + chrono::Duration::hours(3),
            },
        );
        let cache = cache(&source, &clock).with_rates(saved);

        assert_eq!(cache.rate("EUR").unwrap(), 0.92);
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn missing_code_is_an_error() {
        let source = FakeSource::with_rates(&[("eur", 0.92)]);
        let cache = cache(&source, &FakeClock::new());

        assert_eq!(
            cache.rate("GBP"),
            Err(FxError::MissingRate("GBP".to_string()))
        );
    }

    #[test]
    fn fetch_failure_degrades_to_identity() {
        let source = FakeSource::failing(FxError::Status(503));
        let cache = cache(&source, &FakeClock::new());

        assert!(cache.convert(100.0, "EUR").is_err());
        let (rate, err) = cache.rate_or_identity("EUR");
        assert_eq!(rate, 1.0);
        assert_eq!(err, Some(FxError::Status(503)));
    }

    #[test]
    fn concurrent_callers_share_one_fetch() {
        let source = FakeSource::with_rates(&[("eur", 0.92)]);
        let cache = Arc::new(cache(&source, &FakeClock::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.convert(10.0, "EUR").unwrap())
            })
            .collect();

        for handle in handles {
            assert!((handle.join().unwrap() - 9.2).abs() < 1e-9);
        }
        assert_eq!(source.calls(), 1);
    }
}

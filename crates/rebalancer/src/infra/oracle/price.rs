//! USD price lookups for the deposit stable(s) and reward tokens.
//!
//! Two implementations behind one trait: a static table for dry runs and
//! tests, and a live HTTP oracle with a TTL cache and stale fallback.

use {
    serde::{Deserialize, Serialize},
    std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    },
    url::Url,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("PRICE_UNAVAILABLE: {0}")]
    Unavailable(String),
}

/// Read-only snapshot of the oracle's counters, exposed on `/state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub cache_fresh_hits: u64,
    pub stale_fallback_hits: u64,
    pub stable_fallback_hits: u64,
    pub network_fetch_successes: u64,
    pub fetch_failures: u64,
}

#[async_trait::async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price_usd(&self, symbol: &str) -> Result<f64, Error>;

    /// USD prices for every watched stable symbol. Implementations fall
    /// back to $1.00 for a stable they cannot price so the depeg guard
    /// always has a complete input.
    async fn stable_prices_usd(&self) -> Result<HashMap<String, f64>, Error>;

    fn telemetry(&self) -> Telemetry {
        Telemetry::default()
    }
}

/// Constant prices, used in dry runs and tests.
pub struct StaticPriceOracle {
    prices: HashMap<String, f64>,
    stable_symbols: Vec<String>,
}

impl StaticPriceOracle {
    pub fn new(prices: HashMap<String, f64>, stable_symbols: Vec<String>) -> Self {
        Self {
            prices,
            stable_symbols,
        }
    }
}

#[async_trait::async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn price_usd(&self, symbol: &str) -> Result<f64, Error> {
        if let Some(price) = self.prices.get(symbol) {
            return Ok(*price);
        }
        if self.stable_symbols.iter().any(|stable| stable == symbol) {
            return Ok(1.0);
        }
        Err(Error::Unavailable(format!("no static price for {symbol}")))
    }

    async fn stable_prices_usd(&self) -> Result<HashMap<String, f64>, Error> {
        Ok(self
            .stable_symbols
            .iter()
            .map(|symbol| {
                (
                    symbol.clone(),
                    self.prices.get(symbol).copied().unwrap_or(1.0),
                )
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    usd: f64,
}

struct CacheEntry {
    value: f64,
    expires_at: Instant,
}

/// Live HTTP oracle. `GET {endpoint}?symbol=SYM` must answer
/// `{"usd": <price>}`.
pub struct LivePriceOracle {
    client: reqwest::Client,
    endpoint: Url,
    ttl: Duration,
    stable_symbols: Vec<String>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_fresh_hits: AtomicU64,
    stale_fallback_hits: AtomicU64,
    stable_fallback_hits: AtomicU64,
    network_fetch_successes: AtomicU64,
    fetch_failures: AtomicU64,
}

impl LivePriceOracle {
    pub fn new(
        client: reqwest::Client,
        endpoint: Url,
        ttl: Duration,
        stable_symbols: Vec<String>,
    ) -> Self {
        Self {
            client,
            endpoint,
            ttl,
            stable_symbols,
            cache: Mutex::new(HashMap::new()),
            cache_fresh_hits: AtomicU64::new(0),
            stale_fallback_hits: AtomicU64::new(0),
            stable_fallback_hits: AtomicU64::new(0),
            network_fetch_successes: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    async fn fetch(&self, symbol: &str) -> reqwest::Result<f64> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("symbol", symbol);
        let response: PriceResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.usd)
    }

    fn fresh_cached(&self, symbol: &str) -> Option<f64> {
        let cache = self.cache.lock().unwrap();
        cache
            .get(symbol)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value)
    }

    fn any_cached(&self, symbol: &str) -> Option<f64> {
        let cache = self.cache.lock().unwrap();
        cache.get(symbol).map(|entry| entry.value)
    }

    fn store(&self, symbol: &str, value: f64) {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            symbol.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[async_trait::async_trait]
impl PriceOracle for LivePriceOracle {
    async fn price_usd(&self, symbol: &str) -> Result<f64, Error> {
        if let Some(price) = self.fresh_cached(symbol) {
            self.cache_fresh_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(price);
        }
        match self.fetch(symbol).await {
            Ok(price) => {
                self.network_fetch_successes.fetch_add(1, Ordering::Relaxed);
                self.store(symbol, price);
                Ok(price)
            }
            Err(err) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                if let Some(stale) = self.any_cached(symbol) {
                    self.stale_fallback_hits.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(%symbol, ?err, "price fetch failed, serving stale cache");
                    return Ok(stale);
                }
                Err(Error::Unavailable(format!("{symbol}: {err}")))
            }
        }
    }

    async fn stable_prices_usd(&self) -> Result<HashMap<String, f64>, Error> {
        let mut prices = HashMap::new();
        for symbol in &self.stable_symbols {
            let price = match self.price_usd(symbol).await {
                Ok(price) => price,
                Err(err) => {
                    self.stable_fallback_hits.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(%symbol, ?err, "stable price unavailable, assuming peg");
                    1.0
                }
            };
            prices.insert(symbol.clone(), price);
        }
        Ok(prices)
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry {
            cache_fresh_hits: self.cache_fresh_hits.load(Ordering::Relaxed),
            stale_fallback_hits: self.stale_fallback_hits.load(Ordering::Relaxed),
            stable_fallback_hits: self.stable_fallback_hits.load(Ordering::Relaxed),
            network_fetch_successes: self.network_fetch_successes.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{Router, extract::Query, routing::get},
        std::{
            net::SocketAddr,
            sync::{
                Arc,
                atomic::{AtomicBool, AtomicU32},
            },
        },
    };

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    fn oracle(addr: SocketAddr, ttl: Duration) -> LivePriceOracle {
        LivePriceOracle::new(
            reqwest::Client::new(),
            format!("http://{addr}/price").parse().unwrap(),
            ttl,
            vec!["USDC".to_string()],
        )
    }

    #[derive(Debug, Deserialize)]
    struct PriceQuery {
        symbol: String,
    }

    #[tokio::test]
    async fn fetches_and_caches() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/price",
            get(move |Query(query): Query<PriceQuery>| {
                counter.fetch_add(1, Ordering::Relaxed);
                async move {
                    assert_eq!(query.symbol, "CRV");
                    axum::Json(serde_json::json!({ "usd": 0.42 }))
                }
            }),
        );
        let oracle = oracle(serve(app).await, Duration::from_secs(60));

        assert_eq!(oracle.price_usd("CRV").await.unwrap(), 0.42);
        assert_eq!(oracle.price_usd("CRV").await.unwrap(), 0.42);
        // Second read must come from the fresh cache.
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        let telemetry = oracle.telemetry();
        assert_eq!(telemetry.network_fetch_successes, 1);
        assert_eq!(telemetry.cache_fresh_hits, 1);
    }

    #[tokio::test]
    async fn serves_stale_cache_when_fetch_fails() {
        let fail = Arc::new(AtomicBool::new(false));
        let toggle = fail.clone();
        let app = Router::new().route(
            "/price",
            get(move |Query(_): Query<PriceQuery>| {
                let fail = toggle.clone();
                async move {
                    if fail.load(Ordering::Relaxed) {
                        Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
                    } else {
                        Ok(axum::Json(serde_json::json!({ "usd": 1.0 })))
                    }
                }
            }),
        );
        // Zero TTL: every entry is immediately stale.
        let oracle = oracle(serve(app).await, Duration::ZERO);

        assert_eq!(oracle.price_usd("USDC").await.unwrap(), 1.0);
        fail.store(true, Ordering::Relaxed);
        assert_eq!(oracle.price_usd("USDC").await.unwrap(), 1.0);
        assert_eq!(oracle.telemetry().stale_fallback_hits, 1);
    }

    #[tokio::test]
    async fn unknown_symbol_without_cache_fails() {
        let app = Router::new().route(
            "/price",
            get(|| async { axum::http::StatusCode::NOT_FOUND }),
        );
        let oracle = oracle(serve(app).await, Duration::from_secs(60));
        assert!(oracle.price_usd("WETH").await.is_err());
        assert_eq!(oracle.telemetry().fetch_failures, 1);
    }

    #[tokio::test]
    async fn stables_fall_back_to_peg() {
        let app = Router::new().route(
            "/price",
            get(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let oracle = oracle(serve(app).await, Duration::from_secs(60));
        let prices = oracle.stable_prices_usd().await.unwrap();
        assert_eq!(prices["USDC"], 1.0);
        assert_eq!(oracle.telemetry().stable_fallback_hits, 1);
    }

    #[tokio::test]
    async fn static_oracle_defaults_stables_to_peg() {
        let oracle = StaticPriceOracle::new(
            maplit::hashmap! { "CRV".to_string() => 0.5 },
            vec!["USDC".to_string()],
        );
        assert_eq!(oracle.price_usd("CRV").await.unwrap(), 0.5);
        assert_eq!(oracle.price_usd("USDC").await.unwrap(), 1.0);
        assert!(oracle.price_usd("WETH").await.is_err());
    }
}

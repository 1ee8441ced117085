//! CoinGecko REST client.
//!
//! Every call is one GET against the configured base URL, awaited to completion.
//! Non-2xx responses, transport failures and undecodable bodies all surface as
//! [`FetchError`]; nothing is retried and nothing is cached.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

use crate::{
    config::Settings,
    models::{CoinRef, Listing, PricePoint},
};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Free tier only serves this many days of market-chart history.
pub const MIN_HISTORY_DAYS: i64 = 1;
pub const MAX_HISTORY_DAYS: i64 = 365;

/// Upstream cap for `/coins/markets?per_page=`.
pub const MAX_PER_PAGE: u32 = 250;

const USER_AGENT: &str = concat!("coindash/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("days must be in [1, 365] (got {0})")]
    InvalidDays(i64),

    #[error("invalid coin id {0:?}")]
    InvalidCoin(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("coin id not found for symbol: {0}")]
    UnknownSymbol(String),

    #[error("request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// True when the request was refused locally and never reached the network.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            FetchError::InvalidDays(_) | FetchError::InvalidCoin(_) | FetchError::InvalidQuery(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingsQuery {
    pub vs_currency: String,
    pub per_page: u32,
    pub page: u32,
}

impl Default for ListingsQuery {
    fn default() -> Self {
        Self {
            vs_currency: "usd".to_string(),
            per_page: 100,
            page: 1,
        }
    }
}

impl ListingsQuery {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            vs_currency: settings.vs_currency.clone(),
            per_page: settings.listings_per_page,
            page: 1,
        }
    }

    fn validate(&self) -> Result<(), FetchError> {
        if self.vs_currency.is_empty() {
            return Err(FetchError::InvalidQuery("vs_currency is empty".into()));
        }
        if self.per_page < 1 || self.per_page > MAX_PER_PAGE {
            return Err(FetchError::InvalidQuery(format!(
                "per_page must be in [1, {MAX_PER_PAGE}] (got {})",
                self.per_page
            )));
        }
        if self.page < 1 {
            return Err(FetchError::InvalidQuery("page must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
}

impl CoinGeckoClient {
    /// Point the client at another host (a local mock in tests, a proxy in deployments).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FetchError> {
        Self::with_base_url(settings.coingecko_base_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current market listings, in the order upstream returns them.
    pub async fn fetch_listings(&self, query: &ListingsQuery) -> Result<Vec<Listing>, FetchError> {
        query.validate()?;

        let params = [
            ("vs_currency", query.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", query.per_page.to_string()),
            ("page", query.page.to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "1h,24h,7d,30d".to_string()),
        ];
        let entries: Vec<MarketEntry> = self.get_json("/coins/markets", &params).await?;
        let listings = entries.into_iter().map(Listing::from).collect::<Vec<_>>();

        log::info!(
            "coingecko.listings ok rows={} vs_currency={} page={}",
            listings.len(),
            query.vs_currency,
            query.page
        );
        Ok(listings)
    }

    /// Daily USD price history for `coin_id`, ascending by timestamp.
    ///
    /// `days` outside `[1, 365]` is refused before any request is sent.
    pub async fn fetch_history(&self, coin_id: &str, days: i64) -> Result<Vec<PricePoint>, FetchError> {
        if !(MIN_HISTORY_DAYS..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(FetchError::InvalidDays(days));
        }
        let coin_id = validate_coin_id(coin_id)?;

        let endpoint = format!("/coins/{coin_id}/market_chart");
        let params = [
            ("vs_currency", "usd".to_string()),
            ("days", days.to_string()),
            ("interval", "daily".to_string()),
        ];
        let chart: MarketChart = self.get_json(&endpoint, &params).await?;
        let points = chart.into_points(&endpoint)?;

        log::info!("coingecko.history ok coin={} days={} points={}", coin_id, days, points.len());
        Ok(points)
    }

    /// Every coin CoinGecko knows about (id, symbol, name).
    pub async fn fetch_coin_list(&self) -> Result<Vec<CoinRef>, FetchError> {
        let coins: Vec<CoinRef> = self.get_json("/coins/list", &[]).await?;
        log::info!("coingecko.coin_list ok coins={}", coins.len());
        Ok(coins)
    }

    /// Map a ticker like `BTC` onto its CoinGecko id with one `/coins/list` call.
    pub async fn resolve_coin_id(&self, symbol: &str) -> Result<String, FetchError> {
        let coins = self.fetch_coin_list().await?;
        resolve_symbol(&coins, symbol).ok_or_else(|| FetchError::UnknownSymbol(symbol.to_uppercase()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        log::debug!("coingecko.request url={} params={:?}", url, params);

        let resp = self.http.get(&url).query(params).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = upstream_message(&body);
            log::warn!(
                "coingecko.error endpoint={} status={} message={}",
                endpoint,
                status.as_u16(),
                message
            );
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str::<T>(&body).map_err(|source| {
            log::warn!("coingecko.decode_error endpoint={} err={}", endpoint, source);
            FetchError::Decode {
                endpoint: endpoint.to_string(),
                source,
            }
        })
    }
}

/// Case-insensitive ticker lookup. Several coins can share a ticker; the last
/// one listed wins.
pub fn resolve_symbol(coins: &[CoinRef], symbol: &str) -> Option<String> {
    let wanted = symbol.trim();
    if wanted.is_empty() {
        return None;
    }
    coins
        .iter()
        .rev()
        .find(|c| c.symbol.eq_ignore_ascii_case(wanted))
        .map(|c| c.id.clone())
}

fn validate_coin_id(coin_id: &str) -> Result<&str, FetchError> {
    let id = coin_id.trim();
    let ok = !id.is_empty()
        && id.chars().any(|c| c.is_ascii_alphanumeric())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(id)
    } else {
        Err(FetchError::InvalidCoin(coin_id.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    status: Option<ErrorStatus>,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    error_message: Option<String>,
}

/// CoinGecko reports failures as `{"error": ".."}` or
/// `{"status": {"error_message": ".."}}`; anything else is passed through raw.
fn upstream_message(body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok().and_then(|b| {
        b.error
            .or_else(|| b.status.and_then(|s| s.error_message))
    });
    match parsed {
        Some(m) => m,
        None => {
            let t = body.trim();
            if t.is_empty() {
                "(empty body)".to_string()
            } else {
                t.chars().take(300).collect()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    symbol: Option<String>,
    name: Option<String>,
    image: Option<String>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    market_cap_rank: Option<u32>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    price_change_percentage_1h_in_currency: Option<f64>,
    price_change_percentage_24h_in_currency: Option<f64>,
    price_change_percentage_7d_in_currency: Option<f64>,
    price_change_percentage_30d_in_currency: Option<f64>,
    last_updated: Option<String>,
}

impl From<MarketEntry> for Listing {
    fn from(m: MarketEntry) -> Self {
        Listing {
            symbol: m.symbol.map(|s| s.to_uppercase()).unwrap_or_default(),
            name: m.name.unwrap_or_else(|| m.id.clone()),
            id: m.id,
            image: m.image,
            rank: m.market_cap_rank,
            current_price: m.current_price,
            market_cap: m.market_cap,
            volume_24h: m.total_volume,
            percent_change_1h: m.price_change_percentage_1h_in_currency,
            percent_change_24h: m
                .price_change_percentage_24h_in_currency
                .or(m.price_change_percentage_24h),
            percent_change_7d: m.price_change_percentage_7d_in_currency,
            percent_change_30d: m.price_change_percentage_30d_in_currency,
            last_updated: m.last_updated.as_deref().and_then(parse_rfc3339),
        }
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `[timestamp_ms, value]`
#[derive(Debug, Deserialize)]
struct ChartSample(f64, Option<f64>);

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<ChartSample>,
    #[serde(default)]
    market_caps: Vec<ChartSample>,
    #[serde(default)]
    total_volumes: Vec<ChartSample>,
}

impl MarketChart {
    /// Unzip the three parallel series by index. A null price stays in place as `None`.
    fn into_points(self, endpoint: &str) -> Result<Vec<PricePoint>, FetchError> {
        let mut points = Vec::with_capacity(self.prices.len());
        for (i, ChartSample(ts_ms, price)) in self.prices.iter().enumerate() {
            if price.is_none() {
                log::debug!("coingecko.history null_price endpoint={} index={}", endpoint, i);
            }
            let timestamp = DateTime::<Utc>::from_timestamp_millis(*ts_ms as i64).ok_or_else(|| {
                FetchError::Decode {
                    endpoint: endpoint.to_string(),
                    source: <serde_json::Error as serde::de::Error>::custom(format!(
                        "timestamp out of range: {ts_ms}"
                    )),
                }
            })?;
            points.push(PricePoint {
                timestamp,
                price: *price,
                volume_24h: self.total_volumes.get(i).and_then(|s| s.1),
                market_cap: self.market_caps.get(i).and_then(|s| s.1),
            });
        }
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockUpstream, Route};
    use axum::http::StatusCode;

    fn listing_json(id: &str, symbol: &str, name: &str, price: f64, rank: u32) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "symbol": symbol,
            "name": name,
            "image": format!("https://assets.example/{id}.png"),
            "current_price": price,
            "market_cap": price * 1_000_000.0,
            "market_cap_rank": rank,
            "total_volume": price * 10_000.0,
            "price_change_percentage_24h": -9.0,
            "price_change_percentage_1h_in_currency": 0.5,
            "price_change_percentage_24h_in_currency": -1.25,
            "price_change_percentage_7d_in_currency": 3.0,
            "price_change_percentage_30d_in_currency": null,
            "last_updated": "2024-05-01T12:00:00.000Z"
        })
    }

    fn chart_json(n: usize) -> String {
        let day_ms = 86_400_000_i64;
        let start = 1_700_000_000_000_i64;
        let prices: Vec<_> = (0..n)
            .map(|i| serde_json::json!([start + day_ms * i as i64, 100.0 + i as f64]))
            .collect();
        let caps: Vec<_> = (0..n)
            .map(|i| serde_json::json!([start + day_ms * i as i64, 1.0e9 + i as f64]))
            .collect();
        serde_json::json!({ "prices": prices, "market_caps": caps, "total_volumes": [] }).to_string()
    }

    #[tokio::test]
    async fn listings_preserve_upstream_order_and_count() {
        let body = serde_json::json!([
            listing_json("ethereum", "eth", "Ethereum", 3000.0, 2),
            listing_json("bitcoin", "btc", "Bitcoin", 60000.0, 1),
            listing_json("dogecoin", "doge", "Dogecoin", 0.15, 9),
            listing_json("solana", "sol", "Solana", 150.0, 5),
        ]);
        let up = MockUpstream::start(vec![Route::ok("/coins/markets", body.to_string())]).await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        let rows = client.fetch_listings(&ListingsQuery::default()).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["ethereum", "bitcoin", "dogecoin", "solana"]);

        let btc = &rows[1];
        assert_eq!(btc.symbol, "BTC");
        assert_eq!(btc.rank, Some(1));
        assert_eq!(btc.current_price, Some(60000.0));
        assert_eq!(btc.percent_change_24h, Some(-1.25));
        assert_eq!(btc.percent_change_30d, None);
        assert!(btc.last_updated.is_some());

        let requests = up.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("/coins/markets?"));
        assert!(requests[0].contains("vs_currency=usd"));
        assert!(requests[0].contains("order=market_cap_desc"));
        assert!(requests[0].contains("per_page=100"));
        assert!(requests[0].contains("sparkline=false"));
    }

    #[tokio::test]
    async fn listing_24h_change_falls_back_to_plain_field() {
        let body = r#"[{"id":"tether","symbol":"usdt","name":"Tether","current_price":1.0,
                        "market_cap_rank":3,"price_change_percentage_24h":0.01}]"#;
        let up = MockUpstream::start(vec![Route::ok("/coins/markets", body)]).await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        let rows = client.fetch_listings(&ListingsQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].percent_change_24h, Some(0.01));
        assert_eq!(rows[0].market_cap, None);
    }

    #[tokio::test]
    async fn history_decodes_matching_length_sorted() {
        for days in [1_i64, 2, 30, 90, 364, 365] {
            let n = days as usize + 1;
            let up = MockUpstream::start(vec![Route::ok("/coins/bitcoin/market_chart", chart_json(n))]).await;
            let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

            let points = client.fetch_history("bitcoin", days).await.unwrap();
            assert_eq!(points.len(), n, "days={days}");
            assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

            let req = &up.requests()[0];
            assert!(req.contains(&format!("days={days}")), "{req}");
            assert!(req.contains("interval=daily"));
            assert!(req.contains("vs_currency=usd"));
        }
    }

    #[tokio::test]
    async fn history_sorts_unordered_upstream_and_zips_side_series() {
        let body = r#"{"prices":[[3000,3.0],[1000,1.0],[2000,2.0]],
                       "market_caps":[[3000,30.0],[1000,10.0]],
                       "total_volumes":[[3000,300.0]]}"#;
        let up = MockUpstream::start(vec![Route::ok("/coins/ethereum/market_chart", body)]).await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        let points = client.fetch_history("ethereum", 7).await.unwrap();
        let prices: Vec<Option<f64>> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, [Some(1.0), Some(2.0), Some(3.0)]);

        // side series are matched by upstream index, not by timestamp
        let ts3000 = points.iter().find(|p| p.price == Some(3.0)).unwrap();
        assert_eq!(ts3000.market_cap, Some(30.0));
        assert_eq!(ts3000.volume_24h, Some(300.0));
        let ts2000 = points.iter().find(|p| p.price == Some(2.0)).unwrap();
        assert_eq!(ts2000.market_cap, None);
        assert_eq!(ts2000.volume_24h, None);
    }

    #[tokio::test]
    async fn null_prices_keep_their_slot_in_history() {
        let body = r#"{"prices":[[1000,1.0],[2000,null],[3000,3.0]],
                       "market_caps":[[1000,10.0],[2000,20.0],[3000,30.0]]}"#;
        let up = MockUpstream::start(vec![Route::ok("/coins/bitcoin/market_chart", body)]).await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        let points = client.fetch_history("bitcoin", 3).await.unwrap();
        assert_eq!(points.len(), 3);
        let prices: Vec<Option<f64>> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, [Some(1.0), None, Some(3.0)]);
        assert_eq!(points[1].timestamp.timestamp_millis(), 2000);
        assert_eq!(points[1].market_cap, Some(20.0));
    }

    #[tokio::test]
    async fn out_of_range_days_never_hit_the_network() {
        let up = MockUpstream::start(vec![Route::ok("/coins/bitcoin/market_chart", chart_json(3))]).await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        for days in [-5_i64, 0, 366, 10_000] {
            let err = client.fetch_history("bitcoin", days).await.unwrap_err();
            assert!(matches!(err, FetchError::InvalidDays(d) if d == days));
            assert!(err.is_rejected());
        }
        assert_eq!(up.hits(), 0);
    }

    #[tokio::test]
    async fn bad_coin_ids_are_rejected_locally() {
        let up = MockUpstream::start(vec![]).await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        for id in ["", "  ", "..", "bit/coin", "a b"] {
            let err = client.fetch_history(id, 30).await.unwrap_err();
            assert!(matches!(err, FetchError::InvalidCoin(_)), "{id:?}");
        }
        assert_eq!(up.hits(), 0);
    }

    #[tokio::test]
    async fn listings_query_bounds_are_checked() {
        let up = MockUpstream::start(vec![]).await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        let q = ListingsQuery { per_page: 251, ..ListingsQuery::default() };
        assert!(matches!(client.fetch_listings(&q).await, Err(FetchError::InvalidQuery(_))));
        let q = ListingsQuery { page: 0, ..ListingsQuery::default() };
        assert!(matches!(client.fetch_listings(&q).await, Err(FetchError::InvalidQuery(_))));
        assert_eq!(up.hits(), 0);
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let up = MockUpstream::start(vec![Route::new(
            "/coins/markets",
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"status":{"error_code":429,"error_message":"You've exceeded the Rate Limit"}}"#,
        )])
        .await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        let err = client.fetch_listings(&ListingsQuery::default()).await.unwrap_err();
        match err {
            FetchError::Status { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "You've exceeded the Rate Limit");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_found_carries_upstream_message() {
        let up = MockUpstream::start(vec![Route::new(
            "/coins/nope/market_chart",
            StatusCode::NOT_FOUND,
            r#"{"error":"coin not found"}"#,
        )])
        .await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        let err = client.fetch_history("nope", 30).await.unwrap_err();
        assert_eq!(err.to_string(), "upstream returned 404: coin not found");
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let up = MockUpstream::start(vec![
            Route::ok("/coins/markets", "[{\"id\": \"bitcoin\", "),
            Route::ok("/coins/bitcoin/market_chart", r#"{"prices": "nope"}"#),
        ])
        .await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        let err = client.fetch_listings(&ListingsQuery::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }), "{err:?}");
        let err = client.fetch_history("bitcoin", 30).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // port 9 on loopback is reserved (discard) and not served in test environments
        let client = CoinGeckoClient::with_base_url("http://127.0.0.1:9").unwrap();
        let err = client.fetch_listings(&ListingsQuery::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)), "{err:?}");
    }

    #[tokio::test]
    async fn coin_list_resolves_symbols() {
        let body = r#"[{"id":"bitcoin","symbol":"btc","name":"Bitcoin"},
                       {"id":"ethereum","symbol":"eth","name":"Ethereum"}]"#;
        let up = MockUpstream::start(vec![Route::ok("/coins/list", body)]).await;
        let client = CoinGeckoClient::with_base_url(&up.base_url).unwrap();

        assert_eq!(client.resolve_coin_id("ETH").await.unwrap(), "ethereum");
        let err = client.resolve_coin_id("zzz").await.unwrap_err();
        assert!(matches!(err, FetchError::UnknownSymbol(s) if s == "ZZZ"));
    }

    #[test]
    fn resolve_symbol_is_case_insensitive_and_last_wins() {
        let coins = vec![
            CoinRef { id: "first-uni".into(), symbol: "uni".into(), name: "Uni One".into() },
            CoinRef { id: "uniswap".into(), symbol: "UNI".into(), name: "Uniswap".into() },
        ];
        assert_eq!(resolve_symbol(&coins, "Uni").as_deref(), Some("uniswap"));
        assert_eq!(resolve_symbol(&coins, ""), None);
        assert_eq!(resolve_symbol(&coins, "btc"), None);
    }

    #[test]
    fn upstream_message_falls_back_to_raw_text() {
        assert_eq!(upstream_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
        assert_eq!(upstream_message("   "), "(empty body)");
        assert_eq!(upstream_message(r#"{"error":"boom"}"#), "boom");
    }
}

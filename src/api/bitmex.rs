use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::api::ExchangeGateway;
use crate::config::{ApiCredentials, TradeMode};
use crate::error::BridgeError;
use crate::models::{Candle, Granularity, Margin, OrderRequest, OrderSide, Ticker};
use crate::Result;

const TESTNET_URL: &str = "https://testnet.bitmex.com";
const PROD_URL: &str = "https://www.bitmex.com";
const API_PREFIX: &str = "/api/v1";
const REQUEST_EXPIRY_SECS: i64 = 60;
// Authenticated REST limit: 60 requests per minute
const RATE_LIMIT_RPM: NonZeroU32 = match NonZeroU32::new(60) {
    Some(n) => n,
    None => panic!("rate limit must be non-zero"),
};

type BitMexRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

type HmacSha256 = Hmac<Sha256>;

/// BitMEX REST API v1 client for a single instrument
#[derive(Clone)]
pub struct BitMexClient {
    http: Client,
    base_url: String,
    symbol: String,
    credentials: ApiCredentials,
    rate_limiter: Arc<BitMexRateLimiter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarginResponse {
    margin_balance: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentResponse {
    bid_price: Option<f64>,
    ask_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BucketResponse {
    timestamp: DateTime<Utc>,
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl From<BucketResponse> for Candle {
    fn from(b: BucketResponse) -> Self {
        Candle {
            timestamp: b.timestamp,
            symbol: b.symbol,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        }
    }
}

impl BitMexClient {
    /// Client for testnet or production, depending on `mode`.
    pub fn new(credentials: ApiCredentials, mode: TradeMode, symbol: impl Into<String>) -> Result<Self> {
        let base_url = match mode {
            TradeMode::Test => TESTNET_URL,
            TradeMode::Prod => PROD_URL,
        };
        Self::with_base_url(credentials, base_url, symbol)
    }

    pub fn with_base_url(
        credentials: ApiCredentials,
        base_url: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| BridgeError::ExchangeUnavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            symbol: symbol.into(),
            credentials,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(RATE_LIMIT_RPM))),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// `hex(HMAC_SHA256(secret, verb + path + expires + body))`
    fn sign(&self, verb: &str, path: &str, expires: i64, body: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret.as_bytes())
            .map_err(|e| BridgeError::Config(format!("Unusable API secret: {}", e)))?;
        mac.update(verb.as_bytes());
        mac.update(path.as_bytes());
        mac.update(expires.to_string().as_bytes());
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Signed, rate-limited request. Returns the response body on 2xx.
    ///
    /// 5xx and 429 come back as retryable [`BridgeError::Exchange`], any
    /// other non-2xx as [`BridgeError::Rejected`].
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<String> {
        let raw_url = format!("{}{}{}", self.base_url, API_PREFIX, endpoint);
        let url = if query.is_empty() {
            Url::parse(&raw_url)
        } else {
            Url::parse_with_params(&raw_url, query)
        }
        .map_err(|e| BridgeError::Exchange(format!("Bad request URL {}: {}", raw_url, e)))?;

        let signed_path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let expires = Utc::now().timestamp() + REQUEST_EXPIRY_SECS;
        let signature = self.sign(method.as_str(), &signed_path, expires, &body)?;

        self.rate_limiter.until_ready().await;

        tracing::debug!(method = %method, path = %signed_path, "BitMEX request");

        let mut builder = self
            .http
            .request(method, url)
            .header("api-expires", expires.to_string())
            .header("api-key", &self.credentials.key)
            .header("api-signature", signature);
        if !body.is_empty() {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BridgeError::Exchange(format!("HTTP {}: {}", status, text)));
        }
        if !status.is_success() {
            return Err(BridgeError::Rejected(format!("HTTP {}: {}", status, text)));
        }
        Ok(text)
    }

    fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|e| BridgeError::Exchange(format!("Bad response: {}", e)))
    }
}

#[async_trait]
impl ExchangeGateway for BitMexClient {
    async fn margin(&self) -> Result<Margin> {
        let body = self.request(Method::GET, "/user/margin", &[], None).await?;
        let resp: MarginResponse = Self::decode(&body)?;
        Ok(Margin {
            margin_balance: resp.margin_balance,
        })
    }

    async fn ticker(&self) -> Result<Ticker> {
        let body = self
            .request(Method::GET, "/instrument", &[("symbol", self.symbol.clone())], None)
            .await?;
        let instruments: Vec<InstrumentResponse> = Self::decode(&body)?;

        match instruments.first() {
            Some(InstrumentResponse {
                bid_price: Some(bid),
                ask_price: Some(ask),
            }) => Ok(Ticker { bid: *bid, ask: *ask }),
            _ => Err(BridgeError::Exchange(format!(
                "No bid/ask quoted for {}",
                self.symbol
            ))),
        }
    }

    async fn candles(
        &self,
        granularity: Granularity,
        count: u32,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>> {
        let mut query = vec![
            ("binSize", granularity.as_str().to_string()),
            ("partial", "false".to_string()),
            ("symbol", self.symbol.clone()),
            ("count", count.to_string()),
            ("reverse", "true".to_string()),
        ];
        if let Some(end) = end_time {
            query.push(("endTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let body = self
            .request(Method::GET, "/trade/bucketed", &query, None)
            .await?;
        let buckets: Vec<BucketResponse> = Self::decode(&body)?;

        // reverse=true hands back newest first
        Ok(buckets.into_iter().rev().map(Candle::from).collect())
    }

    async fn set_leverage(&self, leverage: u8) -> Result<()> {
        let body = json!({ "symbol": self.symbol, "leverage": leverage });
        self.request(Method::POST, "/position/leverage", &[], Some(body))
            .await?;
        Ok(())
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<()> {
        let mut body = json!({
            "symbol": self.symbol,
            "side": order.side.to_string(),
            "orderQty": order.quantity,
            "ordType": order.order_type.to_string(),
            "clOrdID": uuid::Uuid::new_v4().to_string(),
        });
        if let Some(price) = order.price {
            body["price"] = json!(price);
        }

        tracing::debug!(side = %order.side, qty = order.quantity, price = ?order.price, "Submitting order to BitMEX");
        self.request(Method::POST, "/order", &[], Some(body)).await?;
        Ok(())
    }

    async fn close_position(&self, side: Option<OrderSide>) -> Result<()> {
        let mut body = json!({
            "symbol": self.symbol,
            "ordType": "Market",
            "execInst": "Close",
        });
        if let Some(side) = side {
            body["side"] = json!(side.to_string());
        }

        self.request(Method::POST, "/order", &[], Some(body)).await?;
        Ok(())
    }
}

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::BROKER_REST_URL;
use crate::types::{Candle, Direction};

type HmacSha256 = Hmac<Sha256>;

/// Broker-side position ticket. An opaque back-reference: the gateway owns
/// the position, we only hand the number back when closing.
pub type Ticket = i64;

// ── Error types ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum BrokerError {
    /// Rate limited (code=429 envelope or HTTP 429). retry_after in seconds.
    RateLimit { retry_after: u64 },
    /// Transient error: network, timeout, HTTP 5xx, gateway overload.
    Transient(String),
    /// Permanent error: invalid params, rejected order, HTTP 4xx.
    Permanent(String),
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::RateLimit { retry_after } => {
                write!(f, "rate limited (retry after {}s)", retry_after)
            }
            BrokerError::Transient(msg) => write!(f, "transient error: {}", msg),
            BrokerError::Permanent(msg) => write!(f, "permanent error: {}", msg),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Classify a gateway code + HTTP status into a BrokerError.
fn classify_error(code: i64, http_status: u16, msg: &str) -> BrokerError {
    match (code, http_status) {
        (429, _) | (_, 429) => BrokerError::RateLimit { retry_after: 10 },
        (503, _) | (_, 500..=599) => BrokerError::Transient(msg.to_string()),
        _ => BrokerError::Permanent(format!("code={} msg={}", code, msg)),
    }
}

/// Generic retry wrapper with exponential backoff.
async fn with_retry<F, Fut, T>(operation: F, max_retries: u32) -> Result<T, BrokerError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let mut retries = 0;
    let mut delay: u64 = 1;
    loop {
        match operation().await {
            Ok(r) => return Ok(r),
            Err(BrokerError::RateLimit { retry_after }) => {
                if retries >= max_retries {
                    return Err(BrokerError::RateLimit { retry_after });
                }
                log::warn!(
                    "Rate limited — sleeping {}s (attempt {}/{})",
                    retry_after,
                    retries + 1,
                    max_retries
                );
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                retries += 1;
            }
            Err(BrokerError::Transient(msg)) => {
                if retries >= max_retries {
                    return Err(BrokerError::Transient(msg));
                }
                log::warn!(
                    "Transient error: {} — retry in {}s ({}/{})",
                    msg,
                    delay,
                    retries + 1,
                    max_retries
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
                delay = (delay * 2).min(60);
                retries += 1;
            }
            Err(e @ BrokerError::Permanent(_)) => return Err(e),
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BrokerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BrokerClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("HTTP client build failed");

        let api_key = std::env::var("BROKER_API_KEY").expect("BROKER_API_KEY env var not set");
        let api_secret =
            std::env::var("BROKER_API_SECRET").expect("BROKER_API_SECRET env var not set");

        BrokerClient {
            client,
            base_url: BROKER_REST_URL.to_string(),
            api_key,
            api_secret,
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("HMAC init failed");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_headers(&self, body: &str) -> reqwest::header::HeaderMap {
        let ts = Self::timestamp_ms().to_string();
        let payload = format!("{}{}{}", ts, self.api_key, body);
        let signature = self.sign(&payload);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-API-KEY", self.api_key.parse().unwrap());
        headers.insert("X-API-TIMESTAMP", ts.parse().unwrap());
        headers.insert("X-API-SIGN", signature.parse().unwrap());
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        headers
    }

    fn side(direction: Direction) -> &'static str {
        match direction {
            Direction::Long => "Buy",
            Direction::Short => "Sell",
        }
    }

    // ── Internal raw methods (no retry) ──────────────────────────────────────

    async fn fetch_candles_raw(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let url = format!(
            "{}/api/v1/candles?symbol={}&timeframe={}&limit={}",
            self.base_url, symbol, timeframe, limit
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BrokerError::Transient(format!("HTTP error: {}", e)))?;

        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BrokerError::Transient(format!("Parse error: {}", e)))?;

        let code = json["code"].as_i64().unwrap_or(-1);
        if code != 0 {
            let msg = json["message"].as_str().unwrap_or("unknown");
            return Err(classify_error(code, http_status, msg));
        }

        let list = json["data"]["candles"]
            .as_array()
            .ok_or_else(|| BrokerError::Transient("missing data.candles".into()))?;

        let mut candles: Vec<Candle> = list
            .iter()
            .filter_map(|row| {
                let arr = row.as_array()?;
                Some(Candle {
                    timestamp: arr[0].as_i64()?,
                    open: arr[1].as_f64()?,
                    high: arr[2].as_f64()?,
                    low: arr[3].as_f64()?,
                    close: arr[4].as_f64()?,
                    volume: arr[5].as_f64().unwrap_or(0.0),
                })
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn open_position_raw(
        &self,
        symbol: &str,
        direction: Direction,
        lot_size: f64,
        take_profit: f64,
    ) -> Result<Ticket, BrokerError> {
        let body = serde_json::json!({
            "symbol":     symbol,
            "side":       Self::side(direction),
            "orderType":  "Market",
            "lots":       format!("{:.2}", lot_size),
            "takeProfit": format!("{:.5}", take_profit),
            "timeInForce":"IOC"
        })
        .to_string();

        let url = format!("{}/api/v1/orders", self.base_url);
        let headers = self.signed_headers(&body);

        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| BrokerError::Transient(format!("HTTP error: {}", e)))?;

        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BrokerError::Transient(format!("Parse error: {}", e)))?;

        let code = json["code"].as_i64().unwrap_or(-1);
        if code == 0 {
            let ticket = json["data"]["ticket"].as_i64().unwrap_or(0);
            log::info!(
                "Order placed: {} {} {:.2} lots tp={:.5} ticket={}",
                Self::side(direction),
                symbol,
                lot_size,
                take_profit,
                ticket
            );
            Ok(ticket)
        } else {
            let msg = json["message"].as_str().unwrap_or("unknown");
            Err(classify_error(code, http_status, msg))
        }
    }

    async fn close_position_raw(
        &self,
        symbol: &str,
        direction: Direction,
        lot_size: f64,
        ticket: Ticket,
    ) -> Result<(), BrokerError> {
        let body = serde_json::json!({
            "symbol":     symbol,
            "side":       Self::side(direction.flipped()),
            "orderType":  "Market",
            "lots":       format!("{:.2}", lot_size),
            "ticket":     ticket,
            "reduceOnly": true,
            "timeInForce":"IOC"
        })
        .to_string();

        let url = format!("{}/api/v1/orders", self.base_url);
        let headers = self.signed_headers(&body);

        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| BrokerError::Transient(format!("HTTP error: {}", e)))?;

        let http_status = resp.status().as_u16();
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BrokerError::Transient(format!("Parse error: {}", e)))?;

        let code = json["code"].as_i64().unwrap_or(-1);
        if code == 0 {
            log::info!("Position closed: {} ticket={}", symbol, ticket);
            Ok(())
        } else {
            let msg = json["message"].as_str().unwrap_or("unknown");
            Err(classify_error(code, http_status, msg))
        }
    }

    // ── Public methods with retry ─────────────────────────────────────────────

    /// Fetch the last `limit` closed candles (public endpoint, no auth).
    /// Returns candles oldest-first.
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let s = self.clone();
        let sym = symbol.to_string();
        let tf = timeframe.to_string();
        with_retry(
            || {
                let s = s.clone();
                let sym = sym.clone();
                let tf = tf.clone();
                async move { s.fetch_candles_raw(&sym, &tf, limit).await }
            },
            3,
        )
        .await
    }

    /// Place a market order with the take-profit attached.
    pub async fn open_position(
        &self,
        symbol: &str,
        direction: Direction,
        lot_size: f64,
        take_profit: f64,
    ) -> Result<Ticket, BrokerError> {
        let s = self.clone();
        let sym = symbol.to_string();
        with_retry(
            || {
                let s = s.clone();
                let sym = sym.clone();
                async move {
                    s.open_position_raw(&sym, direction, lot_size, take_profit)
                        .await
                }
            },
            3,
        )
        .await
    }

    /// Close an open position by ticket with an opposite-side market order.
    pub async fn close_position(
        &self,
        symbol: &str,
        direction: Direction,
        lot_size: f64,
        ticket: Ticket,
    ) -> Result<(), BrokerError> {
        let s = self.clone();
        let sym = symbol.to_string();
        with_retry(
            || {
                let s = s.clone();
                let sym = sym.clone();
                async move {
                    s.close_position_raw(&sym, direction, lot_size, ticket)
                        .await
                }
            },
            3,
        )
        .await
    }
}

//! External collaborator seams and their HTTP implementations.
//!
//! Every network-facing capability the pipeline consumes lives behind a
//! trait here: the market feed, the safety data sources, the execution
//! router, and the price poll. Each call carries an explicit timeout and
//! returns a tagged result; callers decide per error kind whether the
//! outcome is risk-positive, a skip, or a retry.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument, warn};

use crate::pipeline::config::BotConfig;
use crate::pipeline::feed::RawPairListing;
use crate::types::{TokenAddress, USDC_MINT};

/// Market feed transport failures.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed transport failure: {0}")]
    Transport(String),
    #[error("feed returned unexpected payload: {0}")]
    Malformed(String),
    #[error("no price available for {0}")]
    NoPrice(TokenAddress),
}

/// Quote request failures. A quote call has no side effects and is always
/// safe to retry.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("no route available: {0}")]
    NoRoute(String),
    #[error("quote transport failure: {0}")]
    Transport(String),
    #[error("quote payload missing required field: {0}")]
    Malformed(String),
}

/// Order placement failures. An order may be retried only when the prior
/// attempt is known to have failed.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order rejected by router: {0}")]
    Rejected(String),
    #[error("order transport failure: {0}")]
    Transport(String),
}

/// A swap quote with its typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub input_token: TokenAddress,
    pub output_token: TokenAddress,
    pub amount_in: f64,
    pub output_amount: f64,
    pub price_impact_pct: f64,
}

/// Receipt for a successfully placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
}

/// Result of a simulated buy-then-sell round trip.
#[derive(Debug, Clone)]
pub struct RoundTrip {
    /// Quote-currency amount put in
    pub amount_in: f64,
    /// Quote-currency amount a sell of the bought tokens would return;
    /// `None` when the sell leg could not be quoted
    pub amount_out: Option<f64>,
}

/// External reputation tier for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Unknown,
}

/// Reputation database lookup result. Absence of a record is inconclusive,
/// not a pass.
#[derive(Debug, Clone)]
pub enum ReputationReport {
    NotListed,
    Listed {
        tier: RiskTier,
        risks: Vec<String>,
        mint_authority_retained: bool,
        freeze_authority_retained: bool,
    },
}

/// On-chain account metadata for the metadata probe.
#[derive(Debug, Clone)]
pub struct AccountMetadata {
    pub owner: String,
    pub initialized: bool,
}

/// The market data feed the discovery stage consumes.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Trending pair listings. An empty result is not an error.
    async fn trending_pairs(&self) -> Result<Vec<RawPairListing>, FeedError>;
    /// Newest pair listings. An empty result is not an error.
    async fn new_pairs(&self) -> Result<Vec<RawPairListing>, FeedError>;
}

/// Independent query capabilities used by the safety analyzer.
#[async_trait]
pub trait SafetyDataSource: Send + Sync {
    /// Simulate a minimal buy-then-sell round trip (quotes only, never
    /// executed).
    async fn simulate_round_trip(
        &self,
        token: &TokenAddress,
        probe_amount_usd: f64,
    ) -> Result<RoundTrip>;

    /// Query the external rug database.
    async fn lookup_reputation(&self, token: &TokenAddress) -> Result<ReputationReport>;

    /// Ranked largest-holder amounts for the mint.
    async fn largest_holders(&self, token: &TokenAddress) -> Result<Vec<u64>>;

    /// On-chain account metadata for the mint.
    async fn account_metadata(&self, token: &TokenAddress) -> Result<AccountMetadata>;
}

/// The swap execution collaborator. Settlement internals are out of scope;
/// the pipeline only requests quotes and orders and observes the outcome.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn get_quote(
        &self,
        input: &TokenAddress,
        output: &TokenAddress,
        amount_in: f64,
    ) -> Result<Quote, QuoteError>;

    async fn place_order(&self, quote: &Quote) -> Result<OrderReceipt, OrderError>;
}

/// Current-price lookups for the position monitor.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self, token: &TokenAddress) -> Result<f64, FeedError>;
}

// --- HTTP implementations ---

#[derive(Debug, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<RawPairListing>>,
}

/// DexScreener-style market feed over HTTP.
pub struct HttpMarketFeed {
    client: Client,
    base_url: String,
    retry_attempts: usize,
}

impl HttpMarketFeed {
    pub fn new(client: Client, config: &BotConfig) -> Self {
        Self {
            client,
            base_url: config.feed_base_url.clone(),
            retry_attempts: config.feed_retry_attempts,
        }
    }

    async fn fetch_pairs(&self, path: &str) -> Result<Vec<RawPairListing>, FeedError> {
        let url = format!("{}/{}", self.base_url, path);
        let retry_strategy = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(5))
            .take(self.retry_attempts);

        let response = Retry::spawn(retry_strategy, || async {
            self.client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
        })
        .await
        .map_err(|e| FeedError::Transport(e.to_string()))?;

        let body: PairsResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;

        let pairs = body.pairs.unwrap_or_default();
        debug!("Fetched {} listings from {}", pairs.len(), path);
        Ok(pairs)
    }
}

#[async_trait]
impl MarketFeed for HttpMarketFeed {
    #[instrument(skip(self))]
    async fn trending_pairs(&self) -> Result<Vec<RawPairListing>, FeedError> {
        self.fetch_pairs("dex/tokens/trending").await
    }

    #[instrument(skip(self))]
    async fn new_pairs(&self) -> Result<Vec<RawPairListing>, FeedError> {
        self.fetch_pairs("dex/pairs/solana").await
    }
}

/// Price source backed by the feed's per-token pair lookup.
pub struct HttpPriceSource {
    client: Client,
    base_url: String,
}

impl HttpPriceSource {
    pub fn new(client: Client, config: &BotConfig) -> Self {
        Self {
            client,
            base_url: config.feed_base_url.clone(),
        }
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    #[instrument(skip(self), fields(token = %token))]
    async fn current_price(&self, token: &TokenAddress) -> Result<f64, FeedError> {
        let url = format!("{}/dex/tokens/{}", self.base_url, token);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let body: PairsResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;

        body.pairs
            .unwrap_or_default()
            .iter()
            .find_map(|p| p.price_usd.as_deref().and_then(|s| s.parse::<f64>().ok()))
            .ok_or_else(|| FeedError::NoPrice(token.clone()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterQuote {
    #[serde(default)]
    out_amount: Option<String>,
    #[serde(default)]
    price_impact_pct: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RouterRouteResponse {
    #[serde(default)]
    quote: Option<RouterQuote>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterOrderResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Swap router client (quote + order placement) over HTTP.
pub struct HttpExecutionClient {
    client: Client,
    base_url: String,
}

impl HttpExecutionClient {
    pub fn new(client: Client, config: &BotConfig) -> Self {
        Self {
            client,
            base_url: config.router_base_url.clone(),
        }
    }
}

#[async_trait]
impl ExecutionClient for HttpExecutionClient {
    #[instrument(skip(self), fields(input = %input, output = %output))]
    async fn get_quote(
        &self,
        input: &TokenAddress,
        output: &TokenAddress,
        amount_in: f64,
    ) -> Result<Quote, QuoteError> {
        let url = format!("{}/tx/get_swap_route", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("token_in_address", input.as_str()),
                ("token_out_address", output.as_str()),
                ("in_amount", &amount_in.to_string()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| QuoteError::Transport(e.to_string()))?;

        let body: RouterRouteResponse = response
            .json()
            .await
            .map_err(|e| QuoteError::Malformed(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(QuoteError::NoRoute(error));
        }

        let quote = body
            .quote
            .ok_or_else(|| QuoteError::Malformed("quote".to_string()))?;
        let output_amount = quote
            .out_amount
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| QuoteError::Malformed("outAmount".to_string()))?;

        Ok(Quote {
            input_token: input.clone(),
            output_token: output.clone(),
            amount_in,
            output_amount,
            price_impact_pct: quote.price_impact_pct.unwrap_or(0.0),
        })
    }

    #[instrument(skip(self, quote), fields(output = %quote.output_token))]
    async fn place_order(&self, quote: &Quote) -> Result<OrderReceipt, OrderError> {
        let url = format!("{}/tx/submit_swap", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&quote)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OrderError::Transport(e.to_string()))?;

        let body: RouterOrderResponse = response
            .json()
            .await
            .map_err(|e| OrderError::Transport(e.to_string()))?;

        if !body.success {
            return Err(OrderError::Rejected(
                body.error.unwrap_or_else(|| "unspecified rejection".to_string()),
            ));
        }

        body.order_id
            .map(|order_id| OrderReceipt { order_id })
            .ok_or_else(|| OrderError::Rejected("router returned no order id".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReputationResponse {
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    mint_authority: Option<String>,
    #[serde(default)]
    freeze_authority: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// Safety data sources: JSON-RPC for on-chain queries, a RugCheck-style
/// HTTP API for reputation, and router quotes for the round-trip probe.
pub struct HttpSafetyDataSource {
    client: Client,
    rpc_url: String,
    reputation_base_url: String,
    router: HttpExecutionClient,
}

impl HttpSafetyDataSource {
    pub fn new(client: Client, config: &BotConfig) -> Self {
        Self {
            client: client.clone(),
            rpc_url: config.rpc_url.clone(),
            reputation_base_url: config.reputation_base_url.clone(),
            router: HttpExecutionClient::new(client, config),
        }
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("RPC call {} failed", method))?;

        let body: RpcResponse = response
            .json()
            .await
            .with_context(|| format!("RPC call {} returned invalid JSON", method))?;

        body.result
            .ok_or_else(|| anyhow!("RPC call {} returned no result", method))
    }
}

#[async_trait]
impl SafetyDataSource for HttpSafetyDataSource {
    #[instrument(skip(self), fields(token = %token))]
    async fn simulate_round_trip(
        &self,
        token: &TokenAddress,
        probe_amount_usd: f64,
    ) -> Result<RoundTrip> {
        let usdc = USDC_MINT.to_string();
        let buy = self
            .router
            .get_quote(&usdc, token, probe_amount_usd)
            .await
            .map_err(|e| anyhow!("buy leg: {}", e))?;

        if buy.output_amount <= 0.0 {
            return Ok(RoundTrip { amount_in: probe_amount_usd, amount_out: None });
        }

        let amount_out = match self.router.get_quote(token, &usdc, buy.output_amount).await {
            Ok(sell) => Some(sell.output_amount),
            Err(e) => {
                warn!("Sell leg unobtainable for {}: {}", token, e);
                None
            }
        };

        Ok(RoundTrip { amount_in: probe_amount_usd, amount_out })
    }

    #[instrument(skip(self), fields(token = %token))]
    async fn lookup_reputation(&self, token: &TokenAddress) -> Result<ReputationReport> {
        let url = format!("{}/tokens/solana/{}", self.reputation_base_url, token);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("reputation lookup failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ReputationReport::NotListed);
        }

        let response = response
            .error_for_status()
            .context("reputation service error")?;
        let body: ReputationResponse = response
            .json()
            .await
            .context("reputation payload invalid")?;

        let tier = match body.risk_level.as_deref() {
            Some("low") => RiskTier::Low,
            Some("medium") => RiskTier::Medium,
            Some("high") => RiskTier::High,
            _ => RiskTier::Unknown,
        };

        Ok(ReputationReport::Listed {
            tier,
            risks: body.risks,
            mint_authority_retained: body.mint_authority.is_some(),
            freeze_authority_retained: body.freeze_authority.is_some(),
        })
    }

    #[instrument(skip(self), fields(token = %token))]
    async fn largest_holders(&self, token: &TokenAddress) -> Result<Vec<u64>> {
        let result = self
            .rpc_call("getTokenLargestAccounts", json!([token]))
            .await?;

        let accounts = result
            .get("value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("no holder data available"))?;

        let amounts = accounts
            .iter()
            .filter_map(|acc| {
                acc.get("amount")
                    .and_then(|a| a.as_str())
                    .and_then(|s| s.parse::<u64>().ok())
            })
            .collect();

        Ok(amounts)
    }

    #[instrument(skip(self), fields(token = %token))]
    async fn account_metadata(&self, token: &TokenAddress) -> Result<AccountMetadata> {
        let result = self
            .rpc_call("getAccountInfo", json!([token, {"encoding": "base64"}]))
            .await?;

        let value = result
            .get("value")
            .filter(|v| !v.is_null())
            .ok_or_else(|| anyhow!("token account not found"))?;

        let owner = value
            .get("owner")
            .and_then(|o| o.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(AccountMetadata {
            initialized: owner == crate::types::TOKEN_PROGRAM,
            owner,
        })
    }
}

/// Shared HTTP client with the configured timeout.
pub fn build_http_client(config: &BotConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent("tokenhawk/0.1")
        .build()
        .context("failed to build HTTP client")
}

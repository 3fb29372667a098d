//! Candidate feed adapter - normalizes raw market-feed listings into
//! canonical [`Token`] records.
//!
//! Raw listings arrive as DexScreener-style pair objects. The adapter
//! resolves which leg of the pair is the tradable candidate, derives the
//! pool age, and skips malformed records without failing the batch.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{Token, USDC_MINT, WSOL_MINT};

/// Age assigned when a listing carries no creation timestamp; guaranteed
/// to fail the admission filter.
pub const UNKNOWN_AGE_MINUTES: i64 = 999;

/// One leg of a raw pair listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListedToken {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// A windowed statistic (5-minute and 1-hour buckets).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowedStat {
    #[serde(default)]
    pub m5: Option<f64>,
    #[serde(default)]
    pub h1: Option<f64>,
}

/// Liquidity figures for a pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidityStat {
    #[serde(default)]
    pub usd: Option<f64>,
}

/// A raw pair listing as returned by the market feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPairListing {
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub dex_id: Option<String>,
    #[serde(default)]
    pub base_token: Option<ListedToken>,
    #[serde(default)]
    pub quote_token: Option<ListedToken>,
    /// Pair creation time, milliseconds since the epoch
    #[serde(default)]
    pub pair_created_at: Option<i64>,
    /// Price in USD; the feed serializes this as a string
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub price_change: Option<WindowedStat>,
    #[serde(default)]
    pub volume: Option<WindowedStat>,
    #[serde(default)]
    pub liquidity: Option<LiquidityStat>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

fn is_known_quote(address: &str) -> bool {
    address == WSOL_MINT || address == USDC_MINT
}

/// Normalize a raw listing into a [`Token`].
///
/// The non-quote leg of the pair is always treated as the candidate, so a
/// stable or base currency is never misidentified as the tradable asset.
/// Returns `None` for records with no resolvable address; the caller logs
/// and moves on.
pub fn normalize_listing(listing: &RawPairListing, now: DateTime<Utc>) -> Option<Token> {
    let base = listing.base_token.clone().unwrap_or_default();
    let quote = listing.quote_token.clone().unwrap_or_default();

    // Pick the leg that is not a known quote currency; fall back to base.
    let candidate = if is_known_quote(&quote.address) {
        base
    } else if is_known_quote(&base.address) {
        quote
    } else {
        base
    };

    if candidate.address.is_empty() {
        warn!("Skipping listing with no resolvable token address");
        return None;
    }

    let (creation_time, age_minutes) = match listing.pair_created_at {
        Some(millis) => match Utc.timestamp_millis_opt(millis).single() {
            Some(created) => {
                let age = (now - created).num_minutes();
                (created, age)
            }
            None => (now, UNKNOWN_AGE_MINUTES),
        },
        None => (now, UNKNOWN_AGE_MINUTES),
    };

    let price_change = listing.price_change.clone().unwrap_or_default();
    let volume = listing.volume.clone().unwrap_or_default();

    let price_usd = listing
        .price_usd
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
        .unwrap_or(0.0);

    Some(Token {
        address: candidate.address,
        name: candidate.name.unwrap_or_else(|| "Unknown".to_string()),
        symbol: candidate.symbol.unwrap_or_else(|| "UNKNOWN".to_string()),
        age_minutes,
        liquidity_usd: listing.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0),
        volume_5m_usd: volume.m5.unwrap_or(0.0),
        volume_1h_usd: volume.h1.unwrap_or(0.0),
        price_change_5m: price_change.m5.unwrap_or(0.0),
        price_change_1h: price_change.h1.unwrap_or(0.0),
        price_usd,
        market_cap: listing.market_cap.unwrap_or(0.0),
        unique_holders: 0, // the feed does not provide holder counts
        creation_time,
        dex: listing.dex_id.clone().unwrap_or_else(|| "unknown".to_string()),
    })
}

//! Core types and data structures for the tokenhawk trading pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A token mint address (string form, avoids pulling in the Solana SDK)
pub type TokenAddress = String;

/// Wrapped SOL mint address.
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
/// USDC mint address, the quote currency for sizing and probes.
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
/// SPL token program, the expected owner of a valid token account.
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// A freshly listed token candidate, normalized from a raw feed listing.
///
/// Immutable once constructed for a scan cycle; the next cycle re-fetches
/// rather than mutating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The mint address of the token (unique key)
    pub address: TokenAddress,
    /// Display name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// Minutes since the pool was created
    pub age_minutes: i64,
    /// Liquidity locked in the pool, in USD
    pub liquidity_usd: f64,
    /// Trading volume over the last 5 minutes, in USD
    pub volume_5m_usd: f64,
    /// Trading volume over the last hour, in USD
    pub volume_1h_usd: f64,
    /// Price change over the last 5 minutes, percent
    pub price_change_5m: f64,
    /// Price change over the last hour, percent
    pub price_change_1h: f64,
    /// Current price in USD
    pub price_usd: f64,
    /// Market capitalization in USD
    pub market_cap: f64,
    /// Holder count; zero when the feed cannot provide it
    pub unique_holders: u32,
    /// When the pool was created
    pub creation_time: DateTime<Utc>,
    /// Venue the pair was discovered on
    pub dex: String,
}

impl Token {
    /// Short address form for log lines. The address comes from an
    /// external feed, so truncation must respect char boundaries.
    pub fn short_address(&self) -> &str {
        match self.address.char_indices().nth(8) {
            Some((idx, _)) => &self.address[..idx],
            None => &self.address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn token_with_address(address: &str) -> Token {
        Token {
            address: address.to_string(),
            name: "Test".to_string(),
            symbol: "TEST".to_string(),
            age_minutes: 30,
            liquidity_usd: 50_000.0,
            volume_5m_usd: 5_000.0,
            volume_1h_usd: 25_000.0,
            price_change_5m: 15.5,
            price_change_1h: 25.0,
            price_usd: 0.000025,
            market_cap: 1_000_000.0,
            unique_holders: 0,
            creation_time: Utc::now(),
            dex: "raydium".to_string(),
        }
    }

    #[test]
    fn test_short_address_truncates_long_addresses() {
        let token = token_with_address("MemeMint1111111111111111");
        assert_eq!(token.short_address(), "MemeMint");
    }

    #[test]
    fn test_short_address_keeps_short_addresses_whole() {
        let token = token_with_address("Mint1");
        assert_eq!(token.short_address(), "Mint1");
    }

    #[test]
    fn test_short_address_survives_multibyte_feed_input() {
        // A hostile feed can put any UTF-8 in the address field; byte 8
        // landing mid-character must not panic.
        let token = token_with_address("€€€");
        assert_eq!(token.short_address(), "€€€");

        let token = token_with_address("€€€€€€€€€€");
        assert_eq!(token.short_address(), "€€€€€€€€");
    }
}

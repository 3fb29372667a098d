//! Discovery filter - turns raw feed listings into a deduplicated set of
//! admission-passing candidates.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::config::FilterCriteria;
use crate::pipeline::feed::{normalize_listing, RawPairListing};
use crate::pipeline::sources::MarketFeed;
use crate::types::Token;

/// Token discovery engine: fetches both feed queries, deduplicates, and
/// applies the static admission criteria.
pub struct TokenScanner {
    feed: Arc<dyn MarketFeed>,
    criteria: FilterCriteria,
}

impl TokenScanner {
    pub fn new(feed: Arc<dyn MarketFeed>, criteria: FilterCriteria) -> Self {
        Self { feed, criteria }
    }

    /// Pure admission check. Deterministic over the token's fields and
    /// independent of call order.
    pub fn is_candidate(&self, token: &Token) -> bool {
        let c = &self.criteria;

        // Age window: avoid brand-new and stale pools.
        if token.age_minutes < c.min_age_minutes || token.age_minutes > c.max_age_minutes {
            return false;
        }
        if token.liquidity_usd < c.min_liquidity_usd {
            return false;
        }
        if token.volume_5m_usd < c.min_volume_5m_usd {
            return false;
        }
        // Momentum window: rejects both stagnant and parabolic movers.
        if token.price_change_5m < c.min_pump_pct || token.price_change_5m > c.max_pump_pct {
            return false;
        }
        if token.price_usd <= c.dust_price_floor {
            return false;
        }
        if token.market_cap <= 0.0 {
            return false;
        }

        true
    }

    /// One discovery pass: fetch both feed queries, merge, deduplicate by
    /// token address (first occurrence wins), normalize, and filter.
    ///
    /// A transport failure on one query degrades to the other; malformed
    /// listings are skipped, never fatal to the batch.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<Vec<Token>> {
        let trending = match self.feed.trending_pairs().await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("Trending feed unavailable: {}", e);
                Vec::new()
            }
        };
        let fresh = match self.feed.new_pairs().await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("New-pairs feed unavailable: {}", e);
                Vec::new()
            }
        };

        let merged: Vec<RawPairListing> = trending.into_iter().chain(fresh).collect();
        debug!("Merged {} raw listings from both feed queries", merged.len());

        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for listing in &merged {
            let token = match normalize_listing(listing, now) {
                Some(token) => token,
                None => continue, // already logged by the adapter
            };

            // Dedup by address; a token seen via two discovery sources is
            // considered once, first occurrence wins.
            if !seen.insert(token.address.clone()) {
                continue;
            }

            if token.age_minutes > self.criteria.max_listing_age_minutes {
                continue;
            }

            if self.is_candidate(&token) {
                info!(
                    "Candidate found: {} ({}...) age={}m liquidity=${:.0} 5m={:+.1}% vol=${:.0}",
                    token.symbol,
                    token.short_address(),
                    token.age_minutes,
                    token.liquidity_usd,
                    token.price_change_5m,
                    token.volume_5m_usd,
                );
                candidates.push(token);
            }
        }

        info!("Scan produced {} candidates", candidates.len());
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::feed::{ListedToken, LiquidityStat, WindowedStat};
    use crate::types::USDC_MINT;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    fn test_token() -> Token {
        Token {
            address: "CandidateMint111".to_string(),
            name: "Candidate".to_string(),
            symbol: "CAND".to_string(),
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

    fn test_scanner(feed: Arc<dyn MarketFeed>) -> TokenScanner {
        TokenScanner::new(feed, FilterCriteria::default())
    }

    struct StaticFeed {
        trending: Vec<RawPairListing>,
        fresh: Vec<RawPairListing>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl MarketFeed for StaticFeed {
        async fn trending_pairs(&self) -> Result<Vec<RawPairListing>, crate::pipeline::sources::FeedError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.trending.clone())
        }

        async fn new_pairs(&self) -> Result<Vec<RawPairListing>, crate::pipeline::sources::FeedError> {
            Ok(self.fresh.clone())
        }
    }

    fn listing(address: &str) -> RawPairListing {
        RawPairListing {
            chain_id: Some("solana".to_string()),
            dex_id: Some("raydium".to_string()),
            base_token: Some(ListedToken {
                address: address.to_string(),
                name: Some("Meme".to_string()),
                symbol: Some("MEME".to_string()),
            }),
            quote_token: Some(ListedToken {
                address: USDC_MINT.to_string(),
                name: Some("USD Coin".to_string()),
                symbol: Some("USDC".to_string()),
            }),
            pair_created_at: Some((Utc::now() - Duration::minutes(30)).timestamp_millis()),
            price_usd: Some("0.000025".to_string()),
            price_change: Some(WindowedStat { m5: Some(15.5), h1: Some(25.0) }),
            volume: Some(WindowedStat { m5: Some(5_000.0), h1: Some(25_000.0) }),
            liquidity: Some(LiquidityStat { usd: Some(50_000.0) }),
            market_cap: Some(1_000_000.0),
        }
    }

    #[test]
    fn test_admission_scenario_passes_default_bounds() {
        let scanner = test_scanner(Arc::new(StaticFeed {
            trending: vec![],
            fresh: vec![],
            calls: Mutex::new(0),
        }));
        // age=30m, liquidity=$50k, 5m volume=$5k, 5m change=+15.5%
        assert!(scanner.is_candidate(&test_token()));
    }

    #[test]
    fn test_admission_is_deterministic() {
        let scanner = test_scanner(Arc::new(StaticFeed {
            trending: vec![],
            fresh: vec![],
            calls: Mutex::new(0),
        }));
        let token = test_token();
        let first = scanner.is_candidate(&token);
        for _ in 0..10 {
            assert_eq!(scanner.is_candidate(&token), first);
        }
    }

    #[test]
    fn test_rejections_per_criterion() {
        let scanner = test_scanner(Arc::new(StaticFeed {
            trending: vec![],
            fresh: vec![],
            calls: Mutex::new(0),
        }));

        let mut too_young = test_token();
        too_young.age_minutes = 1;
        assert!(!scanner.is_candidate(&too_young));

        let mut too_old = test_token();
        too_old.age_minutes = 61;
        assert!(!scanner.is_candidate(&too_old));

        let mut thin = test_token();
        thin.liquidity_usd = 2_999.0;
        assert!(!scanner.is_candidate(&thin));

        let mut quiet = test_token();
        quiet.volume_5m_usd = 1_999.0;
        assert!(!scanner.is_candidate(&quiet));

        let mut stagnant = test_token();
        stagnant.price_change_5m = 5.0;
        assert!(!scanner.is_candidate(&stagnant));

        let mut parabolic = test_token();
        parabolic.price_change_5m = 250.0;
        assert!(!scanner.is_candidate(&parabolic));

        let mut dust = test_token();
        dust.price_usd = 0.0000001;
        assert!(!scanner.is_candidate(&dust));

        let mut no_cap = test_token();
        no_cap.market_cap = 0.0;
        assert!(!scanner.is_candidate(&no_cap));
    }

    #[tokio::test]
    async fn test_scan_deduplicates_first_wins() {
        let mut trending = listing("DupMint111");
        trending.dex_id = Some("raydium".to_string());
        let mut fresh = listing("DupMint111");
        fresh.dex_id = Some("orca".to_string());

        let scanner = test_scanner(Arc::new(StaticFeed {
            trending: vec![trending],
            fresh: vec![fresh],
            calls: Mutex::new(0),
        }));

        let candidates = scanner.scan().await.unwrap();
        assert_eq!(candidates.len(), 1);
        // First occurrence (trending, raydium) wins.
        assert_eq!(candidates[0].dex, "raydium");
    }

    #[tokio::test]
    async fn test_scan_same_listing_twice_yields_one_candidate() {
        let scanner = test_scanner(Arc::new(StaticFeed {
            trending: vec![listing("DupMint222"), listing("DupMint222")],
            fresh: vec![],
            calls: Mutex::new(0),
        }));

        let candidates = scanner.scan().await.unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_skips_malformed_listing() {
        let mut malformed = listing("");
        malformed.base_token = Some(ListedToken::default());

        let scanner = test_scanner(Arc::new(StaticFeed {
            trending: vec![malformed, listing("GoodMint333")],
            fresh: vec![],
            calls: Mutex::new(0),
        }));

        let candidates = scanner.scan().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "GoodMint333");
    }
}

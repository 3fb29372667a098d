//! Pipeline configuration, set once at startup and read-only afterwards.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::types::TokenAddress;

/// Static admission criteria for the discovery filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Minimum pool age in minutes (avoids instant rugs)
    pub min_age_minutes: i64,
    /// Maximum pool age in minutes (fresh opportunities only)
    pub max_age_minutes: i64,
    /// Minimum liquidity in USD
    pub min_liquidity_usd: f64,
    /// Minimum 5-minute volume in USD
    pub min_volume_5m_usd: f64,
    /// Minimum 5-minute price change, percent (rejects stagnant movers)
    pub min_pump_pct: f64,
    /// Maximum 5-minute price change, percent (rejects obvious PnDs)
    pub max_pump_pct: f64,
    /// Price floor below which a token is considered dust
    pub dust_price_floor: f64,
    /// Feed listings older than this are discarded before filtering
    pub max_listing_age_minutes: i64,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            min_age_minutes: 2,
            max_age_minutes: 60,
            min_liquidity_usd: 3_000.0,
            min_volume_5m_usd: 2_000.0,
            min_pump_pct: 15.0,
            max_pump_pct: 200.0,
            dust_price_floor: 0.000001,
            max_listing_age_minutes: 120,
        }
    }
}

/// Thresholds used by the safety analyzer.
///
/// The honeypot floor and the AND-of-conditions verdict gate are heuristic
/// constants carried over from production tuning; they are configuration,
/// not derived values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyThresholds {
    /// Minimum confidence score for a safe verdict
    pub min_confidence: f64,
    /// Maximum share of supply one holder may own, percent
    pub max_top_holder_pct: f64,
    /// Minimum number of holders above the materiality threshold
    pub min_significant_holders: usize,
    /// Share of supply that makes a holder "significant" (fraction)
    pub significant_holder_fraction: f64,
    /// Round-trip efficiency below this marks a honeypot
    pub honeypot_efficiency_floor: f64,
    /// Round-trip efficiency below this (but above the honeypot floor)
    /// applies the slippage penalty
    pub slippage_efficiency_floor: f64,
    /// Maximum distinct risk factors tolerated for a safe verdict
    pub max_risk_factors: usize,
    /// Quote-currency amount used for the round-trip probe, USD
    pub probe_amount_usd: f64,
    /// Per-probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// TTL for cached safety evaluations, seconds
    pub cache_ttl_secs: u64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            max_top_holder_pct: 50.0,
            min_significant_holders: 10,
            significant_holder_fraction: 0.001,
            honeypot_efficiency_floor: 0.5,
            slippage_efficiency_floor: 0.7,
            max_risk_factors: 3,
            probe_amount_usd: 0.01,
            probe_timeout_secs: 10,
            cache_ttl_secs: 300,
        }
    }
}

/// Per-archetype trade parameterization and classification cutoffs.
///
/// The cutoffs are tunable policy with no documented derivation; defaults
/// only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchetypeParams {
    /// 5m change at or above this classifies a scalp, percent
    pub scalp_pump_pct: f64,
    /// Scalp take-profit, percent above entry
    pub scalp_take_profit_pct: f64,
    /// Scalp stop-loss, percent below entry
    pub scalp_stop_loss_pct: f64,
    /// Scalp maximum hold time, minutes
    pub scalp_max_hold_minutes: i64,
    /// 5m volume at or above this qualifies for a snipe, USD
    pub snipe_volume_usd: f64,
    /// Pool age at or below this qualifies for a snipe, minutes
    pub snipe_max_age_minutes: i64,
    /// Snipe take-profit, percent above entry
    pub snipe_take_profit_pct: f64,
    /// Snipe stop-loss, percent below entry
    pub snipe_stop_loss_pct: f64,
    /// Snipe maximum hold time, minutes
    pub snipe_max_hold_minutes: i64,
    /// No entries for tokens older than this, minutes
    pub max_entry_age_minutes: i64,
    /// Strategy-level liquidity floor, USD (may be stricter than discovery)
    pub min_entry_liquidity_usd: f64,
}

impl Default for ArchetypeParams {
    fn default() -> Self {
        Self {
            scalp_pump_pct: 25.0,
            scalp_take_profit_pct: 30.0,
            scalp_stop_loss_pct: 10.0,
            scalp_max_hold_minutes: 30,
            snipe_volume_usd: 10_000.0,
            snipe_max_age_minutes: 10,
            snipe_take_profit_pct: 50.0,
            snipe_stop_loss_pct: 15.0,
            snipe_max_hold_minutes: 60,
            max_entry_age_minutes: 60,
            min_entry_liquidity_usd: 5_000.0,
        }
    }
}

/// Per-trade and per-day caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLimits {
    /// Base position size in USD before confidence scaling
    pub base_position_usd: f64,
    /// Hard per-trade ceiling in USD
    pub max_position_usd: f64,
    /// Maximum trades per calendar day
    pub max_daily_trades: u32,
    /// Maximum USD deployed per calendar day
    pub daily_spend_cap_usd: f64,
    /// Maximum concurrently open positions
    pub max_active_positions: usize,
}

impl Default for TradeLimits {
    fn default() -> Self {
        Self {
            base_position_usd: 5.0,
            max_position_usd: 5.0,
            max_daily_trades: 10,
            daily_spend_cap_usd: 25.0,
            max_active_positions: 5,
        }
    }
}

/// Ceilings for the watchlist round-trip scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistParams {
    /// Entries inspected by the round-trip scan (symbol, mint address)
    pub entries: Vec<(String, TokenAddress)>,
    /// Probe size for the entry leg, USD
    pub probe_amount_usd: f64,
    /// Maximum price impact for the entry leg, percent
    pub entry_leg_impact_ceiling_pct: f64,
    /// Maximum price impact for the exit leg, percent
    pub exit_leg_impact_ceiling_pct: f64,
    /// Maximum summed round-trip cost, percent
    pub round_trip_cost_ceiling_pct: f64,
}

impl Default for WatchlistParams {
    fn default() -> Self {
        Self {
            entries: vec![
                ("WIF".to_string(), "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr".to_string()),
                ("BONK".to_string(), "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263".to_string()),
                ("POPCAT".to_string(), "6n7HuEbFUYJxSjvKsAFrGjjhz4WjLU4Vm6wJ17KhLhKn".to_string()),
                ("WEN".to_string(), "9VNRRgBVd9Fqf2fEAhrDVJCdgpXbZHBUFPgNvjQbKF1b".to_string()),
                ("BOME".to_string(), "3K6rftdAaQYMPunrtNRHgnK2UAtjm2JwyT2oCiTDoubl".to_string()),
            ],
            probe_amount_usd: 2.0,
            entry_leg_impact_ceiling_pct: 5.0,
            exit_leg_impact_ceiling_pct: 15.0,
            round_trip_cost_ceiling_pct: 8.0,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub filter: FilterCriteria,
    pub safety: SafetyThresholds,
    pub archetypes: ArchetypeParams,
    pub limits: TradeLimits,
    pub watchlist: WatchlistParams,
    /// Market feed base URL
    pub feed_base_url: String,
    /// Solana JSON-RPC endpoint for safety probes
    pub rpc_url: String,
    /// Reputation database base URL
    pub reputation_base_url: String,
    /// Swap router base URL
    pub router_base_url: String,
    /// HTTP timeout for external calls, seconds
    pub http_timeout_secs: u64,
    /// Retry attempts for feed fetches
    pub feed_retry_attempts: usize,
    /// Seconds between discovery cycles
    pub scan_interval_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            filter: FilterCriteria::default(),
            safety: SafetyThresholds::default(),
            archetypes: ArchetypeParams::default(),
            limits: TradeLimits::default(),
            watchlist: WatchlistParams::default(),
            feed_base_url: "https://api.dexscreener.com/latest".to_string(),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            reputation_base_url: "https://api.rugcheck.xyz/v1".to_string(),
            router_base_url: "https://gmgn.ai/defi/router/v1/sol".to_string(),
            http_timeout_secs: 30,
            feed_retry_attempts: 3,
            scan_interval_secs: 90,
        }
    }
}

impl BotConfig {
    /// Reject configurations the pipeline cannot run with. Missing or
    /// inverted thresholds are configuration errors and fail loudly here
    /// rather than misclassifying tokens later.
    pub fn validate(&self) -> Result<()> {
        if self.filter.min_age_minutes > self.filter.max_age_minutes {
            bail!("filter: min_age_minutes exceeds max_age_minutes");
        }
        if self.filter.min_pump_pct > self.filter.max_pump_pct {
            bail!("filter: min_pump_pct exceeds max_pump_pct");
        }
        if !(0.0..=1.0).contains(&self.safety.min_confidence) {
            bail!("safety: min_confidence must be within [0, 1]");
        }
        if self.safety.honeypot_efficiency_floor > self.safety.slippage_efficiency_floor {
            bail!("safety: honeypot floor exceeds slippage floor");
        }
        if self.limits.base_position_usd <= 0.0 || self.limits.max_position_usd <= 0.0 {
            bail!("limits: position sizes must be positive");
        }
        if self.archetypes.scalp_stop_loss_pct >= 100.0
            || self.archetypes.snipe_stop_loss_pct >= 100.0
        {
            bail!("archetypes: stop-loss of 100% or more can never trigger");
        }
        if self.scan_interval_secs == 0 {
            bail!("scan_interval_secs must be nonzero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BotConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_age_bounds_rejected() {
        let mut config = BotConfig::default();
        config.filter.min_age_minutes = 90;
        config.filter.max_age_minutes = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let mut config = BotConfig::default();
        config.safety.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unreachable_stop_loss_rejected() {
        let mut config = BotConfig::default();
        config.archetypes.scalp_stop_loss_pct = 100.0;
        assert!(config.validate().is_err());
    }
}

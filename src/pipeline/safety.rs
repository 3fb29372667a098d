//! Safety analyzer - concurrent risk probes reduced to one confidence
//! score and a structured risk-factor list.
//!
//! Four independent probes run concurrently under a bounded timeout. A
//! probe failure is that probe's risk-positive outcome, never a pipeline
//! failure. The verdict is an AND-of-conditions gate, not a pure score
//! threshold: any single severe finding vetoes regardless of an otherwise
//! high blended score.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use crate::pipeline::config::SafetyThresholds;
use crate::pipeline::sources::{
    AccountMetadata, ReputationReport, RiskTier, RoundTrip, SafetyDataSource,
};
use crate::types::{Token, TokenAddress};

/// Named boolean checks kept for audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyChecks {
    pub honeypot_test: bool,
    pub rugcheck_passed: bool,
    pub holder_distribution_ok: bool,
    pub sufficient_holders: bool,
    pub metadata_valid: bool,
}

/// Outcome of the buy-then-sell round-trip probe.
#[derive(Debug, Clone)]
pub enum HoneypotOutcome {
    /// Both legs quoted; efficiency = sell output / buy input.
    RoundTrip { efficiency: f64 },
    /// Probe failed, sell leg unobtainable, or efficiency under the floor.
    Honeypot { reason: String },
}

/// Outcome of the external reputation probe. An unlisted token is
/// inconclusive, not a pass.
#[derive(Debug, Clone)]
pub enum ReputationOutcome {
    NotListed,
    Listed {
        tier: RiskTier,
        risks: Vec<String>,
        mint_authority_retained: bool,
        freeze_authority_retained: bool,
    },
    Unavailable(String),
}

/// Outcome of the largest-holder probe. An unavailable probe is treated
/// as maximally concentrated.
#[derive(Debug, Clone)]
pub enum HolderOutcome {
    Measured {
        top_holder_pct: f64,
        significant_holders: usize,
        total_accounts: usize,
    },
    Unavailable(String),
}

/// Outcome of the token-account metadata probe.
#[derive(Debug, Clone)]
pub enum MetadataOutcome {
    Valid,
    Uninitialized,
    Unavailable(String),
}

/// Raw per-probe detail, kept on the result for logging.
#[derive(Debug, Clone)]
pub struct ProbeOutcomes {
    pub honeypot: HoneypotOutcome,
    pub reputation: ReputationOutcome,
    pub holders: HolderOutcome,
    pub metadata: MetadataOutcome,
}

/// Safety analysis result. Produced once per token per evaluation and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct SafetyResult {
    pub is_safe: bool,
    /// Blended confidence in [0.0, 1.0]
    pub confidence_score: f64,
    pub risk_factors: Vec<String>,
    pub checks: SafetyChecks,
    pub probes: ProbeOutcomes,
}

/// Compute the blended confidence score as a product of independent
/// penalty factors, clamped to [0, 1]. Order-independent by construction.
pub fn confidence_score(outcomes: &ProbeOutcomes, thresholds: &SafetyThresholds) -> f64 {
    let mut score: f64 = 1.0;

    match &outcomes.honeypot {
        HoneypotOutcome::Honeypot { .. } => score *= 0.1,
        HoneypotOutcome::RoundTrip { efficiency } => {
            if *efficiency < thresholds.slippage_efficiency_floor {
                score *= 0.6;
            }
        }
    }

    if let ReputationOutcome::Listed { tier, .. } = &outcomes.reputation {
        match tier {
            RiskTier::High => score *= 0.2,
            RiskTier::Medium => score *= 0.5,
            RiskTier::Low => score *= 0.9,
            RiskTier::Unknown => {}
        }
    }

    let (top_holder_pct, significant_holders) = match &outcomes.holders {
        HolderOutcome::Measured { top_holder_pct, significant_holders, .. } => {
            (*top_holder_pct, *significant_holders)
        }
        // An unmeasurable distribution is treated as fully concentrated.
        HolderOutcome::Unavailable(_) => (100.0, 0),
    };

    if top_holder_pct > 70.0 {
        score *= 0.3;
    } else if top_holder_pct > 50.0 {
        score *= 0.6;
    } else if top_holder_pct > 30.0 {
        score *= 0.8;
    }

    if significant_holders < 5 {
        score *= 0.5;
    } else if significant_holders < 10 {
        score *= 0.7;
    }

    if matches!(outcomes.metadata, MetadataOutcome::Uninitialized) {
        score *= 0.4;
    }

    score.clamp(0.0, 1.0)
}

fn collect_risk_factors(outcomes: &ProbeOutcomes, thresholds: &SafetyThresholds) -> Vec<String> {
    let mut factors = Vec::new();

    if let HoneypotOutcome::Honeypot { reason } = &outcomes.honeypot {
        factors.push(format!("Honeypot detected: {}", reason));
    }

    if let ReputationOutcome::Listed {
        risks,
        mint_authority_retained,
        freeze_authority_retained,
        ..
    } = &outcomes.reputation
    {
        for risk in risks {
            factors.push(format!("RugCheck: {}", risk));
        }
        if *mint_authority_retained {
            factors.push("Mint authority not renounced".to_string());
        }
        if *freeze_authority_retained {
            factors.push("Freeze authority active".to_string());
        }
    }

    if let HolderOutcome::Measured { top_holder_pct, significant_holders, total_accounts } =
        &outcomes.holders
    {
        if *top_holder_pct > thresholds.max_top_holder_pct {
            factors.push(format!(
                "Top holder owns {:.1}% of supply (max {:.0}%)",
                top_holder_pct, thresholds.max_top_holder_pct
            ));
        }
        if *significant_holders < thresholds.min_significant_holders {
            factors.push(format!(
                "Only {} of {} tracked holders are significant (min {})",
                significant_holders, total_accounts, thresholds.min_significant_holders
            ));
        }
    }
    if let HolderOutcome::Unavailable(reason) = &outcomes.holders {
        factors.push(format!("Holder distribution unavailable: {}", reason));
    }

    factors
}

fn audit_checks(outcomes: &ProbeOutcomes, thresholds: &SafetyThresholds) -> SafetyChecks {
    let honeypot_test = matches!(outcomes.honeypot, HoneypotOutcome::RoundTrip { .. });

    let rugcheck_passed = matches!(
        &outcomes.reputation,
        ReputationOutcome::Listed { tier: RiskTier::Low, .. }
            | ReputationOutcome::Listed { tier: RiskTier::Medium, .. }
    );

    let (holder_distribution_ok, sufficient_holders) = match &outcomes.holders {
        HolderOutcome::Measured { top_holder_pct, significant_holders, .. } => (
            *top_holder_pct <= thresholds.max_top_holder_pct,
            *significant_holders >= thresholds.min_significant_holders,
        ),
        HolderOutcome::Unavailable(_) => (false, false),
    };

    SafetyChecks {
        honeypot_test,
        rugcheck_passed,
        holder_distribution_ok,
        sufficient_holders,
        metadata_valid: matches!(outcomes.metadata, MetadataOutcome::Valid),
    }
}

/// Token security analyzer. Pure evaluation: acquires no state beyond a
/// TTL cache of recent results, so a token surfaced by both feed queries
/// in close succession is probed once.
pub struct SafetyAnalyzer {
    source: Arc<dyn SafetyDataSource>,
    thresholds: SafetyThresholds,
    cache: Cache<TokenAddress, Arc<SafetyResult>>,
}

impl SafetyAnalyzer {
    pub fn new(source: Arc<dyn SafetyDataSource>, thresholds: SafetyThresholds) -> Self {
        let cache = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(Duration::from_secs(thresholds.cache_ttl_secs))
            .build();
        Self { source, thresholds, cache }
    }

    /// Evaluate a token. Never fails: every probe error folds into that
    /// probe's risk-positive outcome.
    #[instrument(skip(self, token), fields(symbol = %token.symbol, address = %token.short_address()))]
    pub async fn evaluate(&self, token: &Token) -> Arc<SafetyResult> {
        if let Some(hit) = self.cache.get(&token.address).await {
            debug!("Safety cache hit for {}", token.symbol);
            return hit;
        }

        let probe_timeout = Duration::from_secs(self.thresholds.probe_timeout_secs);

        let honeypot_fut = timeout(
            probe_timeout,
            self.source
                .simulate_round_trip(&token.address, self.thresholds.probe_amount_usd),
        );
        let reputation_fut = timeout(probe_timeout, self.source.lookup_reputation(&token.address));
        let holders_fut = timeout(probe_timeout, self.source.largest_holders(&token.address));
        let metadata_fut = timeout(probe_timeout, self.source.account_metadata(&token.address));

        let (honeypot_raw, reputation_raw, holders_raw, metadata_raw) =
            tokio::join!(honeypot_fut, reputation_fut, holders_fut, metadata_fut);

        let honeypot = self.interpret_round_trip(honeypot_raw);
        let reputation = match reputation_raw {
            Ok(Ok(ReputationReport::NotListed)) => ReputationOutcome::NotListed,
            Ok(Ok(ReputationReport::Listed {
                tier,
                risks,
                mint_authority_retained,
                freeze_authority_retained,
            })) => ReputationOutcome::Listed {
                tier,
                risks,
                mint_authority_retained,
                freeze_authority_retained,
            },
            Ok(Err(e)) => ReputationOutcome::Unavailable(e.to_string()),
            Err(_) => ReputationOutcome::Unavailable("probe timed out".to_string()),
        };
        let holders = match holders_raw {
            Ok(Ok(amounts)) => self.measure_holders(&amounts),
            Ok(Err(e)) => HolderOutcome::Unavailable(e.to_string()),
            Err(_) => HolderOutcome::Unavailable("probe timed out".to_string()),
        };
        let metadata = match metadata_raw {
            Ok(Ok(AccountMetadata { initialized: true, .. })) => MetadataOutcome::Valid,
            Ok(Ok(AccountMetadata { initialized: false, .. })) => MetadataOutcome::Uninitialized,
            Ok(Err(e)) => MetadataOutcome::Unavailable(e.to_string()),
            Err(_) => MetadataOutcome::Unavailable("probe timed out".to_string()),
        };

        let probes = ProbeOutcomes { honeypot, reputation, holders, metadata };
        let score = confidence_score(&probes, &self.thresholds);
        let risk_factors = collect_risk_factors(&probes, &self.thresholds);
        let checks = audit_checks(&probes, &self.thresholds);

        let is_safe = score >= self.thresholds.min_confidence
            && checks.honeypot_test
            && risk_factors.len() < self.thresholds.max_risk_factors;

        let result = Arc::new(SafetyResult {
            is_safe,
            confidence_score: score,
            risk_factors,
            checks,
            probes,
        });

        let status = if is_safe { "SAFE" } else { "RISKY" };
        info!(
            "{} {}: {:.2} confidence, {} risk factors",
            status,
            token.symbol,
            score,
            result.risk_factors.len()
        );
        if !result.risk_factors.is_empty() {
            debug!("Risk factors for {}: {:?}", token.symbol, result.risk_factors);
        }

        self.cache.insert(token.address.clone(), result.clone()).await;
        result
    }

    fn interpret_round_trip(
        &self,
        raw: Result<anyhow::Result<RoundTrip>, tokio::time::error::Elapsed>,
    ) -> HoneypotOutcome {
        match raw {
            Ok(Ok(RoundTrip { amount_in, amount_out: Some(out) })) if amount_in > 0.0 => {
                let efficiency = out / amount_in;
                if efficiency < self.thresholds.honeypot_efficiency_floor {
                    HoneypotOutcome::Honeypot {
                        reason: format!("round-trip efficiency {:.2}", efficiency),
                    }
                } else {
                    HoneypotOutcome::RoundTrip { efficiency }
                }
            }
            Ok(Ok(RoundTrip { amount_out: None, .. })) => HoneypotOutcome::Honeypot {
                reason: "sell quote unobtainable".to_string(),
            },
            Ok(Ok(_)) => HoneypotOutcome::Honeypot {
                reason: "invalid probe amount".to_string(),
            },
            Ok(Err(e)) => HoneypotOutcome::Honeypot {
                reason: format!("simulation failed: {}", e),
            },
            Err(_) => HoneypotOutcome::Honeypot {
                reason: "probe timed out".to_string(),
            },
        }
    }

    fn measure_holders(&self, amounts: &[u64]) -> HolderOutcome {
        let total: u64 = amounts.iter().sum();
        if total == 0 {
            return HolderOutcome::Unavailable("zero total supply".to_string());
        }

        let top = amounts.first().copied().unwrap_or(0);
        let top_holder_pct = (top as f64 / total as f64) * 100.0;

        let materiality = total as f64 * self.thresholds.significant_holder_fraction;
        let significant_holders = amounts.iter().filter(|&&a| (a as f64) > materiality).count();

        HolderOutcome::Measured {
            top_holder_pct,
            significant_holders,
            total_accounts: amounts.len(),
        }
    }
}

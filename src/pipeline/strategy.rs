//! Strategy engine - turns safe candidates into sized, bracketed entries,
//! under per-day caps, plus the watchlist round-trip scan.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::config::{ArchetypeParams, TradeLimits, WatchlistParams};
use crate::pipeline::events::{BotEvent, EventSink};
use crate::pipeline::positions::{PositionBook, TradeArchetype, TradePosition};
use crate::pipeline::sources::ExecutionClient;
use crate::types::{Token, TokenAddress, USDC_MINT};

/// Daily trade budget: trade count and USD deployed, reset on calendar-day
/// rollover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeBudget {
    pub day: NaiveDate,
    pub trades: u32,
    pub spent_usd: f64,
}

impl TradeBudget {
    pub fn new(day: NaiveDate) -> Self {
        Self { day, trades: 0, spent_usd: 0.0 }
    }

    /// Pure calendar rollover: a new day resets the counters, the same
    /// day leaves them untouched.
    pub fn roll_over(self, today: NaiveDate) -> Self {
        if today != self.day {
            Self::new(today)
        } else {
            self
        }
    }

    pub fn record(&mut self, size_usd: f64) {
        self.trades += 1;
        self.spent_usd += size_usd;
    }

    pub fn exhausted(&self, limits: &TradeLimits) -> bool {
        self.trades >= limits.max_daily_trades || self.spent_usd >= limits.daily_spend_cap_usd
    }

    pub fn remaining_spend(&self, limits: &TradeLimits) -> f64 {
        (limits.daily_spend_cap_usd - self.spent_usd).max(0.0)
    }
}

/// One viable watchlist round trip, cheapest first in the ranked report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistOpportunity {
    pub symbol: String,
    pub address: TokenAddress,
    pub entry_impact_pct: f64,
    pub exit_impact_pct: f64,
    pub round_trip_cost_pct: f64,
    pub justification: String,
}

/// Entry decision engine. Evaluation is per safe candidate, once per
/// cycle; every rejection carries a reason and is emitted as an event.
pub struct StrategyEngine {
    execution: Arc<dyn ExecutionClient>,
    book: Arc<PositionBook>,
    params: ArchetypeParams,
    limits: TradeLimits,
    watchlist: WatchlistParams,
    events: EventSink,
    budget: Mutex<TradeBudget>,
}

impl StrategyEngine {
    pub fn new(
        execution: Arc<dyn ExecutionClient>,
        book: Arc<PositionBook>,
        params: ArchetypeParams,
        limits: TradeLimits,
        watchlist: WatchlistParams,
        events: EventSink,
    ) -> Self {
        Self {
            execution,
            book,
            params,
            limits,
            watchlist,
            events,
            budget: Mutex::new(TradeBudget::new(Utc::now().date_naive())),
        }
    }

    /// Advance the daily budget to today. Called once at cycle start.
    pub async fn roll_budget_over(&self) {
        let mut budget = self.budget.lock().await;
        let rolled = budget.roll_over(Utc::now().date_naive());
        if rolled != *budget {
            info!("New trading day, budget reset");
            *budget = rolled;
        }
    }

    pub async fn trades_today(&self) -> u32 {
        self.budget.lock().await.trades
    }

    pub async fn budget_exhausted(&self) -> bool {
        self.budget.lock().await.exhausted(&self.limits)
    }

    /// Classify a candidate into an archetype. Scalp takes precedence;
    /// a candidate matching neither takes no trade.
    pub fn classify(&self, token: &Token) -> Option<TradeArchetype> {
        if token.price_change_5m >= self.params.scalp_pump_pct {
            return Some(TradeArchetype::Scalp);
        }
        if token.volume_5m_usd >= self.params.snipe_volume_usd
            && token.age_minutes <= self.params.snipe_max_age_minutes
        {
            return Some(TradeArchetype::Snipe);
        }
        None
    }

    /// Position size for an archetype at a given confidence. Scalp scales
    /// with confidence directly; snipe at half weight. Capped by the
    /// per-trade ceiling and the remaining daily spend.
    pub fn position_size(
        &self,
        archetype: TradeArchetype,
        confidence: f64,
        remaining_spend: f64,
    ) -> f64 {
        let multiplier = match archetype {
            TradeArchetype::Scalp => confidence,
            TradeArchetype::Snipe => confidence * 0.5,
        };
        (self.limits.base_position_usd * multiplier)
            .min(self.limits.max_position_usd)
            .min(remaining_spend)
    }

    /// Evaluate one safe candidate. Returns the opened position when an
    /// entry was made; rejections are emitted as events and return `None`.
    #[instrument(skip(self, token), fields(symbol = %token.symbol, address = %token.short_address()))]
    pub async fn evaluate(&self, token: &Token, confidence: f64) -> Option<TradePosition> {
        if token.age_minutes > self.params.max_entry_age_minutes {
            self.reject(token, "entry window closed");
            return None;
        }
        if token.liquidity_usd < self.params.min_entry_liquidity_usd {
            self.reject(token, "liquidity below strategy floor");
            return None;
        }
        if self.book.contains(&token.address).await {
            self.reject(token, "position already open");
            return None;
        }

        // Budget checks happen before any collaborator call.
        let budget = *self.budget.lock().await;
        if budget.exhausted(&self.limits) {
            self.reject(token, "daily budget exhausted");
            return None;
        }

        let archetype = match self.classify(token) {
            Some(archetype) => archetype,
            None => {
                self.reject(token, "no archetype matched");
                return None;
            }
        };

        let size_usd = self.position_size(
            archetype,
            confidence,
            budget.remaining_spend(&self.limits),
        );
        if size_usd <= 0.0 {
            self.reject(token, "no remaining daily spend");
            return None;
        }

        match self.enter(token, archetype, size_usd).await {
            Ok(position) => {
                self.budget.lock().await.record(size_usd);
                info!(
                    "Entered {} {} for ${:.2}: entry {:.8}, TP {:.8}, SL {:.8}",
                    archetype.label(),
                    token.symbol,
                    size_usd,
                    position.entry_price,
                    position.take_profit_price,
                    position.stop_loss_price,
                );
                self.events.emit(BotEvent::TradeEntry {
                    symbol: token.symbol.clone(),
                    address: token.address.clone(),
                    archetype: archetype.label().to_string(),
                    size_usd,
                    entry_price: position.entry_price,
                    take_profit: position.take_profit_price,
                    stop_loss: position.stop_loss_price,
                });
                Some(position)
            }
            Err(e) => {
                warn!("Entry failed for {}, taking no position: {}", token.symbol, e);
                None
            }
        }
    }

    /// Quote, order, and book the position. Any failure means no position
    /// was taken.
    async fn enter(
        &self,
        token: &Token,
        archetype: TradeArchetype,
        size_usd: f64,
    ) -> Result<TradePosition> {
        let usdc = USDC_MINT.to_string();
        let quote = self
            .execution
            .get_quote(&usdc, &token.address, size_usd)
            .await
            .map_err(|e| anyhow!("entry quote: {}", e))?;

        if quote.output_amount <= 0.0 {
            return Err(anyhow!("entry quote returned no output"));
        }

        let receipt = self
            .execution
            .place_order(&quote)
            .await
            .map_err(|e| anyhow!("entry order: {}", e))?;

        let entry_price = size_usd / quote.output_amount;
        let (tp_pct, sl_pct, max_hold) = match archetype {
            TradeArchetype::Scalp => (
                self.params.scalp_take_profit_pct,
                self.params.scalp_stop_loss_pct,
                self.params.scalp_max_hold_minutes,
            ),
            TradeArchetype::Snipe => (
                self.params.snipe_take_profit_pct,
                self.params.snipe_stop_loss_pct,
                self.params.snipe_max_hold_minutes,
            ),
        };

        let position = TradePosition {
            address: token.address.clone(),
            symbol: token.symbol.clone(),
            archetype,
            size_usd,
            tokens_held: quote.output_amount,
            entry_price,
            take_profit_price: entry_price * (1.0 + tp_pct / 100.0),
            stop_loss_price: entry_price * (1.0 - sl_pct / 100.0),
            entry_time: Utc::now(),
            max_hold_minutes: max_hold,
            order_id: receipt.order_id,
        };

        self.book.insert(position.clone()).await?;
        Ok(position)
    }

    fn reject(&self, token: &Token, reason: &str) {
        debug!("Rejected {}: {}", token.symbol, reason);
        self.events.emit(BotEvent::Rejection {
            symbol: token.symbol.clone(),
            address: token.address.clone(),
            stage: "strategy".to_string(),
            reason: reason.to_string(),
        });
    }

    /// Probe both swap legs for every watchlist entry and return the
    /// viable round trips, cheapest first. Reporting only, never executes.
    #[instrument(skip(self))]
    pub async fn scan_watchlist(&self) -> Vec<WatchlistOpportunity> {
        let usdc = USDC_MINT.to_string();
        let probe = self.watchlist.probe_amount_usd;
        let mut opportunities = Vec::new();

        for (symbol, address) in &self.watchlist.entries {
            let entry = match self.execution.get_quote(&usdc, address, probe).await {
                Ok(quote) => quote,
                Err(e) => {
                    debug!("Watchlist {}: entry leg unquotable: {}", symbol, e);
                    continue;
                }
            };
            if entry.price_impact_pct > self.watchlist.entry_leg_impact_ceiling_pct {
                debug!(
                    "Watchlist {}: entry impact {:.1}% over ceiling",
                    symbol, entry.price_impact_pct
                );
                continue;
            }

            let exit = match self
                .execution
                .get_quote(address, &usdc, entry.output_amount)
                .await
            {
                Ok(quote) => quote,
                Err(e) => {
                    debug!("Watchlist {}: exit leg unquotable: {}", symbol, e);
                    continue;
                }
            };
            if exit.price_impact_pct > self.watchlist.exit_leg_impact_ceiling_pct {
                debug!(
                    "Watchlist {}: exit impact {:.1}% over ceiling",
                    symbol, exit.price_impact_pct
                );
                continue;
            }

            let round_trip_cost_pct = entry.price_impact_pct + exit.price_impact_pct;
            if round_trip_cost_pct > self.watchlist.round_trip_cost_ceiling_pct {
                debug!(
                    "Watchlist {}: round-trip cost {:.1}% over ceiling",
                    symbol, round_trip_cost_pct
                );
                continue;
            }

            opportunities.push(WatchlistOpportunity {
                symbol: symbol.clone(),
                address: address.clone(),
                entry_impact_pct: entry.price_impact_pct,
                exit_impact_pct: exit.price_impact_pct,
                round_trip_cost_pct,
                justification: format!(
                    "{}: {:.1}% entry + {:.1}% exit = {:.1}% round trip on a ${:.0} probe",
                    symbol,
                    entry.price_impact_pct,
                    exit.price_impact_pct,
                    round_trip_cost_pct,
                    probe,
                ),
            });
        }

        opportunities.sort_by(|a, b| {
            a.round_trip_cost_pct
                .partial_cmp(&b.round_trip_cost_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if !opportunities.is_empty() {
            info!(
                "Watchlist scan: {} viable round trips, best {}",
                opportunities.len(),
                opportunities[0].justification,
            );
        }
        opportunities
    }
}

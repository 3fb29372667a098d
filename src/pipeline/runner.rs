//! Pipeline orchestrator: the discovery/monitor loop, session statistics,
//! and graceful shutdown.
//!
//! One cycle runs discovery, safety, and strategy serially per candidate
//! in feed order, then a single monitor pass. The position book has one
//! writer at a time by construction.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

use crate::pipeline::config::BotConfig;
use crate::pipeline::events::{BotEvent, EventSink};
use crate::pipeline::positions::{PositionBook, PositionMonitor};
use crate::pipeline::safety::SafetyAnalyzer;
use crate::pipeline::scanner::TokenScanner;
use crate::pipeline::sources::{
    ExecutionClient, MarketFeed, PriceSource, SafetyDataSource,
};
use crate::pipeline::strategy::StrategyEngine;

/// The watchlist round-trip scan runs every this many cycles.
const WATCHLIST_SCAN_EVERY: u64 = 10;

/// Cumulative counters for the session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub scans: u64,
    pub tokens_found: u64,
    pub tokens_analyzed: u64,
    pub tokens_safe: u64,
    pub trades_entered: u64,
    pub trades_exited: u64,
    pub realized_pnl_usd: f64,
}

/// Point-in-time view of the running pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub cycles: u64,
    pub trades_today: u32,
    pub open_positions: usize,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub stats: SessionStats,
}

#[derive(Debug, Default)]
struct RunnerState {
    running: bool,
    cycles: u64,
    trades_today: u32,
    last_scan_time: Option<DateTime<Utc>>,
    stats: SessionStats,
}

/// Cloneable handle for status queries from outside the loop.
#[derive(Clone)]
pub struct StatusHandle {
    state: Arc<Mutex<RunnerState>>,
    book: Arc<PositionBook>,
}

impl StatusHandle {
    pub async fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        StatusSnapshot {
            running: state.running,
            cycles: state.cycles,
            trades_today: state.trades_today,
            open_positions: self.book.open_count().await,
            last_scan_time: state.last_scan_time,
            stats: state.stats,
        }
    }
}

/// The autonomous pipeline loop.
pub struct BotRunner {
    config: BotConfig,
    scanner: TokenScanner,
    safety: SafetyAnalyzer,
    strategy: StrategyEngine,
    monitor: PositionMonitor,
    book: Arc<PositionBook>,
    events: EventSink,
    state: Arc<Mutex<RunnerState>>,
    stop: watch::Receiver<bool>,
}

impl BotRunner {
    /// Wire the pipeline components around shared collaborators. Returns
    /// the runner and the stop signal sender.
    pub fn new(
        config: BotConfig,
        feed: Arc<dyn MarketFeed>,
        safety_source: Arc<dyn SafetyDataSource>,
        execution: Arc<dyn ExecutionClient>,
        prices: Arc<dyn PriceSource>,
        events: EventSink,
    ) -> (Self, watch::Sender<bool>) {
        let book = Arc::new(PositionBook::new());
        let scanner = TokenScanner::new(feed, config.filter.clone());
        let safety = SafetyAnalyzer::new(safety_source, config.safety.clone());
        let strategy = StrategyEngine::new(
            execution.clone(),
            book.clone(),
            config.archetypes.clone(),
            config.limits.clone(),
            config.watchlist.clone(),
            events.clone(),
        );
        let monitor = PositionMonitor::new(prices, execution, book.clone(), events.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let runner = Self {
            config,
            scanner,
            safety,
            strategy,
            monitor,
            book,
            events,
            state: Arc::new(Mutex::new(RunnerState::default())),
            stop: stop_rx,
        };
        (runner, stop_tx)
    }

    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            state: self.state.clone(),
            book: self.book.clone(),
        }
    }

    /// Run until stopped. An in-flight cycle always drains before the
    /// loop exits.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Pipeline starting: scan every {}s, max {} trades/day",
            self.config.scan_interval_secs, self.config.limits.max_daily_trades,
        );
        self.state.lock().await.running = true;

        let interval = std::time::Duration::from_secs(self.config.scan_interval_secs);
        loop {
            if *self.stop.borrow() {
                break;
            }

            let started = Instant::now();
            self.cycle().await;

            let remainder = interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(remainder) => {}
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        break;
                    }
                }
            }
        }

        let mut state = self.state.lock().await;
        state.running = false;
        info!(
            "Pipeline stopped after {} cycles: {} trades entered, realized PnL ${:+.2}",
            state.cycles, state.stats.trades_entered, state.stats.realized_pnl_usd,
        );
        Ok(())
    }

    /// One full cycle: discovery through strategy, then a monitor pass.
    #[instrument(skip(self))]
    async fn cycle(&self) {
        self.strategy.roll_budget_over().await;

        let open_before = self.book.open_count().await;
        let at_capacity = open_before >= self.config.limits.max_active_positions;
        let budget_spent = self.strategy.budget_exhausted().await;

        let mut candidates_found = 0usize;
        let mut analyzed = 0usize;
        let mut safe_found = 0usize;
        let mut entered = 0u32;

        if at_capacity || budget_spent {
            info!(
                "Skipping discovery ({}), monitoring {} open positions",
                if at_capacity { "position cap reached" } else { "daily budget spent" },
                open_before,
            );
        } else {
            let candidates = match self.scanner.scan().await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("Discovery failed this cycle: {}", e);
                    Vec::new()
                }
            };
            candidates_found = candidates.len();

            for token in &candidates {
                analyzed += 1;
                let result = self.safety.evaluate(token).await;
                if !result.is_safe {
                    self.events.emit(BotEvent::Rejection {
                        symbol: token.symbol.clone(),
                        address: token.address.clone(),
                        stage: "safety".to_string(),
                        reason: if result.risk_factors.is_empty() {
                            format!("confidence {:.2} below threshold", result.confidence_score)
                        } else {
                            result.risk_factors.join("; ")
                        },
                    });
                    continue;
                }
                safe_found += 1;

                if self
                    .strategy
                    .evaluate(token, result.confidence_score)
                    .await
                    .is_some()
                {
                    entered += 1;
                }

                if self.book.open_count().await >= self.config.limits.max_active_positions
                    || self.strategy.budget_exhausted().await
                {
                    break;
                }
            }
        }

        let pass = self.monitor.tick().await;

        let open_after = self.book.open_count().await;
        let mut state = self.state.lock().await;
        state.cycles += 1;
        state.trades_today = self.strategy.trades_today().await;
        state.last_scan_time = Some(Utc::now());
        state.stats.scans += 1;
        state.stats.tokens_found += candidates_found as u64;
        state.stats.tokens_analyzed += analyzed as u64;
        state.stats.tokens_safe += safe_found as u64;
        state.stats.trades_entered += entered as u64;
        state.stats.trades_exited += pass.exited as u64;
        state.stats.realized_pnl_usd += pass.realized_pnl_usd;
        let cycles = state.cycles;
        drop(state);

        self.events.emit(BotEvent::ScanSummary {
            candidates: candidates_found,
            safe: safe_found,
            trades_entered: entered,
            open_positions: open_after,
        });

        if cycles % WATCHLIST_SCAN_EVERY == 0 {
            let report = self.strategy.scan_watchlist().await;
            for opportunity in &report {
                info!("Watchlist opportunity: {}", opportunity.justification);
            }
        }
    }
}

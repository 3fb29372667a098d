//! Open-position tracking and the take-profit / stop-loss / timeout
//! monitor.
//!
//! The book holds at most one open position per token address. Inserts
//! happen only on a successful entry, removals only on a successful exit;
//! a closed position is terminal.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::events::{BotEvent, EventSink};
use crate::pipeline::sources::{ExecutionClient, PriceSource};
use crate::types::{TokenAddress, USDC_MINT};

/// Trade archetype a position was entered under. The archetype fixes the
/// exit brackets and the maximum hold time at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeArchetype {
    /// Momentum continuation: tight brackets, short hold.
    Scalp,
    /// Early high-volume entry: wide brackets, longer hold.
    Snipe,
}

impl TradeArchetype {
    pub fn label(&self) -> &'static str {
        match self {
            TradeArchetype::Scalp => "scalp",
            TradeArchetype::Snipe => "snipe",
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Timeout,
}

impl ExitReason {
    pub fn label(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take profit",
            ExitReason::StopLoss => "stop loss",
            ExitReason::Timeout => "max hold time reached",
        }
    }
}

/// An open position. Exit brackets are absolute prices computed once at
/// entry; the monitor never re-derives them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePosition {
    pub address: TokenAddress,
    pub symbol: String,
    pub archetype: TradeArchetype,
    pub size_usd: f64,
    pub tokens_held: f64,
    pub entry_price: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub entry_time: DateTime<Utc>,
    pub max_hold_minutes: i64,
    pub order_id: String,
}

impl TradePosition {
    /// Exit decision for the current price and time. Take-profit is
    /// checked before stop-loss; the timeout applies only when neither
    /// bracket is crossed.
    pub fn exit_reason(&self, price: f64, now: DateTime<Utc>) -> Option<ExitReason> {
        if price >= self.take_profit_price {
            return Some(ExitReason::TakeProfit);
        }
        if price <= self.stop_loss_price {
            return Some(ExitReason::StopLoss);
        }
        if (now - self.entry_time).num_minutes() > self.max_hold_minutes {
            return Some(ExitReason::Timeout);
        }
        None
    }

    pub fn held_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_time).num_minutes()
    }
}

/// Shared book of open positions, keyed by token address.
#[derive(Default)]
pub struct PositionBook {
    inner: Mutex<HashMap<TokenAddress, TradePosition>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open_count(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn contains(&self, address: &TokenAddress) -> bool {
        self.inner.lock().await.contains_key(address)
    }

    /// Insert a new position. A second position for the same address is
    /// an invariant violation and fails loudly.
    pub async fn insert(&self, position: TradePosition) -> Result<()> {
        let mut book = self.inner.lock().await;
        if book.contains_key(&position.address) {
            bail!("position already open for {}", position.address);
        }
        book.insert(position.address.clone(), position);
        Ok(())
    }

    pub async fn remove(&self, address: &TokenAddress) -> Option<TradePosition> {
        self.inner.lock().await.remove(address)
    }

    /// Clone of the currently open positions, for iteration without
    /// holding the lock across awaits.
    pub async fn snapshot(&self) -> Vec<TradePosition> {
        self.inner.lock().await.values().cloned().collect()
    }
}

/// Summary of one monitor pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorPass {
    pub checked: usize,
    pub exited: usize,
    pub realized_pnl_usd: f64,
}

/// Walks the open positions each tick and closes the ones whose exit
/// condition fired.
pub struct PositionMonitor {
    prices: Arc<dyn PriceSource>,
    execution: Arc<dyn ExecutionClient>,
    book: Arc<PositionBook>,
    events: EventSink,
}

impl PositionMonitor {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        execution: Arc<dyn ExecutionClient>,
        book: Arc<PositionBook>,
        events: EventSink,
    ) -> Self {
        Self { prices, execution, book, events }
    }

    /// One monitor pass over every open position.
    ///
    /// A price-fetch failure skips that position until the next tick; an
    /// exit-order failure leaves the position open for retry. Neither
    /// aborts the pass for the remaining positions.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> MonitorPass {
        let open = self.book.snapshot().await;
        let mut pass = MonitorPass::default();
        let now = Utc::now();

        for position in open {
            pass.checked += 1;

            let price = match self.prices.current_price(&position.address).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(
                        "No price for {} this tick, keeping position: {}",
                        position.symbol, e
                    );
                    continue;
                }
            };

            let reason = match position.exit_reason(price, now) {
                Some(reason) => reason,
                None => {
                    debug!(
                        "{} holding at {:.8} (entry {:.8}, TP {:.8}, SL {:.8})",
                        position.symbol,
                        price,
                        position.entry_price,
                        position.take_profit_price,
                        position.stop_loss_price,
                    );
                    continue;
                }
            };

            match self.close_position(&position).await {
                Ok(proceeds_usd) => {
                    self.book.remove(&position.address).await;
                    let pnl = proceeds_usd - position.size_usd;
                    let held = position.held_minutes(now);
                    pass.exited += 1;
                    pass.realized_pnl_usd += pnl;
                    info!(
                        "Closed {} ({}): {} after {}m, PnL ${:+.2}",
                        position.symbol,
                        position.archetype.label(),
                        reason.label(),
                        held,
                        pnl,
                    );
                    self.events.emit(BotEvent::TradeExit {
                        symbol: position.symbol.clone(),
                        address: position.address.clone(),
                        reason: reason.label().to_string(),
                        pnl_usd: pnl,
                        held_minutes: held,
                    });
                }
                Err(e) => {
                    warn!(
                        "Exit order failed for {}, will retry next tick: {}",
                        position.symbol, e
                    );
                }
            }
        }

        pass
    }

    /// Sell the position back to the quote currency. Returns the USD
    /// proceeds of the exit quote.
    async fn close_position(&self, position: &TradePosition) -> Result<f64> {
        let usdc = USDC_MINT.to_string();
        let quote = self
            .execution
            .get_quote(&position.address, &usdc, position.tokens_held)
            .await
            .map_err(|e| anyhow!("exit quote: {}", e))?;

        self.execution
            .place_order(&quote)
            .await
            .map_err(|e| anyhow!("exit order: {}", e))?;

        Ok(quote.output_amount)
    }
}

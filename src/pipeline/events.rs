//! Structured events emitted toward the notification sink.
//!
//! The chat layer rendering these is out of scope; delivery is best-effort
//! and the pipeline never depends on it succeeding.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::TokenAddress;

/// Events the pipeline emits for the notification layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotEvent {
    /// A position was opened.
    TradeEntry {
        symbol: String,
        address: TokenAddress,
        archetype: String,
        size_usd: f64,
        entry_price: f64,
        take_profit: f64,
        stop_loss: f64,
    },
    /// A position was closed.
    TradeExit {
        symbol: String,
        address: TokenAddress,
        reason: String,
        pnl_usd: f64,
        held_minutes: i64,
    },
    /// One discovery cycle finished.
    ScanSummary {
        candidates: usize,
        safe: usize,
        trades_entered: u32,
        open_positions: usize,
    },
    /// A candidate was rejected, with the stage and reason.
    Rejection {
        symbol: String,
        address: TokenAddress,
        stage: String,
        reason: String,
    },
}

/// Best-effort sender for pipeline events.
///
/// A missing, full, or closed sink is logged and ignored; event delivery
/// must never stall or fail a cycle.
#[derive(Clone)]
pub struct EventSink {
    sender: Option<mpsc::Sender<BotEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::Sender<BotEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    /// A sink that drops every event (disabled notifications).
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Emit an event without waiting on the receiver.
    pub fn emit(&self, event: BotEvent) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.try_send(event) {
                debug!("Event sink unavailable, dropping event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(tx);

        sink.emit(BotEvent::ScanSummary {
            candidates: 3,
            safe: 1,
            trades_entered: 1,
            open_positions: 1,
        });

        match rx.recv().await {
            Some(BotEvent::ScanSummary { candidates, .. }) => assert_eq!(candidates, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_disabled_sink_drops_silently() {
        let sink = EventSink::disabled();
        sink.emit(BotEvent::Rejection {
            symbol: "TEST".to_string(),
            address: "TestMint".to_string(),
            stage: "strategy".to_string(),
            reason: "no archetype matched".to_string(),
        });
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);
        for _ in 0..5 {
            sink.emit(BotEvent::ScanSummary {
                candidates: 0,
                safe: 0,
                trades_entered: 0,
                open_positions: 0,
            });
        }
    }
}

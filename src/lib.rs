//! tokenhawk - autonomous token discovery and trade decision pipeline
//!
//! This crate scans fresh DEX listings, screens them through concurrent
//! safety probes, enters bracketed positions under strict daily caps, and
//! monitors the open book until every position exits.

pub mod pipeline;
pub mod types;

// Re-export main types for convenience
pub use pipeline::{BotConfig, BotEvent, BotRunner, EventSink};
pub use types::Token;

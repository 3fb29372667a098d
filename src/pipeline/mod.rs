//! Pipeline module - the autonomous decision pipeline.
//!
//! Discovery (scanner) feeds the safety analyzer, safe candidates flow
//! into the strategy engine, and the position monitor closes what the
//! strategy opened. The runner drives the whole loop on a fixed interval.

pub mod config;
pub mod events;
pub mod feed;
pub mod positions;
pub mod runner;
pub mod safety;
pub mod scanner;
pub mod sources;
pub mod strategy;

// Re-export main types
pub use config::{
    ArchetypeParams, BotConfig, FilterCriteria, SafetyThresholds, TradeLimits, WatchlistParams,
};
pub use events::{BotEvent, EventSink};
pub use feed::{normalize_listing, RawPairListing};
pub use positions::{
    ExitReason, PositionBook, PositionMonitor, TradeArchetype, TradePosition,
};
pub use runner::{BotRunner, SessionStats, StatusHandle, StatusSnapshot};
pub use safety::{SafetyAnalyzer, SafetyChecks, SafetyResult};
pub use scanner::TokenScanner;
pub use sources::{
    build_http_client, ExecutionClient, HttpExecutionClient, HttpMarketFeed, HttpPriceSource,
    HttpSafetyDataSource, MarketFeed, PriceSource, SafetyDataSource,
};
pub use strategy::{StrategyEngine, TradeBudget, WatchlistOpportunity};

//! End-to-end tests for the decision pipeline with mocked collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokenhawk::pipeline::feed::{ListedToken, LiquidityStat, RawPairListing, WindowedStat};
use tokenhawk::pipeline::sources::{
    AccountMetadata, ExecutionClient, FeedError, MarketFeed, OrderError, OrderReceipt,
    PriceSource, Quote, QuoteError, ReputationReport, RoundTrip, SafetyDataSource,
};
use tokenhawk::pipeline::{BotConfig, BotEvent, BotRunner, EventSink};
use tokenhawk::types::{TokenAddress, USDC_MINT};
use tokio::sync::{mpsc, Mutex};

/// A scriptable market: one candidate listing, a movable price, and a
/// honeypot switch for the safety probes.
struct MockMarket {
    listing_address: String,
    price: Mutex<f64>,
    honeypot: AtomicBool,
}

impl MockMarket {
    fn new(address: &str) -> Self {
        Self {
            listing_address: address.to_string(),
            price: Mutex::new(1.0),
            honeypot: AtomicBool::new(false),
        }
    }

    fn listing(&self) -> RawPairListing {
        RawPairListing {
            chain_id: Some("solana".to_string()),
            dex_id: Some("raydium".to_string()),
            base_token: Some(ListedToken {
                address: self.listing_address.clone(),
                name: Some("Meme".to_string()),
                symbol: Some("MEME".to_string()),
            }),
            quote_token: Some(ListedToken {
                address: USDC_MINT.to_string(),
                name: Some("USD Coin".to_string()),
                symbol: Some("USDC".to_string()),
            }),
            pair_created_at: Some((Utc::now() - Duration::minutes(8)).timestamp_millis()),
            price_usd: Some("1.0".to_string()),
            price_change: Some(WindowedStat { m5: Some(28.0), h1: Some(40.0) }),
            volume: Some(WindowedStat { m5: Some(5_000.0), h1: Some(25_000.0) }),
            liquidity: Some(LiquidityStat { usd: Some(50_000.0) }),
            market_cap: Some(1_000_000.0),
        }
    }
}

#[async_trait]
impl MarketFeed for MockMarket {
    async fn trending_pairs(&self) -> Result<Vec<RawPairListing>, FeedError> {
        Ok(vec![self.listing()])
    }

    async fn new_pairs(&self) -> Result<Vec<RawPairListing>, FeedError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl SafetyDataSource for MockMarket {
    async fn simulate_round_trip(
        &self,
        _token: &TokenAddress,
        probe_amount_usd: f64,
    ) -> anyhow::Result<RoundTrip> {
        if self.honeypot.load(Ordering::SeqCst) {
            Ok(RoundTrip { amount_in: probe_amount_usd, amount_out: None })
        } else {
            Ok(RoundTrip {
                amount_in: probe_amount_usd,
                amount_out: Some(probe_amount_usd * 0.95),
            })
        }
    }

    async fn lookup_reputation(&self, _token: &TokenAddress) -> anyhow::Result<ReputationReport> {
        Ok(ReputationReport::NotListed)
    }

    async fn largest_holders(&self, _token: &TokenAddress) -> anyhow::Result<Vec<u64>> {
        Ok(vec![100, 90, 80, 70, 60, 50, 40, 30, 20, 10, 9, 8])
    }

    async fn account_metadata(&self, _token: &TokenAddress) -> anyhow::Result<AccountMetadata> {
        Ok(AccountMetadata {
            owner: "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA".to_string(),
            initialized: true,
        })
    }
}

#[async_trait]
impl ExecutionClient for MockMarket {
    async fn get_quote(
        &self,
        input: &TokenAddress,
        output: &TokenAddress,
        amount_in: f64,
    ) -> Result<Quote, QuoteError> {
        let price = *self.price.lock().await;
        // Buying tokens with USD converts at the current price; selling
        // converts back.
        let output_amount = if input.as_str() == USDC_MINT {
            amount_in / price
        } else {
            amount_in * price
        };
        Ok(Quote {
            input_token: input.clone(),
            output_token: output.clone(),
            amount_in,
            output_amount,
            price_impact_pct: 1.0,
        })
    }

    async fn place_order(&self, _quote: &Quote) -> Result<OrderReceipt, OrderError> {
        Ok(OrderReceipt { order_id: "order-1".to_string() })
    }
}

#[async_trait]
impl PriceSource for MockMarket {
    async fn current_price(&self, _token: &TokenAddress) -> Result<f64, FeedError> {
        Ok(*self.price.lock().await)
    }
}

fn fast_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.scan_interval_secs = 1;
    config
}

#[tokio::test]
async fn test_pipeline_enters_and_takes_profit() {
    let market = Arc::new(MockMarket::new("MemeMint111"));
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let (runner, stop) = BotRunner::new(
        fast_config(),
        market.clone(),
        market.clone(),
        market.clone(),
        market.clone(),
        EventSink::new(event_tx),
    );
    let status = runner.status_handle();
    let handle = tokio::spawn(runner.run());

    // First cycle: entry at price 1.0 with scalp brackets (+30% / -10%).
    let entry = wait_for(&mut event_rx, |e| matches!(e, BotEvent::TradeEntry { .. })).await;
    match entry {
        BotEvent::TradeEntry { symbol, archetype, entry_price, take_profit, .. } => {
            assert_eq!(symbol, "MEME");
            assert_eq!(archetype, "scalp");
            assert!((entry_price - 1.0).abs() < 1e-9);
            assert!((take_profit - 1.30).abs() < 1e-9);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Price crosses the bracket; the next monitor pass closes the trade.
    *market.price.lock().await = 1.35;
    let exit = wait_for(&mut event_rx, |e| matches!(e, BotEvent::TradeExit { .. })).await;
    match exit {
        BotEvent::TradeExit { reason, pnl_usd, .. } => {
            assert_eq!(reason, "take profit");
            assert!(pnl_usd > 0.0, "expected a profit, got {}", pnl_usd);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    stop.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let snapshot = status.snapshot().await;
    assert_eq!(snapshot.open_positions, 0);
    assert_eq!(snapshot.stats.trades_entered, 1);
    assert_eq!(snapshot.stats.trades_exited, 1);
    assert!(snapshot.stats.realized_pnl_usd > 0.0);
}

#[tokio::test]
async fn test_pipeline_never_enters_honeypot() {
    let market = Arc::new(MockMarket::new("TrapMint111"));
    market.honeypot.store(true, Ordering::SeqCst);
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let (runner, stop) = BotRunner::new(
        fast_config(),
        market.clone(),
        market.clone(),
        market.clone(),
        market,
        EventSink::new(event_tx),
    );
    let status = runner.status_handle();
    let handle = tokio::spawn(runner.run());

    let rejection = wait_for(&mut event_rx, |e| matches!(e, BotEvent::Rejection { .. })).await;
    match rejection {
        BotEvent::Rejection { stage, reason, .. } => {
            assert_eq!(stage, "safety");
            assert!(reason.contains("Honeypot"), "reason: {}", reason);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    stop.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let snapshot = status.snapshot().await;
    assert_eq!(snapshot.stats.trades_entered, 0);
    assert_eq!(snapshot.open_positions, 0);
}

#[tokio::test]
async fn test_scan_summary_reports_each_cycle() {
    let market = Arc::new(MockMarket::new("MemeMint222"));
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let (runner, stop) = BotRunner::new(
        fast_config(),
        market.clone(),
        market.clone(),
        market.clone(),
        market,
        EventSink::new(event_tx),
    );
    let handle = tokio::spawn(runner.run());

    let summary = wait_for(&mut event_rx, |e| matches!(e, BotEvent::ScanSummary { .. })).await;
    match summary {
        BotEvent::ScanSummary { candidates, safe, trades_entered, open_positions } => {
            assert_eq!(candidates, 1);
            assert_eq!(safe, 1);
            assert_eq!(trades_entered, 1);
            assert_eq!(open_positions, 1);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    stop.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

/// Receive events until one matches, with a hard timeout so a broken
/// pipeline fails the test instead of hanging it.
async fn wait_for(
    rx: &mut mpsc::Receiver<BotEvent>,
    matches: impl Fn(&BotEvent) -> bool,
) -> BotEvent {
    tokio::time::timeout(std::time::Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

//! Main entry point for the tokenhawk pipeline.
//!
//! Wires the HTTP collaborators to the runner, drains pipeline events to
//! the log, and stops gracefully on Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokenhawk::pipeline::{
    build_http_client, BotConfig, BotEvent, BotRunner, EventSink, HttpExecutionClient,
    HttpMarketFeed, HttpPriceSource, HttpSafetyDataSource,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let config = BotConfig::default();
    config.validate().context("invalid configuration")?;

    info!("Starting tokenhawk pipeline");

    let client = build_http_client(&config)?;
    let feed = Arc::new(HttpMarketFeed::new(client.clone(), &config));
    let safety = Arc::new(HttpSafetyDataSource::new(client.clone(), &config));
    let execution = Arc::new(HttpExecutionClient::new(client.clone(), &config));
    let prices = Arc::new(HttpPriceSource::new(client, &config));

    let (event_tx, mut event_rx) = mpsc::channel::<BotEvent>(100);
    let events = EventSink::new(event_tx);

    // Drain pipeline events into the log until the channel closes.
    let event_drain = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match &event {
                BotEvent::TradeEntry { symbol, archetype, size_usd, .. } => {
                    info!("ENTRY {} {} ${:.2}", archetype, symbol, size_usd);
                }
                BotEvent::TradeExit { symbol, reason, pnl_usd, held_minutes, .. } => {
                    info!(
                        "EXIT {} ({}) after {}m, PnL ${:+.2}",
                        symbol, reason, held_minutes, pnl_usd
                    );
                }
                BotEvent::ScanSummary { candidates, safe, trades_entered, open_positions } => {
                    info!(
                        "Cycle: {} candidates, {} safe, {} entered, {} open",
                        candidates, safe, trades_entered, open_positions
                    );
                }
                BotEvent::Rejection { symbol, stage, reason, .. } => {
                    info!("Rejected {} at {}: {}", symbol, stage, reason);
                }
            }
        }
    });

    let (runner, stop) = BotRunner::new(config, feed, safety, execution, prices, events);
    let status = runner.status_handle();
    let runner_handle = tokio::spawn(runner.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested, draining in-flight cycle");
    if stop.send(true).is_err() {
        warn!("Pipeline already stopped");
    }

    match runner_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Pipeline exited with error: {}", e),
        Err(e) => error!("Pipeline task panicked: {}", e),
    }

    let snapshot = status.snapshot().await;
    info!(
        "Session: {} scans, {} tokens found, {} safe, {} trades, realized PnL ${:+.2}",
        snapshot.stats.scans,
        snapshot.stats.tokens_found,
        snapshot.stats.tokens_safe,
        snapshot.stats.trades_entered,
        snapshot.stats.realized_pnl_usd,
    );

    event_drain.abort();
    Ok(())
}

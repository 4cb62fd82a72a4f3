//! Live feed watcher.
//!
//! Demonstrates:
//! - Sharing one feed between two consumers
//! - Late-subscriber replay of the cached value
//! - Connectivity changes across reconnects
//! - One-off calls over the same socket
//!
//! Usage:
//!   cargo run --example watch_feed -- ws://127.0.0.1:9000 tok-1
//!   cargo run --example watch_feed -- ws://127.0.0.1:9000 tok-1 --debug
//!   cargo run --example watch_feed -- ws://127.0.0.1:9000 tok-1 --no-wait

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use feed_sync::{ClientConfig, FeedRegistry, Result};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:9000";
const DEFAULT_FEED: &str = "tok-1";

// ============================================================================
// Args
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    endpoint: String,
    feed: String,
    debug: bool,
    no_wait: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut positional = args.iter().filter(|a| !a.starts_with("--"));

        Self {
            endpoint: positional
                .next()
                .cloned()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            feed: positional
                .next()
                .cloned()
                .unwrap_or_else(|| DEFAULT_FEED.to_string()),
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "feed_sync=debug"
    } else {
        "feed_sync=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== watch_feed: {} on {} ===\n", args.feed, args.endpoint);

    // ========================================================================
    // Setup
    // ========================================================================

    let config = ClientConfig::builder(&args.endpoint)
        .base_delay(Duration::from_millis(250))
        .max_delay(Duration::from_secs(5))
        .max_attempts(10)
        .build()?;
    let registry = FeedRegistry::new(config);

    // ========================================================================
    // First consumer
    // ========================================================================

    println!("[Chart] Subscribing...");
    let chart = registry.subscribe(
        args.feed.as_str(),
        |update| println!("[Chart] {} = {}", update.key(), update.value()),
        |state| println!("[Chart] connection {state}"),
    );

    sleep(Duration::from_secs(2)).await;

    // ========================================================================
    // Second consumer, replayed from cache
    // ========================================================================

    println!("[Ticker] Subscribing...");
    let ticker = registry.subscribe_data(args.feed.as_str(), |update| {
        println!("[Ticker] {} = {}", update.key(), update.value())
    });
    println!(
        "[Ticker] listeners on {}: {}",
        args.feed,
        registry.listener_count(&args.feed)
    );

    // ========================================================================
    // One-off call
    // ========================================================================

    match registry
        .call("quote.get", json!({ "feed": args.feed }))
        .await
    {
        Ok(quote) => println!("[Call] quote.get -> {quote}"),
        Err(e) => println!("[Call] quote.get failed: {e}"),
    }

    // ========================================================================
    // Wait
    // ========================================================================

    if args.no_wait {
        println!("[--no-wait] Skipping wait");
    } else {
        println!("Press Ctrl+C to exit...");
        tokio::signal::ctrl_c().await.ok();
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    chart.unsubscribe();
    ticker.unsubscribe();
    println!("[Done] registry active: {}", registry.is_active());

    Ok(())
}

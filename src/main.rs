//! Circuit breaker demo.
//!
//! Drives a breaker with a simulated flaky backend and logs every
//! transition, so the trip / probe / recover cycle can be watched live.
//!
//! ```text
//! breaker-demo --calls 200 --failure-rate 0.7 --timeout-ms 20
//! breaker-demo --config breakers.toml --log-level debug
//! ```

use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use circuit_breaker::config::{load_config, BreakerConfig, Config, TripperConfig};
use circuit_breaker::observability::logging;
use circuit_breaker::{Breaker, BreakerRegistry, CallError, CircuitBreaker, EventEmitter, Shutdown};

#[derive(Parser)]
#[command(name = "breaker-demo")]
#[command(about = "Exercise a circuit breaker against a simulated flaky backend", long_about = None)]
struct Cli {
    /// TOML file with [[breakers]] sections; the first one is exercised
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of calls to make
    #[arg(long, default_value_t = 50)]
    calls: u32,

    /// Probability that a simulated call fails
    #[arg(long, default_value_t = 0.5)]
    failure_rate: f64,

    /// Simulated backend latency
    #[arg(long, default_value_t = 5)]
    latency_ms: u64,

    /// Per-call timeout, overriding the breaker's default
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Error)]
#[error("simulated backend failure")]
struct SimulatedFailure;

async fn flaky_backend(latency: Duration, failure_rate: f64) -> Result<(), SimulatedFailure> {
    tokio::time::sleep(latency).await;
    if rand::thread_rng().gen_bool(failure_rate) {
        Err(SimulatedFailure)
    } else {
        Ok(())
    }
}

fn demo_config() -> Config {
    Config {
        breakers: vec![BreakerConfig {
            name: "demo".to_string(),
            tripper: TripperConfig::Consecutive { failures: 3 },
            ..BreakerConfig::default()
        }],
        ..Config::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => demo_config(),
    };
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    logging::init(&level)?;

    tracing::info!("breaker-demo v{} starting", env!("CARGO_PKG_VERSION"));

    let registry = BreakerRegistry::new();
    for section in &config.breakers {
        registry.set(EventEmitter::new(Breaker::from_config(section), section.events));
    }
    let Some(name) = config.breakers.first().map(|section| section.name.clone()) else {
        tracing::warn!("No breakers configured, nothing to do");
        return Ok(());
    };
    let breaker = registry
        .get(&name)
        .ok_or_else(|| format!("breaker '{}' missing from registry", name))?;

    let shutdown = Shutdown::new();
    let fan_out = breaker.start(shutdown.subscribe())?;
    let mut events = breaker.subscribe(shutdown.subscribe());
    let listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(%event, "Breaker event");
        }
        events.dropped()
    });

    let latency = Duration::from_millis(cli.latency_ms);
    let failure_rate = cli.failure_rate.clamp(0.0, 1.0);
    let timeout = cli
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| breaker.default_timeout());

    let (mut ok, mut failed, mut timed_out, mut rejected) = (0u32, 0u32, 0u32, 0u32);
    for attempt in 0..cli.calls {
        let result = breaker
            .call_with_timeout(move || flaky_backend(latency, failure_rate), timeout)
            .await;
        match result {
            Ok(()) => ok += 1,
            Err(CallError::Open) => rejected += 1,
            Err(CallError::Timeout) => timed_out += 1,
            Err(CallError::Operation(e)) => {
                tracing::debug!(attempt, error = %e, "Call failed");
                failed += 1;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown.trigger();
    fan_out.await?;
    let dropped = listener.await?;

    tracing::info!(ok, failed, timed_out, rejected, dropped_events = dropped, "Demo finished");
    println!("{}", serde_json::to_string_pretty(&breaker.snapshot())?);
    Ok(())
}

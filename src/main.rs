//! Stale Cache - Demo binary
//!
//! Builds a cache from the environment, runs a small workload against it
//! with the background sweeper and resource sampler active, and logs the
//! cache statistics as JSON until interrupted.

use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::LocalSet;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stale_cache::{Cache, CacheConfig, InvalidateOptions, SetInput, SystemMonitor};

/// How long the demo runs when not interrupted.
const DEMO_DURATION: Duration = Duration::from_secs(30);

/// Interval between two resource samples.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Number of entries written by the demo workload.
const WORKLOAD_SIZE: usize = 2_000;

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Start the resource sampler and the cache with its sweeper
/// 4. Write a workload, then report statistics every second
/// 5. Stop on Ctrl+C or after the demo duration
fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stale_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Stale Cache demo");

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: default_ttl={}ms, stale_window={}ms, max_size={:?}, \
         sweep_interval={}ms",
        config.default_ttl_ms,
        config.default_stale_window_ms,
        config.max_size,
        config.sweep_interval_ms
    );

    // Caches are single-threaded, so everything runs on one LocalSet
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let local = LocalSet::new();
    local.block_on(&runtime, run(config, &local))
}

async fn run(config: CacheConfig, local: &LocalSet) -> anyhow::Result<()> {
    let monitor = Rc::new(SystemMonitor::new());
    monitor.start(local, SAMPLE_INTERVAL);

    let cache: Cache<String> = Cache::builder(config)
        .monitor(monitor.clone())
        .on_expire(|key, _, reason| debug!(key, %reason, "Entry reclaimed"))
        .start(local);
    info!(instance = %cache.id(), "Cache started");

    write_workload(&cache)?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(DEMO_DURATION);
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(deadline, ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Keep a few keys warm so hits and stale hits show up
                for i in (0..WORKLOAD_SIZE).step_by(100) {
                    cache.get(&format!("user:{}", i));
                }
                log_stats(&cache)?;
            }
            _ = &mut deadline => {
                info!("Demo duration elapsed, shutting down...");
                break;
            }
            result = &mut ctrl_c => {
                result.context("failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    cache.stop_sweep();
    monitor.stop();
    log_stats(&cache)?;
    info!("Demo complete");
    Ok(())
}

/// Writes entries with a mix of lifetimes and tags, then invalidates a tag.
fn write_workload(cache: &Cache<String>) -> anyhow::Result<()> {
    let mut rejected = 0;

    for i in 0..WORKLOAD_SIZE {
        let ttl = match i % 3 {
            0 => 2_000,
            1 => 5_000,
            _ => 20_000,
        };
        let group = if i % 10 == 0 { "admins" } else { "users" };

        let input = SetInput::new(format!("user:{}", i), format!("profile #{}", i))
            .ttl(ttl)
            .stale_window(3_000)
            .tag(group);
        if cache.set_with(input)?.is_rejected() {
            rejected += 1;
        }
    }
    info!(written = WORKLOAD_SIZE - rejected, rejected, "Workload written");

    cache.invalidate_tag("admins", InvalidateOptions::stale())?;
    info!("Tag 'admins' invalidated as stale");
    Ok(())
}

fn log_stats(cache: &Cache<String>) -> anyhow::Result<()> {
    let stats = serde_json::to_string(&cache.stats()).context("failed to encode stats")?;
    info!("Cache stats: {}", stats);
    Ok(())
}

//! Buffer stress testing tool.
//!
//! # Example
//!
//! ```sh
//! cargo r --bin coalesce-stress -- --requests 100000 --capacity 256 --interval 5 --keys 1000
//! ```
//!
//! Every request asks for one key of a simulated table. Requests are batched by a buffer into
//! lookups of the distinct keys of each cycle, each taking `--latency` milliseconds.

use clap::Parser;
use coalesce::{
    buffer::{Aggregate, Buffer, Fragment},
    config::BufferConfig,
    version::COALESCE_VERSION,
};
use eyre::{Context, bail};
use futures_util::{StreamExt, stream::FuturesUnordered};
use rand::Rng;
use std::{
    collections::{BTreeMap, HashSet},
    convert::Infallible,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// A request for the row stored under a key.
#[derive(Debug)]
struct Row(u64);

impl Fragment<BTreeMap<u64, String>> for Row {
    type Share = String;

    fn pick(&self, rows: &Arc<BTreeMap<u64, String>>) -> Option<String> {
        rows.get(&self.0).cloned()
    }
}

/// Simulated table answering every lookup after a fixed latency.
#[derive(Debug)]
struct Table {
    latency: Duration,
}

#[async_trait::async_trait]
impl Aggregate<Row> for Table {
    type Output = BTreeMap<u64, String>;
    type Error = Infallible;

    async fn aggregate(
        &self,
        cancel: &CancellationToken,
        rows: &[Row],
    ) -> Result<Self::Output, Self::Error> {
        let keys = rows.iter().map(|row| row.0).collect::<HashSet<_>>();
        // a cancelled buffer flushes without waiting on the table
        tokio::select! {
            _ = tokio::time::sleep(self.latency) => {}
            _ = cancel.cancelled() => {}
        }
        Ok(keys.into_iter().map(|key| (key, format!("row-{key}"))).collect())
    }
}

#[derive(Debug, Parser)]
#[command(author, version = COALESCE_VERSION, about = "Buffer stress test", long_about = None)]
struct Args {
    /// Buffer configuration file. Overrides `--capacity` and `--interval`.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Number of submissions that closes a cycle.
    #[arg(long, value_name = "COUNT", default_value_t = 64)]
    capacity: usize,
    /// Cycle interval in milliseconds.
    #[arg(long, value_name = "MILLIS", default_value_t = 10)]
    interval: u64,
    /// Latency of a simulated lookup in milliseconds.
    #[arg(long, value_name = "MILLIS", default_value_t = 2)]
    latency: u64,
    /// Number of requests to submit.
    #[arg(long, value_name = "COUNT", default_value_t = 10_000)]
    requests: usize,
    /// Number of distinct keys requested.
    #[arg(long, value_name = "COUNT", default_value_t = 1_000)]
    keys: u64,
}

impl Args {
    fn buffer_config(&self) -> eyre::Result<BufferConfig> {
        let config = match &self.config {
            Some(path) => BufferConfig::load_from_file(path)?,
            None => BufferConfig::new(self.capacity, Duration::from_millis(self.interval)),
        };
        config.validate().wrap_err("invalid buffer configuration")?;
        if config.name.is_some() {
            return Ok(config);
        }
        Ok(config.with_name("stress"))
    }

    async fn run(self) -> eyre::Result<()> {
        if self.keys == 0 {
            bail!("--keys must be positive");
        }

        let config = self.buffer_config()?;
        info!(
            capacity = config.capacity,
            interval = ?config.interval,
            requests = self.requests,
            keys = self.keys,
            "Starting stress test"
        );

        let cancel = CancellationToken::new();
        let table = Table { latency: Duration::from_millis(self.latency) };
        let buffer = Buffer::<Row, _>::try_spawn(&cancel, table, config)?;

        let started = Instant::now();
        let keys = {
            let mut rng = rand::rng();
            (0..self.requests).map(|_| rng.random_range(0..self.keys)).collect::<Vec<_>>()
        };
        let mut requests = keys
            .into_iter()
            .map(|key| {
                let buffer = buffer.clone();
                tokio::spawn(async move {
                    let submitted = Instant::now();
                    let row = buffer.submit(Row(key)).await;
                    (row, submitted.elapsed())
                })
            })
            .collect::<FuturesUnordered<_>>();

        let mut latencies = Vec::with_capacity(self.requests);
        let mut failed = 0usize;
        while let Some(joined) = requests.next().await {
            let (row, latency) = joined.wrap_err("request task failed")?;
            match row {
                Ok(Some(_)) => latencies.push(latency),
                _ => failed += 1,
            }
        }
        let elapsed = started.elapsed();

        let stats = buffer.stats();
        buffer.cancel();
        buffer.closed().await;

        latencies.sort();
        let percentile = |p: usize| {
            latencies.get(latencies.len().saturating_sub(1) * p / 100).copied().unwrap_or_default()
        };
        info!(
            cycles = stats.cycles,
            failed_cycles = stats.failed_cycles,
            avg_cycle_size = stats.dispatched as f64 / stats.cycles.max(1) as f64,
            failed,
            p50 = ?percentile(50),
            p99 = ?percentile(99),
            elapsed = ?elapsed,
            throughput = self.requests as f64 / elapsed.as_secs_f64(),
            "Stress test finished"
        );

        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = args.run().await {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

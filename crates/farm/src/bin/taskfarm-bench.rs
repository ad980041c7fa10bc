//! taskfarm-bench: throughput driver for the task farm.
//!
//! Starts a farm around an integer sum server, submits a batch of add jobs,
//! shuts down (gracefully or forced), then restarts and checks the stored
//! sum against the deltas whose results were actually delivered.
//!
//! # Usage
//!
//! ```bash
//! taskfarm-bench --workers 4 --jobs 100000
//!
//! # Forced shutdown right after submission
//! taskfarm-bench --workers 2 --force
//!
//! # Worker count from a config file, metrics as JSON
//! taskfarm-bench --config farm.toml --json
//! ```

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use taskfarm::{Farm, FarmConfig, FarmServer, ShutdownMode};

/// Throughput driver for the task farm.
#[derive(Parser, Debug)]
#[command(name = "taskfarm-bench", version, about)]
struct Cli {
    /// Number of workers (ignored when --config is given).
    #[arg(long, env = "TASKFARM_BENCH_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Number of add jobs to submit.
    #[arg(long, env = "TASKFARM_BENCH_JOBS", default_value_t = 10_000)]
    jobs: u64,

    /// Iterations of busy work per job.
    #[arg(long, env = "TASKFARM_BENCH_SPIN", default_value_t = 1_000)]
    spin: u64,

    /// Force shutdown instead of draining queued jobs.
    #[arg(long)]
    force: bool,

    /// TOML farm config; overrides --workers.
    #[arg(long, env = "TASKFARM_CONFIG")]
    config: Option<PathBuf>,

    /// Print the final metrics snapshot as JSON.
    #[arg(long)]
    json: bool,
}

enum SumRequest {
    Add(i64),
    Read,
}

/// Integer accumulator. Add jobs do some throwaway arithmetic so workers
/// actually contend for CPU.
struct SumServer {
    sum: Mutex<i64>,
    spin: u64,
}

#[async_trait]
impl FarmServer for SumServer {
    type Request = SumRequest;
    type Response = i64;

    async fn start(&self, _config: &FarmConfig, first_start: bool) -> anyhow::Result<()> {
        if first_start {
            *self.sum.lock().map_err(|_| anyhow::anyhow!("sum lock poisoned"))? = 0;
        }
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn work(&self, request: SumRequest) -> i64 {
        match request {
            SumRequest::Read => self.sum.lock().map(|s| *s).unwrap_or_default(),
            SumRequest::Add(delta) => {
                let checksum = spin(self.spin);
                if let Ok(mut sum) = self.sum.lock() {
                    *sum += delta;
                }
                checksum
            }
        }
    }
}

fn spin(iterations: u64) -> i64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..iterations {
        (a, b) = (b, a.wrapping_add(b));
    }
    std::hint::black_box(a) as i64
}

/// Deterministic delta in `1..=100` for job `i`.
fn delta(i: u64) -> i64 {
    (i.wrapping_mul(2_654_435_761) % 100) as i64 + 1
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting taskfarm-bench");

    let config = match &cli.config {
        Some(path) => FarmConfig::from_file(path)
            .with_context(|| format!("loading farm config from {}", path.display()))?,
        None => FarmConfig {
            name: "bench".into(),
            ..FarmConfig::with_workers(cli.workers)
        },
    };
    let mode = if cli.force {
        ShutdownMode::Force
    } else {
        ShutdownMode::Graceful
    };

    let farm: Farm<SumServer> = Farm::new();
    farm.init(SumServer {
        sum: Mutex::new(0),
        spin: cli.spin,
    })
    .await?;
    farm.start(&config).await?;

    let began = Instant::now();
    let mut handles = Vec::with_capacity(cli.jobs as usize);
    for i in 0..cli.jobs {
        let d = delta(i);
        handles.push((d, farm.submit(SumRequest::Add(d)).await?));
    }
    let submitted_in = began.elapsed();

    farm.shutdown(mode).await?;
    let elapsed = began.elapsed();

    let mut delivered_sum = 0i64;
    let mut delivered = 0u64;
    for (d, handle) in handles {
        if handle.await.is_ok() {
            delivered_sum += d;
            delivered += 1;
        }
    }

    farm.start(&config).await?;
    let stored_sum = farm.submit(SumRequest::Read).await?.await?;
    farm.shutdown(ShutdownMode::Graceful).await?;

    let throughput = delivered as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    tracing::info!(
        workers = config.num_workers,
        ?mode,
        jobs = cli.jobs,
        delivered,
        submit_ms = submitted_in.as_millis() as u64,
        total_ms = elapsed.as_millis() as u64,
        jobs_per_sec = throughput as u64,
        "bench finished"
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&farm.metrics())?);
    }

    anyhow::ensure!(
        stored_sum == delivered_sum,
        "stored sum {stored_sum} does not match delivered sum {delivered_sum}"
    );
    Ok(())
}

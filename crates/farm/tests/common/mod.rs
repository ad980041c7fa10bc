//! Integer sum server shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::Rng;
use taskfarm::{Farm, FarmConfig, FarmServer};

pub const WORKERS: usize = 4;

#[derive(Debug, Clone, Copy)]
pub enum SumRequest {
    Add(i64),
    Read,
}

/// Keeps a running total. `Add` returns the total after applying its delta.
#[derive(Default)]
pub struct SumServer {
    sum: Mutex<i64>,
    pub fail_start: AtomicBool,
    pub fail_shutdown: AtomicBool,
}

impl SumServer {
    pub fn failing(start: bool, shutdown: bool) -> Self {
        Self {
            fail_start: AtomicBool::new(start),
            fail_shutdown: AtomicBool::new(shutdown),
            ..Self::default()
        }
    }
}

#[async_trait]
impl FarmServer for SumServer {
    type Request = SumRequest;
    type Response = i64;

    async fn start(&self, _config: &FarmConfig, first_start: bool) -> anyhow::Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("sum server refused to start");
        }
        if first_start {
            *self.sum.lock().unwrap() = 0;
        }
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        if self.fail_shutdown.load(Ordering::SeqCst) {
            anyhow::bail!("sum server refused to shut down");
        }
        Ok(())
    }

    fn work(&self, request: SumRequest) -> i64 {
        match request {
            SumRequest::Read => *self.sum.lock().unwrap(),
            SumRequest::Add(delta) => {
                busy_work();
                let mut sum = self.sum.lock().unwrap();
                *sum += delta;
                *sum
            }
        }
    }
}

fn busy_work() {
    let n = rand::thread_rng().gen_range(100..2_000);
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        (a, b) = (b, a.wrapping_add(b));
    }
    std::hint::black_box(a);
}

pub fn random_deltas(count: usize) -> Vec<i64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen_range(1..=100)).collect()
}

/// A fresh farm with a sum server attached, plus a handle on the server.
pub async fn sum_farm(server: SumServer) -> (Farm<SumServer>, Arc<SumServer>) {
    let server = Arc::new(server);
    let farm = Farm::new();
    farm.init(Arc::clone(&server)).await.unwrap();
    (farm, server)
}

/// Start the farm, read the stored sum, shut down again.
pub async fn read_sum(farm: &Farm<SumServer>) -> i64 {
    farm.start(&FarmConfig::with_workers(WORKERS)).await.unwrap();
    let sum = farm.submit(SumRequest::Read).await.unwrap().await.unwrap();
    farm.shutdown(taskfarm::ShutdownMode::Graceful).await.unwrap();
    sum
}

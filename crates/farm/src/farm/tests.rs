use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::FarmConfig;
use crate::dispatcher::ShutdownMode;
use crate::error::FarmError;
use crate::farm::{Farm, FarmStatus};
use crate::traits::FarmServer;

/// Echo server whose hooks can be told to fail.
#[derive(Default)]
struct MockServer {
    fail_start: AtomicBool,
    fail_shutdown: AtomicBool,
    start_calls: AtomicU32,
    shutdown_calls: AtomicU32,
    first_start_flags: Mutex<Vec<bool>>,
}

#[async_trait]
impl FarmServer for MockServer {
    type Request = String;
    type Response = String;

    async fn start(&self, _config: &FarmConfig, first_start: bool) -> anyhow::Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.first_start_flags.lock().unwrap().push(first_start);
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("start refused");
        }
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown.load(Ordering::SeqCst) {
            anyhow::bail!("shutdown refused");
        }
        Ok(())
    }

    fn work(&self, request: String) -> String {
        request.to_uppercase()
    }
}

async fn initialized() -> (Farm<MockServer>, Arc<MockServer>) {
    let server = Arc::new(MockServer::default());
    let farm = Farm::new();
    farm.init(server.clone()).await.unwrap();
    (farm, server)
}

#[tokio::test]
async fn fresh_farm_is_uninitialized() {
    let farm: Farm<MockServer> = Farm::new();
    assert_eq!(farm.status().await, FarmStatus::Uninitialized);
    assert!(!farm.is_running().await);
}

#[tokio::test]
async fn start_before_init_fails() {
    let farm: Farm<MockServer> = Farm::new();
    let err = farm.start(&FarmConfig::with_workers(2)).await.unwrap_err();
    assert!(matches!(err, FarmError::NotInitialized));
}

#[tokio::test]
async fn double_init_rejected() {
    let (farm, _server) = initialized().await;
    let err = farm.init(MockServer::default()).await.unwrap_err();
    assert!(matches!(err, FarmError::AlreadyInitialized));
    assert_eq!(farm.status().await, FarmStatus::Initialized);
}

#[tokio::test]
async fn submit_before_start_is_not_running() {
    let (farm, _server) = initialized().await;
    let err = farm.submit("hi".into()).await.unwrap_err();
    assert!(matches!(err, FarmError::NotRunning));
}

#[tokio::test]
async fn shutdown_before_start_is_not_running() {
    let (farm, server) = initialized().await;
    let err = farm.shutdown(ShutdownMode::Graceful).await.unwrap_err();
    assert!(matches!(err, FarmError::NotRunning));
    assert_eq!(server.shutdown_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn submit_and_read_result() {
    let (farm, _server) = initialized().await;
    farm.start(&FarmConfig::with_workers(2)).await.unwrap();
    assert_eq!(farm.status().await, FarmStatus::Running);

    let handle = farm.submit("hello".into()).await.unwrap();
    assert_eq!(handle.await.unwrap(), "HELLO");

    farm.shutdown(ShutdownMode::Graceful).await.unwrap();
    assert_eq!(farm.status().await, FarmStatus::Initialized);

    let m = farm.metrics();
    assert_eq!(m.submitted, 1);
    assert_eq!(m.completed, 1);
    assert!(m.started_at.is_some());
}

#[tokio::test]
async fn double_start_leaves_first_run_alone() {
    let (farm, server) = initialized().await;
    farm.start(&FarmConfig::with_workers(2)).await.unwrap();

    let err = farm.start(&FarmConfig::with_workers(2)).await.unwrap_err();
    assert!(matches!(err, FarmError::AlreadyRunning));
    assert_eq!(server.start_calls.load(Ordering::SeqCst), 1);

    let handle = farm.submit("still up".into()).await.unwrap();
    assert_eq!(handle.await.unwrap(), "STILL UP");
    farm.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn invalid_config_is_rejected_before_start_hook() {
    let (farm, server) = initialized().await;
    let err = farm.start(&FarmConfig::with_workers(0)).await.unwrap_err();
    assert!(matches!(err, FarmError::Config(_)));
    assert_eq!(server.start_calls.load(Ordering::SeqCst), 0);
    assert_eq!(farm.status().await, FarmStatus::Initialized);
}

#[tokio::test]
async fn failed_start_is_clean_and_retryable() {
    let (farm, server) = initialized().await;
    server.fail_start.store(true, Ordering::SeqCst);

    let err = farm.start(&FarmConfig::with_workers(2)).await.unwrap_err();
    assert_eq!(err.to_string(), "start refused");
    assert!(matches!(farm.submit("x".into()).await, Err(FarmError::NotRunning)));

    server.fail_start.store(false, Ordering::SeqCst);
    farm.start(&FarmConfig::with_workers(2)).await.unwrap();
    // The failed attempt did not consume the first start.
    assert_eq!(*server.first_start_flags.lock().unwrap(), vec![true, true]);
    farm.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn failed_shutdown_keeps_farm_running() {
    let (farm, server) = initialized().await;
    farm.start(&FarmConfig::with_workers(2)).await.unwrap();
    server.fail_shutdown.store(true, Ordering::SeqCst);

    let err = farm.shutdown(ShutdownMode::Graceful).await.unwrap_err();
    assert!(matches!(err, FarmError::Hook(_)));
    assert!(farm.is_running().await);

    let handle = farm.submit("after".into()).await.unwrap();
    assert_eq!(handle.await.unwrap(), "AFTER");

    server.fail_shutdown.store(false, Ordering::SeqCst);
    farm.shutdown(ShutdownMode::Graceful).await.unwrap();
    assert!(!farm.is_running().await);
    assert_eq!(server.shutdown_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn restart_reports_not_first_start() {
    let (farm, server) = initialized().await;
    for _ in 0..3 {
        farm.start(&FarmConfig::with_workers(1)).await.unwrap();
        farm.shutdown(ShutdownMode::Force).await.unwrap();
    }
    assert_eq!(
        *server.first_start_flags.lock().unwrap(),
        vec![true, false, false]
    );
}

#[tokio::test]
async fn reset_returns_to_uninitialized() {
    let (farm, server) = initialized().await;
    farm.start(&FarmConfig::with_workers(2)).await.unwrap();
    farm.submit("a".into()).await.unwrap().await.unwrap();

    farm.reset().await;
    assert_eq!(farm.status().await, FarmStatus::Uninitialized);
    assert_eq!(farm.metrics().submitted, 0);
    // Reset bypasses the shutdown hook.
    assert_eq!(server.shutdown_calls.load(Ordering::SeqCst), 0);

    // Init is allowed again and the next start counts as first.
    let fresh = Arc::new(MockServer::default());
    farm.init(fresh.clone()).await.unwrap();
    farm.start(&FarmConfig::with_workers(1)).await.unwrap();
    assert_eq!(*fresh.first_start_flags.lock().unwrap(), vec![true]);
    farm.shutdown(ShutdownMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn concurrent_submitters_all_get_results() {
    let (farm, _server) = initialized().await;
    let farm = Arc::new(farm);
    farm.start(&FarmConfig::with_workers(4)).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let farm = Arc::clone(&farm);
        tasks.push(tokio::spawn(async move {
            let mut out = Vec::new();
            for j in 0..25 {
                let handle = farm.submit(format!("t{i}-{j}")).await.unwrap();
                out.push(handle);
            }
            let mut results = Vec::new();
            for handle in out {
                results.push(handle.await.unwrap());
            }
            results
        }));
    }

    let mut total = 0;
    for (i, task) in tasks.into_iter().enumerate() {
        let results = task.await.unwrap();
        assert_eq!(results[0], format!("T{i}-0"));
        total += results.len();
    }
    assert_eq!(total, 400);

    farm.shutdown(ShutdownMode::Graceful).await.unwrap();
    assert_eq!(farm.metrics().completed, 400);
}

#[tokio::test]
async fn failed_handoff_is_not_counted_as_submitted() {
    let (farm, _server) = initialized().await;
    farm.start(&FarmConfig::with_workers(2)).await.unwrap();
    farm.submit("one".into()).await.unwrap().await.unwrap();

    {
        let state = farm.state.read().await;
        state.pool.as_ref().unwrap().abort_dispatcher();
    }
    let err = farm.submit("lost".into()).await.unwrap_err();
    assert!(matches!(err, FarmError::NotRunning));
    assert_eq!(farm.metrics().submitted, 1);

    farm.reset().await;
}

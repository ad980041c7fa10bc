use async_trait::async_trait;

use crate::config::FarmConfig;

/// The work logic an embedder plugs into a [`Farm`](crate::Farm).
///
/// The farm owns lifecycle and dispatch; implementors own what a request
/// means. `work` is called from several workers at once, so any shared state
/// behind it must be synchronized by the implementor.
#[async_trait]
pub trait FarmServer: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Called once per farm start, before any worker exists.
    ///
    /// `first_start` is true only on the first start since the farm was
    /// initialized (or last reset). An error aborts the start.
    async fn start(&self, config: &FarmConfig, first_start: bool) -> anyhow::Result<()>;

    /// Called once per shutdown attempt, before workers are torn down.
    /// An error aborts the shutdown and leaves the farm running.
    async fn shutdown(&self) -> anyhow::Result<()>;

    /// Execute one job. Runs synchronously on a worker's blocking thread.
    ///
    /// There is no error channel: failures belong inside `Response`.
    fn work(&self, request: Self::Request) -> Self::Response;
}

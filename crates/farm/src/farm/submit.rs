use crate::error::FarmError;
use crate::job::{Job, ResultHandle};
use crate::traits::FarmServer;

use super::Farm;

impl<S: FarmServer> Farm<S> {
    /// Queue a request and get a handle to its eventual response.
    ///
    /// Returns once the dispatch loop has taken the job into its queue, so a
    /// saturated dispatcher slows submitters down. Awaiting the returned
    /// handle waits for execution.
    pub async fn submit(&self, request: S::Request) -> Result<ResultHandle<S::Response>, FarmError> {
        let state = self.state.read().await;
        let pool = state.pool.as_ref().ok_or(FarmError::NotRunning)?;

        let (job, handle) = Job::new(self.metrics.next_seq(), request);
        pool.hand_off(job).await?;
        self.metrics.record_submitted();
        Ok(handle)
    }
}

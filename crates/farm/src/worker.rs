//! Worker lifecycle.
//!
//! A worker is driven purely by its private inbox: it blocks for a job, runs
//! the server's `work` callback, writes the response into the job's result
//! slot, then reports itself free to the dispatch loop. A closed inbox is the
//! terminate signal. Workers never look at the dispatcher's queues.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::job::JobFor;
use crate::metrics::FarmMetrics;
use crate::traits::FarmServer;

/// Ordinal index of a worker within one run of a farm.
pub(crate) type WorkerId = usize;

pub(crate) struct Worker<S: FarmServer> {
    pub(crate) id: WorkerId,
    pub(crate) farm: Arc<str>,
    pub(crate) inbox: mpsc::Receiver<JobFor<S>>,
    pub(crate) server: Arc<S>,
    pub(crate) freed: mpsc::UnboundedSender<WorkerId>,
    pub(crate) metrics: Arc<FarmMetrics>,
}

impl<S: FarmServer> Worker<S> {
    /// Run the worker on its own OS thread for the lifetime of the pool.
    /// The thread exits once the inbox is closed and the last job has finished.
    pub(crate) fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("{}-worker-{}", self.farm, self.id))
            .spawn(move || self.run())
    }

    fn run(mut self) {
        debug!(farm = %self.farm, worker = self.id, "worker started");

        while let Some(job) = self.inbox.blocking_recv() {
            self.execute(job);
            // The dispatch loop is gone after a forced shutdown; the inbox
            // closing ends this loop, so a failed notification is fine.
            let _ = self.freed.send(self.id);
        }

        debug!(farm = %self.farm, worker = self.id, "worker terminated");
    }

    fn execute(&self, job: JobFor<S>) {
        let seq = job.seq;
        let slot = job.slot;
        let request = job.request;

        match catch_unwind(AssertUnwindSafe(|| self.server.work(request))) {
            Ok(response) => {
                // A submitter that dropped its handle simply never reads this.
                let _ = slot.send(response);
                self.metrics.record_completed();
            }
            Err(_) => {
                error!(
                    farm = %self.farm,
                    worker = self.id,
                    job = seq,
                    "work callback panicked, closing result slot"
                );
                drop(slot);
                self.metrics.record_interrupted(1);
            }
        }
    }
}

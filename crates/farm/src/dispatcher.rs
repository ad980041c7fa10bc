//! The dispatch loop: sole owner of the pending-job queue and free-worker list.
//!
//! Every mutation of those two queues happens inside [`Dispatcher::run`],
//! which is reachable only through channels, so neither needs a lock. The
//! loop waits on three sources (a submitted job, a worker reporting free, a
//! shutdown signal), then runs one FIFO/FIFO matching round and re-checks
//! whether it may terminate.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::FarmError;
use crate::job::JobFor;
use crate::metrics::FarmMetrics;
use crate::traits::FarmServer;
use crate::worker::{Worker, WorkerId};

/// Depth of the submission channel. Submitters also wait for an explicit
/// acceptance, so this only smooths the handoff.
const SUBMISSION_BUFFER: usize = 1;

/// How a running farm is brought down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Drain every pending job, then stop.
    Graceful,
    /// Stop now. Jobs not yet handed to a worker are closed without a value;
    /// jobs already executing run to completion.
    Force,
}

/// A job on its way into the dispatch loop, with the acknowledgement the
/// submitter waits on.
pub(crate) struct Submission<S: FarmServer> {
    job: JobFor<S>,
    accepted: oneshot::Sender<()>,
}

// ── PoolHandle ───────────────────────────────────────────────────────

/// Owning side of one running farm: the dispatch task, its workers, and the
/// channels used to reach them.
pub(crate) struct PoolHandle<S: FarmServer> {
    name: Arc<str>,
    submissions: mpsc::Sender<Submission<S>>,
    shutdown: oneshot::Sender<ShutdownMode>,
    dispatcher: JoinHandle<()>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl<S: FarmServer> PoolHandle<S> {
    /// Spawn `num_workers` worker threads plus the dispatch loop.
    ///
    /// Must be called from within a tokio runtime. If a worker thread cannot
    /// be created, the ones already running see their inbox close and exit.
    pub(crate) fn launch(
        name: &str,
        num_workers: usize,
        server: Arc<S>,
        metrics: Arc<FarmMetrics>,
    ) -> Result<Self, FarmError> {
        let name: Arc<str> = Arc::from(name);
        let (freed_tx, freed_rx) = mpsc::unbounded_channel();

        let mut inboxes = Vec::with_capacity(num_workers);
        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            // A worker is only handed a job while free, so one slot is enough.
            let (inbox_tx, inbox_rx) = mpsc::channel(1);
            inboxes.push(inbox_tx);
            let worker = Worker {
                id,
                farm: name.clone(),
                inbox: inbox_rx,
                server: Arc::clone(&server),
                freed: freed_tx.clone(),
                metrics: Arc::clone(&metrics),
            };
            let handle = worker.spawn().map_err(|e| {
                warn!(farm = %name, worker = id, error = %e, "failed to spawn worker thread");
                FarmError::WorkerSpawn(e)
            })?;
            workers.push(handle);
        }
        drop(freed_tx);

        let (submissions_tx, submissions_rx) = mpsc::channel(SUBMISSION_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let dispatcher = Dispatcher {
            farm: name.clone(),
            submissions: submissions_rx,
            freed: freed_rx,
            shutdown: shutdown_rx,
            free: (0..num_workers).collect(),
            inboxes,
            pending: VecDeque::new(),
            lost: 0,
            mode: None,
            metrics,
        };

        Ok(Self {
            name,
            submissions: submissions_tx,
            shutdown: shutdown_tx,
            dispatcher: tokio::spawn(dispatcher.run()),
            workers,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Kill the dispatch task without a shutdown signal.
    #[cfg(test)]
    pub(crate) fn abort_dispatcher(&self) {
        self.dispatcher.abort();
    }

    /// Hand a job to the dispatch loop and wait until it sits in the pending queue.
    pub(crate) async fn hand_off(&self, job: JobFor<S>) -> Result<(), FarmError> {
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let submission = Submission {
            job,
            accepted: accepted_tx,
        };
        self.submissions
            .send(submission)
            .await
            .map_err(|_| FarmError::NotRunning)?;
        accepted_rx.await.map_err(|_| FarmError::NotRunning)
    }

    /// Signal the dispatch loop and wait for it and every worker to finish.
    pub(crate) async fn stop(self, mode: ShutdownMode) {
        let Self {
            name,
            submissions,
            shutdown,
            dispatcher,
            workers,
        } = self;

        // An error means the loop already exited on its own; joining below is
        // still correct.
        let _ = shutdown.send(mode);
        drop(submissions);

        if let Err(e) = dispatcher.await {
            warn!(farm = %name, error = %e, "dispatch loop exited abnormally");
        }

        // The dispatch loop has dropped every inbox, so each worker is at most
        // one job away from exiting. Join them off the async executor.
        let joined = tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .enumerate()
                .filter_map(|(id, worker)| worker.join().err().map(|_| id))
                .collect::<Vec<WorkerId>>()
        })
        .await;
        match joined {
            Ok(panicked) => {
                for id in panicked {
                    warn!(farm = %name, worker = id, "worker exited abnormally");
                }
            }
            Err(e) => warn!(farm = %name, error = %e, "joining worker threads failed"),
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

pub(crate) struct Dispatcher<S: FarmServer> {
    farm: Arc<str>,
    submissions: mpsc::Receiver<Submission<S>>,
    freed: mpsc::UnboundedReceiver<WorkerId>,
    shutdown: oneshot::Receiver<ShutdownMode>,
    /// Worker inboxes indexed by [`WorkerId`]. Clearing this closes them all.
    inboxes: Vec<mpsc::Sender<JobFor<S>>>,
    /// Jobs accepted but not yet handed out, earliest first.
    pending: VecDeque<JobFor<S>>,
    /// Free workers, earliest freed first.
    free: VecDeque<WorkerId>,
    /// Workers whose inbox closed underneath us.
    lost: usize,
    mode: Option<ShutdownMode>,
    metrics: Arc<FarmMetrics>,
}

impl<S: FarmServer> Dispatcher<S> {
    pub(crate) async fn run(mut self) {
        debug!(farm = %self.farm, workers = self.inboxes.len(), "dispatch loop started");

        loop {
            tokio::select! {
                Some(submission) = self.submissions.recv() => self.accept(submission),
                Some(id) = self.freed.recv() => self.free.push_back(id),
                mode = &mut self.shutdown, if self.mode.is_none() => {
                    // A dropped sender means the owning farm went away.
                    self.begin_shutdown(mode.unwrap_or(ShutdownMode::Force));
                }
                else => self.begin_shutdown(ShutdownMode::Force),
            }

            if self.mode != Some(ShutdownMode::Force) {
                self.distribute();
            }

            if self.should_terminate() {
                self.terminate();
                break;
            }
        }
    }

    fn accept(&mut self, submission: Submission<S>) {
        self.pending.push_back(submission.job);
        // The submitter may have given up waiting; the job stays queued regardless.
        let _ = submission.accepted.send(());
    }

    fn begin_shutdown(&mut self, mode: ShutdownMode) {
        // Submitters are locked out while shutdown runs; anything still
        // buffered was handed off before the signal and belongs in the queue.
        while let Ok(submission) = self.submissions.try_recv() {
            self.accept(submission);
        }
        info!(
            farm = %self.farm,
            ?mode,
            pending = self.pending.len(),
            "dispatch loop shutting down"
        );
        self.mode = Some(match (self.mode, mode) {
            (Some(ShutdownMode::Force), _) => ShutdownMode::Force,
            (_, requested) => requested,
        });
    }

    /// Pair the first `k` pending jobs with the first `k` free workers.
    fn distribute(&mut self) {
        let assignments = self.pending.len().min(self.free.len());
        for _ in 0..assignments {
            let (Some(job), Some(id)) = (self.pending.pop_front(), self.free.pop_front()) else {
                break;
            };
            debug!(farm = %self.farm, job = job.seq, worker = id, "dispatching job");

            match self.inboxes[id].try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    // A free worker's inbox is empty; keep the job and the worker.
                    error!(farm = %self.farm, worker = id, "free worker had a full inbox");
                    self.pending.push_front(job);
                    self.free.push_back(id);
                    break;
                }
                Err(TrySendError::Closed(job)) => {
                    error!(farm = %self.farm, worker = id, "worker inbox closed, retiring worker");
                    self.pending.push_front(job);
                    self.lost += 1;
                }
            }
        }
    }

    fn should_terminate(&self) -> bool {
        match self.mode {
            Some(ShutdownMode::Force) => true,
            Some(ShutdownMode::Graceful) => {
                self.pending.is_empty() && self.free.len() + self.lost == self.inboxes.len()
            }
            None => false,
        }
    }

    fn terminate(&mut self) {
        // Workers finish whatever they hold, then see their inbox closed.
        self.inboxes.clear();

        let interrupted = if self.mode == Some(ShutdownMode::Force) {
            let n = self.pending.len();
            // Dropping a job closes its result slot without a value.
            self.pending.clear();
            n
        } else {
            0
        };
        self.metrics.record_interrupted(interrupted as u64);
        self.free.clear();
        self.lost = 0;

        info!(farm = %self.farm, interrupted, "dispatch loop stopped");
    }
}

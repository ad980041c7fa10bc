//! Jobs and their one-shot result slots.
//!
//! A [`Job`] travels submitter → dispatcher → worker and is consumed exactly
//! once. The submitter keeps the matching [`ResultHandle`], which resolves to
//! the worker's response, or to [`FarmError::Interrupted`] when the slot is
//! closed without a value (forced shutdown discarded the job).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::FarmError;
use crate::traits::FarmServer;

/// Job type carried by a farm running server `S`.
pub(crate) type JobFor<S> = Job<<S as FarmServer>::Request, <S as FarmServer>::Response>;

/// One unit of work in flight: a request plus the write side of its result slot.
pub(crate) struct Job<Req, Resp> {
    /// Submission sequence number, for log correlation.
    pub(crate) seq: u64,
    pub(crate) request: Req,
    pub(crate) slot: oneshot::Sender<Resp>,
}

impl<Req, Resp> Job<Req, Resp> {
    /// Build a job and the handle its submitter will read from.
    pub(crate) fn new(seq: u64, request: Req) -> (Self, ResultHandle<Resp>) {
        let (slot, rx) = oneshot::channel();
        (Self { seq, request, slot }, ResultHandle { rx })
    }
}

/// Read side of a job's result slot, returned by [`Farm::submit`](crate::Farm::submit).
///
/// Awaiting the handle yields the response, or [`FarmError::Interrupted`]
/// if the job was abandoned by a forced shutdown and never executed.
#[derive(Debug)]
pub struct ResultHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> ResultHandle<T> {
    /// Check the slot without waiting.
    ///
    /// `Ok(None)` means no value yet; `Err(Interrupted)` means none will come.
    pub fn try_recv(&mut self) -> Result<Option<T>, FarmError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(FarmError::Interrupted),
        }
    }

    /// Block the current thread until the slot resolves.
    ///
    /// For synchronous callers only; panics if called from within an async
    /// execution context.
    pub fn blocking_recv(self) -> Result<T, FarmError> {
        self.rx.blocking_recv().map_err(|_| FarmError::Interrupted)
    }
}

impl<T> Future for ResultHandle<T> {
    type Output = Result<T, FarmError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| FarmError::Interrupted))
    }
}

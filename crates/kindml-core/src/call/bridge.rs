//! Dual-delivery of asynchronous results.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;

use super::Callback;
use crate::error::{Error, Result};

/// Runs an operation once and delivers its outcome both ways.
///
/// The outcome goes to the optional callback and to the returned
/// [`Pending`]. Callers may use either, both or neither; the operation runs
/// to completion regardless.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackBridge;

impl CallbackBridge {
    /// Starts `producer` and returns a future for its outcome.
    ///
    /// Inside a tokio runtime the producer is spawned immediately, so it
    /// makes progress even if the returned future is dropped. Outside a
    /// runtime it is deferred until the returned future is first polled.
    ///
    /// The callback, when present, is invoked exactly once with the outcome
    /// before the future resolves. Failures reach both consumers as the same
    /// error value.
    pub fn run<T, F>(producer: F, callback: Option<Callback<T>>) -> Pending<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let task = deliver(producer, callback);

        match Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = oneshot::channel();
                handle.spawn(async move {
                    let outcome = task.await;
                    // receiver gone means nobody awaits; the callback already ran
                    let _ = tx.send(outcome);
                });
                Pending {
                    inner: PendingInner::Spawned(rx),
                }
            }
            Err(_) => {
                debug!("No tokio runtime; deferring operation until awaited");
                Pending {
                    inner: PendingInner::Deferred(task.boxed()),
                }
            }
        }
    }

    /// Delivers an already-known outcome through the same two paths.
    pub fn ready<T>(outcome: Result<T>, callback: Option<Callback<T>>) -> Pending<T>
    where
        T: Send + 'static,
    {
        if let Some(callback) = callback {
            callback(outcome.as_ref());
        }
        Pending {
            inner: PendingInner::Done(Some(outcome)),
        }
    }
}

async fn deliver<T, F>(producer: F, callback: Option<Callback<T>>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let outcome = producer.await;
    if let Some(callback) = callback {
        callback(outcome.as_ref());
    }
    outcome
}

/// The awaitable half of a [`CallbackBridge`] call.
#[must_use = "the operation runs regardless, but its outcome is lost unless awaited"]
pub struct Pending<T> {
    inner: PendingInner<T>,
}

enum PendingInner<T> {
    Spawned(oneshot::Receiver<Result<T>>),
    Deferred(BoxFuture<'static, Result<T>>),
    Done(Option<Result<T>>),
}

// The outcome is only ever moved out, never pinned.
impl<T> Unpin for Pending<T> {}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            PendingInner::Spawned(rx) => rx
                .poll_unpin(cx)
                .map(|received| received.unwrap_or(Err(Error::Abandoned))),
            PendingInner::Deferred(task) => task.poll_unpin(cx),
            PendingInner::Done(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(Err(Error::Abandoned)))
            }
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner {
            PendingInner::Spawned(_) => "spawned",
            PendingInner::Deferred(_) => "deferred",
            PendingInner::Done(_) => "done",
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}

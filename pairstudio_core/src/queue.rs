//! Strictly serialized execution of asynchronous actions.
//!
//! An [`ActionQueue`] owns its state inside a background task. Callers push
//! operations through an unbounded channel and get a future that settles
//! when their operation has run to completion, so actions never overlap and
//! complete in exactly the order they were enqueued.

use std::{fmt, future::Future};

use futures_util::future::BoxFuture;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

type Operation<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send>;

struct Entry<S> {
    label: String,
    run: Operation<S>,
}

// Pins down the higher-ranked signature; closures handed to `Box::new`
// directly are not inferred as `for<'a>`.
fn operation<S, F>(f: F) -> Operation<S>
where
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("{0} was discarded before it could finish")]
    Discarded(String),
}

/// What the drain task is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueStatus {
    /// No state attached yet; entries are held back.
    Pending,
    Idle,
    /// Label of the entry being run.
    Running(String),
}

pub struct ActionQueue<S> {
    tx: mpsc::UnboundedSender<Entry<S>>,
    slot: Option<oneshot::Sender<S>>,
    status: watch::Receiver<QueueStatus>,
    task: JoinHandle<()>,
}

impl<S: Send + 'static> ActionQueue<S> {
    /// Spawns the drain task. Must be called from within a tokio runtime.
    ///
    /// Entries may be enqueued right away; none runs until [`attach`](Self::attach).
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (slot, state) = oneshot::channel();
        let (status_tx, status) = watch::channel(QueueStatus::Pending);
        let task = tokio::spawn(drain(state, rx, status_tx));
        Self {
            tx,
            slot: Some(slot),
            status,
            task,
        }
    }

    pub fn with_state(state: S) -> Self {
        let mut queue = Self::new();
        // the slot is fresh and the task has not had a chance to exit
        let _ = queue.attach(state);
        queue
    }

    /// Hands the state to the drain task. Gives it back if one was already attached.
    pub fn attach(&mut self, state: S) -> Result<(), S> {
        match self.slot.take() {
            Some(slot) => slot.send(state),
            None => Err(state),
        }
    }

    /// Appends `op` and returns a future for its result.
    ///
    /// The entry is queued immediately, not when the returned future is first
    /// polled. A failed operation is logged and does not stop later entries.
    pub fn enqueue<T, E, F, L>(
        &self,
        label: L,
        op: F,
    ) -> impl Future<Output = Result<T, E>> + Send + use<S, T, E, F, L>
    where
        L: Into<String>,
        T: Send + 'static,
        E: From<QueueError> + fmt::Display + Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T, E>> + Send + 'static,
    {
        let label = label.into();
        let (done_tx, done_rx) = oneshot::channel();
        let action = label.clone();
        let run = operation(move |state: &mut S| {
            Box::pin(async move {
                let result = op(state).await;
                if let Err(err) = &result {
                    warn!(%action, error = %err, "action failed");
                }
                // the caller may have stopped waiting
                let _ = done_tx.send(result);
            })
        });
        let accepted = self
            .tx
            .send(Entry {
                label: label.clone(),
                run,
            })
            .is_ok();

        async move {
            if !accepted {
                return Err(QueueError::Discarded(label).into());
            }
            done_rx
                .await
                .unwrap_or_else(|_| Err(QueueError::Discarded(label).into()))
        }
    }
}

impl<S: Send + 'static> Default for ActionQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ActionQueue<S> {
    pub fn status(&self) -> QueueStatus {
        self.status.borrow().clone()
    }

    /// Resolves once state is attached. Errors if the queue is torn down first.
    pub fn ready(&self) -> impl Future<Output = Result<(), QueueError>> + Send + use<S> {
        let mut status = self.status.clone();
        async move {
            status
                .wait_for(|s| *s != QueueStatus::Pending)
                .await
                .map(|_| ())
                .map_err(|_| QueueError::Discarded("ready".to_string()))
        }
    }
}

impl<S> fmt::Debug for ActionQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<S> Drop for ActionQueue<S> {
    /// Stops the drain task. Everything still queued resolves as discarded.
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drain<S>(
    state: oneshot::Receiver<S>,
    mut rx: mpsc::UnboundedReceiver<Entry<S>>,
    status: watch::Sender<QueueStatus>,
) {
    let Ok(mut state) = state.await else {
        return;
    };
    status.send_replace(QueueStatus::Idle);

    while let Some(entry) = rx.recv().await {
        debug!(action = %entry.label, "running");
        status.send_replace(QueueStatus::Running(entry.label));
        (entry.run)(&mut state).await;
        status.send_replace(QueueStatus::Idle);
    }
}

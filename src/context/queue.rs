//! Commit queue.
//!
//! Post-action local models wait here until the context applies them. Every
//! queued or in-flight commit is counted in `outstanding` so that `settle` can
//! tell when there is nothing left to wait for.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::paths::{LocalModel, PathMap};
use crate::router::MountedChain;

use super::action::Provenance;

/// Sockets a deferred commit is checked against when it lands.
#[derive(Debug, Clone)]
pub(crate) struct ShapeCheck {
    pub(crate) sockets: Vec<String>,
}

/// A post-action local model waiting to be written back.
pub(crate) struct PendingCommit<R> {
    pub(crate) paths: PathMap,
    pub(crate) model: LocalModel,
    pub(crate) provenance: Provenance,
    /// Chain swapped into the mounted slot together with the state write.
    pub(crate) mount: Option<Arc<MountedChain<R>>>,
    pub(crate) check: Option<ShapeCheck>,
}

struct Queued<R> {
    generation: u64,
    commit: PendingCommit<R>,
}

/// No tokio runtime was available to drive a deferred effect.
#[derive(Debug)]
pub(crate) struct NoRuntime;

pub(crate) struct CommitQueue<R> {
    sender: mpsc::UnboundedSender<Queued<R>>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<Queued<R>>>,
    outstanding: Arc<AtomicUsize>,
    /// Bumped on clear; commits from an older generation are discarded.
    generation: Arc<AtomicU64>,
}

impl<R: Send + Sync + 'static> CommitQueue<R> {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: AsyncMutex::new(receiver),
            outstanding: Arc::new(AtomicUsize::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn push(&self, commit: PendingCommit<R>) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let queued = Queued {
            generation: self.generation.load(Ordering::SeqCst),
            commit,
        };
        // The receiver lives as long as the queue, so the channel is open.
        let _ = self.sender.send(queued);
    }

    /// Spawn `future` on the current runtime; its commit is queued when it
    /// resolves.
    pub(crate) fn defer<F>(&self, future: F) -> Result<(), NoRuntime>
    where
        F: Future<Output = PendingCommit<R>> + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| NoRuntime)?;
        let generation = self.generation.load(Ordering::SeqCst);
        let sender = self.sender.clone();

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        handle.spawn(async move {
            let commit = future.await;
            let _ = sender.send(Queued { generation, commit });
        });
        Ok(())
    }

    /// Next ready commit without waiting. `None` when nothing is ready or an
    /// async drain currently owns the receiver.
    pub(crate) fn try_next(&self) -> Option<PendingCommit<R>> {
        loop {
            let queued = {
                let mut receiver = self.receiver.try_lock().ok()?;
                receiver.try_recv().ok()?
            };
            if let Some(commit) = self.accept(queued) {
                return Some(commit);
            }
        }
    }

    /// Wait for the next commit. `None` once nothing is outstanding.
    pub(crate) async fn next(&self) -> Option<PendingCommit<R>> {
        while self.outstanding() > 0 {
            let queued = {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await?
            };
            if let Some(commit) = self.accept(queued) {
                return Some(commit);
            }
        }
        None
    }

    fn accept(&self, queued: Queued<R>) -> Option<PendingCommit<R>> {
        if queued.generation != self.generation.load(Ordering::SeqCst) {
            return None;
        }
        let _ = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        Some(queued.commit)
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Forget everything queued or in flight. Deferred effects still running
    /// will resolve, but their commits are discarded.
    pub(crate) fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut receiver) = self.receiver.try_lock() {
            while receiver.try_recv().is_ok() {}
        }
        self.outstanding.store(0, Ordering::SeqCst);
    }
}

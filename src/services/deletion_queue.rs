//! Deferred removal of file payloads.
//!
//! Catalog deletes drop metadata immediately and hand the payload path to this
//! queue. A single worker task removes files in the order they were scheduled.
//! Removal is best-effort: it happens before a graceful shutdown completes
//! (see `flush`), but anything still queued when the process crashes is lost.
//!
//! A path is only removed if it is still pending when the worker reaches it.
//! Writers that are about to reuse a path call `cancel` first, so a stale
//! removal never takes out the new payload.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    fs,
    sync::{Mutex, mpsc, oneshot},
};
use tracing::{debug, warn};

enum Job {
    Remove { path: PathBuf, ticket: u64 },
    Flush(oneshot::Sender<()>),
}

/// Latest ticket per scheduled path. The worker holds this lock while it
/// removes a file, so `cancel` returns only after any in-flight removal.
type Pending = Arc<Mutex<HashMap<PathBuf, u64>>>;

#[derive(Clone)]
pub struct DeletionQueue {
    tx: mpsc::UnboundedSender<Job>,
    pending: Pending,
    tickets: Arc<AtomicU64>,
}

impl DeletionQueue {
    /// Start the worker on the current tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Pending::default();
        tokio::spawn(run_worker(rx, Arc::clone(&pending)));
        Self {
            tx,
            pending,
            tickets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue `path` for removal. Never fails the caller.
    pub async fn schedule(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().await.insert(path.clone(), ticket);
        debug!("scheduled deletion of {}", path.display());
        if self.tx.send(Job::Remove { path, ticket }).is_err() {
            warn!("deletion worker stopped; payload left on disk");
        }
    }

    /// Drop any pending removal of `path`. Returns true if one was pending.
    pub async fn cancel(&self, path: &Path) -> bool {
        let cancelled = self.pending.lock().await.remove(path).is_some();
        if cancelled {
            debug!("cancelled pending deletion of {}", path.display());
        }
        cancelled
    }

    /// Resolve once every removal queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Job>, pending: Pending) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Remove { path, ticket } => {
                let mut pending = pending.lock().await;
                if pending.get(&path) != Some(&ticket) {
                    debug!("skipping superseded deletion of {}", path.display());
                    continue;
                }
                pending.remove(&path);
                remove_payload(&path).await;
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn remove_payload(path: &Path) {
    match fs::remove_file(path).await {
        Ok(_) => debug!("removed physical file {}", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("file {} already missing", path.display());
        }
        Err(err) => warn!("failed to remove {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn scheduled_files_are_gone_after_flush() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<_> = (0..5).map(|i| dir.path().join(format!("f{i}"))).collect();
        for path in &paths {
            std::fs::write(path, b"payload").unwrap();
        }

        let queue = DeletionQueue::spawn();
        for path in &paths {
            queue.schedule(path).await;
        }
        queue.flush().await;

        assert!(paths.iter().all(|p| !p.exists()));
        assert!(queue.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_file_does_not_stop_the_worker() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::write(&real, b"x").unwrap();

        let queue = DeletionQueue::spawn();
        queue.schedule(dir.path().join("never-existed")).await;
        queue.schedule(&real).await;
        queue.flush().await;

        assert!(!real.exists());
    }

    #[tokio::test]
    async fn cancelled_removal_leaves_the_file() {
        let dir = TempDir::new().unwrap();
        let kept = dir.path().join("kept");
        std::fs::write(&kept, b"new payload").unwrap();

        let queue = DeletionQueue::spawn();
        queue.schedule(&kept).await;
        queue.cancel(&kept).await;
        queue.flush().await;

        assert_eq!(std::fs::read(&kept).unwrap(), b"new payload");
        assert!(!queue.cancel(&kept).await);
    }

    #[tokio::test]
    async fn rescheduling_after_cancel_removes_again() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let queue = DeletionQueue::spawn();
        queue.schedule(&path).await;
        queue.cancel(&path).await;
        queue.schedule(&path).await;
        queue.flush().await;

        assert!(!path.exists());
    }
}

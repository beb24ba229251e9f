//! Concurrency limits for job execution and temp-file cleanup.
//!
//! Two independently sized limits:
//!
//! - [`JobSlots`] bounds how many external processes run at once. A job
//!   holds its permit from spawn until the process is reaped, and its
//!   timeout only starts counting once the permit is held.
//! - [`CleanupPool`] bounds concurrent file removals. It never shares
//!   capacity with running jobs, so temp files are reclaimed promptly even
//!   when every job slot is busy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;

/// Bounded set of slots for concurrently running jobs.
#[derive(Debug, Clone)]
pub struct JobSlots {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held job slot. The slot is released when this is dropped.
#[derive(Debug)]
pub struct JobPermit {
    _permit: OwnedSemaphorePermit,
    queued: Duration,
}

impl JobPermit {
    /// Time spent waiting for the slot.
    pub fn queued(&self) -> Duration {
        self.queued
    }
}

impl JobSlots {
    /// Create a limiter with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> vm_core::Result<JobPermit> {
        let started = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| vm_core::Error::Internal("job slots closed".into()))?;
        Ok(JobPermit {
            _permit: permit,
            queued: started.elapsed(),
        })
    }
}

/// Small bounded executor for best-effort temp-file removal.
#[derive(Debug, Clone)]
pub struct CleanupPool {
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl CleanupPool {
    /// Create a pool that removes files with at most `workers` concurrent tasks.
    pub fn new(workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Schedule removal of `paths` in the background.
    ///
    /// Missing files are ignored. Other failures are logged and dropped;
    /// nothing is retried. Must be called from within a tokio runtime.
    pub fn schedule_removal(&self, paths: Vec<PathBuf>) {
        let semaphore = self.semaphore.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            for path in paths {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => tracing::debug!("Removed temp file {}", path.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!("Error cleaning up temp file {}: {e}", path.display());
                    }
                }
            }
        });
    }

    /// Number of cleanup tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for all scheduled cleanups to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_clamped() {
        let slots = JobSlots::new(0);
        assert_eq!(slots.capacity(), 1);
        assert_eq!(slots.available(), 1);
    }

    #[tokio::test]
    async fn permits_are_released_on_drop() {
        let slots = JobSlots::new(2);
        let a = slots.acquire().await.unwrap();
        let b = slots.acquire().await.unwrap();
        assert_eq!(slots.in_use(), 2);
        assert_eq!(slots.available(), 0);
        drop(a);
        assert_eq!(slots.available(), 1);
        drop(b);
        assert_eq!(slots.in_use(), 0);
    }

    #[tokio::test]
    async fn acquire_waits_for_a_free_slot() {
        let slots = JobSlots::new(1);
        let held = slots.acquire().await.unwrap();

        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move { slots.acquire().await.unwrap().queued() })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());
        drop(held);

        let queued = waiter.await.unwrap();
        assert!(queued >= Duration::from_millis(100), "queued {queued:?}");
    }

    #[tokio::test]
    async fn cleanup_removes_files_and_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("input_a.mp4");
        let b = dir.path().join("output_a.mp4");
        std::fs::write(&a, b"in").unwrap();

        let pool = CleanupPool::new(2);
        pool.schedule_removal(vec![a.clone(), b.clone()]);
        pool.shutdown().await;

        assert!(!a.exists());
        assert!(!b.exists());
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn cleanup_is_not_blocked_by_held_job_slots() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input_b.mp4");
        std::fs::write(&file, b"in").unwrap();

        let slots = JobSlots::new(1);
        let _busy = slots.acquire().await.unwrap();

        let pool = CleanupPool::new(1);
        pool.schedule_removal(vec![file.clone()]);
        tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
            .await
            .expect("cleanup should not wait for job slots");
        assert!(!file.exists());
    }
}

use crate::services::temp_store::{StagingEntry, StagingError, TempFileStore};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Time between scheduled sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Entries older than this are considered abandoned
pub const MAX_ENTRY_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub interval: Duration,
    pub max_age: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            interval: SWEEP_INTERVAL,
            max_age: MAX_ENTRY_AGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Sweeping,
}

/// Results from a single sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries seen in the staging directory
    pub scanned: usize,
    /// Stale entries deleted
    pub removed: usize,
    /// Stale entries that could not be deleted
    pub failed: usize,
}

/// Directory the scheduler sweeps
#[async_trait]
pub trait StagingArea: Send + Sync {
    async fn list_entries(&self) -> Result<Vec<StagingEntry>, StagingError>;

    /// Delete one entry. `Ok(false)` means it was already gone.
    async fn try_remove(&self, path: &Path) -> io::Result<bool>;
}

#[async_trait]
impl StagingArea for TempFileStore {
    async fn list_entries(&self) -> Result<Vec<StagingEntry>, StagingError> {
        TempFileStore::list_entries(self).await
    }

    async fn try_remove(&self, path: &Path) -> io::Result<bool> {
        TempFileStore::try_remove(self, path).await
    }
}

/// Marks a sweep in flight until dropped, including when the sweep is cancelled.
struct SweepGuard<'a>(&'a AtomicUsize);

impl<'a> SweepGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Periodically reclaims abandoned entries from the staging directory.
pub struct CleanupScheduler {
    store: Arc<dyn StagingArea>,
    policy: CleanupPolicy,
    in_flight: AtomicUsize,
}

impl CleanupScheduler {
    pub fn new(store: Arc<dyn StagingArea>, policy: CleanupPolicy) -> Self {
        Self {
            store,
            policy,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> CleanupPolicy {
        self.policy
    }

    pub fn state(&self) -> SchedulerState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            SchedulerState::Sweeping
        } else {
            SchedulerState::Idle
        }
    }

    /// Sweep once right away, then on every interval until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.policy.interval.as_secs(),
            max_age_secs = self.policy.max_age.as_secs(),
            "🧹 Cleanup scheduler started"
        );

        self.sweep().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("🛑 Cleanup scheduler shutting down");
                    break;
                }
                _ = sleep(self.policy.interval) => {
                    self.sweep().await;
                }
            }
        }
    }

    /// Run exactly one sweep against the current time
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now()).await
    }

    /// Run exactly one sweep, judging entry ages relative to `now`.
    ///
    /// Removal failures are logged and counted; they never abort the sweep.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let report = {
            let _guard = SweepGuard::enter(&self.in_flight);
            self.sweep_entries(now).await
        };

        if report.removed > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                removed = report.removed,
                failed = report.failed,
                "Cleanup sweep complete"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "Cleanup sweep complete, nothing to remove");
        }
        report
    }

    async fn sweep_entries(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match self.store.list_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Error in cleanup task: {}", e);
                return report;
            }
        };
        report.scanned = entries.len();

        for entry in entries {
            // Modification times in the future count as fresh
            let age = now.duration_since(entry.modified).unwrap_or_default();
            if age <= self.policy.max_age {
                continue;
            }

            match self.store.try_remove(&entry.path).await {
                Ok(true) => {
                    report.removed += 1;
                    tracing::info!("Cleaned up: {}", entry.path.display());
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!("Error cleaning up {}: {}", entry.path.display(), e);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    /// Store whose removals fail for names containing `locked`
    struct LockedEntries(TempFileStore);

    #[async_trait]
    impl StagingArea for LockedEntries {
        async fn list_entries(&self) -> Result<Vec<StagingEntry>, StagingError> {
            self.0.list_entries().await
        }

        async fn try_remove(&self, path: &Path) -> io::Result<bool> {
            let locked = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains("locked"));
            if locked {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "entry is locked"));
            }
            self.0.try_remove(path).await
        }
    }

    async fn scheduler() -> (tempfile::TempDir, Arc<TempFileStore>, CleanupScheduler) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempFileStore::new(dir.path()));
        let scheduler = CleanupScheduler::new(store.clone(), CleanupPolicy::default());
        (dir, store, scheduler)
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_entries() {
        let (_dir, store, scheduler) = scheduler().await;
        let staged = store.stage("fresh.pdf", b"x").await.unwrap();

        let report = scheduler.sweep().await;
        assert_eq!(report, SweepReport { scanned: 1, removed: 0, failed: 0 });
        assert!(staged.path.exists());
    }

    #[tokio::test]
    async fn test_sweep_removes_entries_past_threshold() {
        let (_dir, store, scheduler) = scheduler().await;
        let staged = store.stage("old.pdf", b"x").await.unwrap();
        let scratch = store.scratch_dir(&staged);
        tokio::fs::create_dir_all(&scratch).await.unwrap();
        tokio::fs::write(scratch.join("page.png"), b"png").await.unwrap();

        let later = SystemTime::now() + HOUR + Duration::from_secs(60);
        let report = scheduler.sweep_at(later).await;

        assert_eq!(report.removed, 2);
        assert!(!staged.path.exists());
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_sweep_threshold_is_exclusive() {
        let (_dir, store, scheduler) = scheduler().await;
        let staged = store.stage("edge.pdf", b"x").await.unwrap();
        let modified = std::fs::metadata(&staged.path).unwrap().modified().unwrap();

        let report = scheduler.sweep_at(modified + HOUR).await;
        assert_eq!(report.removed, 0);
        assert!(staged.path.exists());

        let report = scheduler.sweep_at(modified + HOUR + Duration::from_millis(1)).await;
        assert_eq!(report.removed, 1);
    }

    #[tokio::test]
    async fn test_future_mtime_counts_as_fresh() {
        let (_dir, store, scheduler) = scheduler().await;
        let staged = store.stage("clock-skew.pdf", b"x").await.unwrap();

        let report = scheduler.sweep_at(SystemTime::now() - HOUR).await;
        assert_eq!(report.removed, 0);
        assert!(staged.path.exists());
    }

    #[tokio::test]
    async fn test_repeated_sweeps_are_idempotent() {
        let (_dir, _store, scheduler) = scheduler().await;
        let later = SystemTime::now() + 2 * HOUR;

        assert_eq!(scheduler.sweep_at(later).await, SweepReport::default());
        assert_eq!(scheduler.sweep_at(later).await, SweepReport::default());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_failed_removal_does_not_stop_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempFileStore::new(dir.path());
        let first = store.stage("first.pdf", b"x").await.unwrap();
        let locked = store.stage("locked.pdf", b"x").await.unwrap();
        let last = store.stage("last.pdf", b"x").await.unwrap();
        let scheduler =
            CleanupScheduler::new(Arc::new(LockedEntries(store)), CleanupPolicy::default());

        let report = scheduler.sweep_at(SystemTime::now() + 2 * HOUR).await;

        assert_eq!(report, SweepReport { scanned: 3, removed: 2, failed: 1 });
        assert!(!first.path.exists());
        assert!(locked.path.exists());
        assert!(!last.path.exists());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_aborted_sweep_returns_to_idle() {
        let (_dir, store, scheduler) = scheduler().await;
        for i in 0..20 {
            store.stage(&format!("entry-{i}.pdf"), b"x").await.unwrap();
        }
        let scheduler = Arc::new(scheduler);

        let sweeping = scheduler.clone();
        let handle = tokio::spawn(async move { sweeping.sweep().await });
        tokio::task::yield_now().await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_missing_directory_yields_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempFileStore::new(dir.path().join("gone")));
        let scheduler = CleanupScheduler::new(store, CleanupPolicy::default());

        assert_eq!(scheduler.sweep().await, SweepReport::default());
    }

    #[tokio::test]
    async fn test_run_sweeps_immediately_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempFileStore::new(dir.path()));
        let staged = store.stage("stale.pdf", b"x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let policy = CleanupPolicy {
            interval: Duration::from_secs(3600),
            max_age: Duration::ZERO,
        };
        let scheduler = Arc::new(CleanupScheduler::new(store, policy));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.clone().run(cancel.clone()));

        // Zero max age: anything with a past mtime is stale on the first sweep
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!staged.path.exists());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_run_sweeps_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TempFileStore::new(dir.path()));
        let policy = CleanupPolicy {
            interval: Duration::from_millis(20),
            max_age: Duration::ZERO,
        };
        let scheduler = Arc::new(CleanupScheduler::new(store.clone(), policy));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.clone().run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let staged = store.stage("later.pdf", b"x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!staged.path.exists());

        cancel.cancel();
        handle.await.unwrap();
    }
}

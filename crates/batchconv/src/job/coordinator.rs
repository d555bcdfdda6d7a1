use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::model::{ItemRecord, JobInput, JobOptions, JobSnapshot, JobStatus};
use super::store::{InMemoryJobStore, JobStore};
use super::worker::{panic_message, ItemWorker};
use crate::archive::ArchiveStorage;
use crate::config::ServiceConfig;
use crate::converter::{Converter, ConverterRegistry};
use crate::error::JobError;

/// Response body for a newly started job.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StartedJob {
    pub job_id: String,
    pub total: usize,
}

/// Creates jobs, launches one background worker per job and hands out
/// finished archives exactly once.
pub struct JobCoordinator {
    store: Arc<dyn JobStore>,
    converter: Arc<dyn Converter>,
    storage: ArchiveStorage,
    permits: Option<Arc<Semaphore>>,
    item_timeout: Option<Duration>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl JobCoordinator {
    pub fn new(
        store: Arc<dyn JobStore>,
        converter: Arc<dyn Converter>,
        storage: ArchiveStorage,
    ) -> Self {
        Self {
            store,
            converter,
            storage,
            permits: None,
            item_timeout: None,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Coordinator with an in-memory store and the full converter registry.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(ConverterRegistry::new(config)),
            ArchiveStorage::new(config.archive_path()),
        )
        .with_max_concurrent_jobs(config.max_concurrent_jobs)
        .with_item_timeout(config.item_timeout())
    }

    /// Caps the number of jobs converting at once. Jobs over the cap wait
    /// with all items `queued`.
    pub fn with_max_concurrent_jobs(mut self, limit: Option<usize>) -> Self {
        self.permits = limit.map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn storage(&self) -> &ArchiveStorage {
        &self.storage
    }

    /// Registers a job for `files` and starts converting it in the
    /// background. Must be called from within a Tokio runtime.
    pub fn start_job(
        &self,
        files: Vec<JobInput>,
        options: JobOptions,
    ) -> Result<StartedJob, JobError> {
        if files.is_empty() {
            return Err(JobError::NoFiles);
        }

        let records: Vec<ItemRecord> = files
            .iter()
            .map(|file| ItemRecord::queued(&file.name, file.bytes.len() as u64))
            .collect();
        let total = records.len();
        let job_id = self.store.create(records);

        info!(
            "Job {} created: {} items, target {}",
            job_id, total, options.target
        );

        let worker = ItemWorker::new(
            job_id.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.converter),
            self.storage.clone(),
        )
        .with_item_timeout(self.item_timeout)
        .with_cancellation(self.shutdown.child_token());

        self.tasks.spawn(supervise(
            worker,
            files,
            options,
            Arc::clone(&self.store),
            self.permits.clone(),
            self.shutdown.clone(),
        ));

        Ok(StartedJob { job_id, total })
    }

    pub fn status(&self, job_id: &str) -> Result<JobSnapshot, JobError> {
        self.store.read(job_id).ok_or(JobError::NotFound)
    }

    /// Hands out the finished archive of a job and removes the job. Only the
    /// first caller for a finished job succeeds; everyone after gets
    /// `NotFound`.
    pub fn claim_result(&self, job_id: &str) -> Result<ClaimedArchive, JobError> {
        let mut claim = Err(JobError::NotFound);

        let exists = self.store.mutate(job_id, &mut |state| {
            claim = if state.is_claimed() {
                Err(JobError::NotFound)
            } else if state.status() != JobStatus::Done {
                Err(JobError::NotReady)
            } else {
                state.claim_result().ok_or(JobError::NotFound)
            };
        });

        if !exists {
            return Err(JobError::NotFound);
        }

        let path = claim?;
        self.store.delete(job_id);
        info!("Job {} claimed for download", job_id);

        Ok(ClaimedArchive {
            job_id: job_id.to_string(),
            path,
        })
    }

    pub fn jobs_in_memory(&self) -> usize {
        self.store.len()
    }

    /// Cancels every running job. Workers stop before their next item.
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    /// Cancels running jobs and waits for their workers to settle.
    pub async fn shutdown(&self) {
        info!("Shutting down job coordinator, {} jobs running", self.tasks.len());
        self.cancel_all();
        self.tasks.close();
        self.tasks.wait().await;
        info!("All job workers have stopped");
    }
}

/// Waits for a concurrency permit, then runs the worker. A panic anywhere in
/// the worker loop ends the job in `error`.
async fn supervise(
    worker: ItemWorker,
    files: Vec<JobInput>,
    options: JobOptions,
    store: Arc<dyn JobStore>,
    permits: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
) {
    let job_id = worker.job_id().to_string();

    let _permit = match permits {
        Some(semaphore) => {
            tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        fail_job(&*store, &job_id, JobError::WorkerFault("job scheduler closed".into()));
                        return;
                    }
                },
                _ = shutdown.cancelled() => {
                    fail_job(&*store, &job_id, JobError::Cancelled);
                    return;
                }
            }
        }
        None => None,
    };

    if let Err(payload) = AssertUnwindSafe(worker.run(files, options))
        .catch_unwind()
        .await
    {
        let fault = JobError::WorkerFault(panic_message(payload));
        error!("Job {} worker crashed: {}", job_id, fault);
        fail_job(&*store, &job_id, fault);
    }
}

fn fail_job(store: &dyn JobStore, job_id: &str, reason: JobError) {
    let message = reason.to_string();
    store.mutate(job_id, &mut |state| {
        state.fail(message.clone());
    });
}

/// A finished archive handed to exactly one downloader. The file is deleted
/// when the claim is dropped.
#[derive(Debug)]
pub struct ClaimedArchive {
    job_id: String,
    path: PathBuf,
}

impl ClaimedArchive {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ClaimedArchive {
    fn drop(&mut self) {
        match ArchiveStorage::release(&self.path) {
            Ok(()) => info!("Released archive for job {}", self.job_id),
            Err(e) => warn!("Failed to release archive for job {}: {}", self.job_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{ConvertOptions, ConvertedOutput, SourceKind, TargetFormat};
    use crate::error::ConvertError;
    use crate::job::model::ItemStatus;
    use std::sync::{Condvar, Mutex};
    use tempfile::TempDir;

    /// Blocks every conversion until the gate is opened.
    #[derive(Default)]
    struct GatedConverter {
        open: Mutex<bool>,
        signal: Condvar,
    }

    impl GatedConverter {
        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.signal.notify_all();
        }
    }

    impl Converter for GatedConverter {
        fn convert(
            &self,
            input: &[u8],
            _source: SourceKind,
            target: TargetFormat,
            _options: &ConvertOptions,
        ) -> Result<Vec<ConvertedOutput>, ConvertError> {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.signal.wait(open).unwrap();
            }
            Ok(vec![ConvertedOutput::new(input.to_vec(), target.extension())])
        }
    }

    fn coordinator(converter: Arc<dyn Converter>) -> (JobCoordinator, TempDir) {
        let dir = TempDir::new().unwrap();
        let coordinator = JobCoordinator::new(
            Arc::new(InMemoryJobStore::new()),
            converter,
            ArchiveStorage::new(dir.path()),
        );
        (coordinator, dir)
    }

    fn files(count: usize) -> Vec<JobInput> {
        (0..count)
            .map(|i| JobInput::new(format!("note{}.txt", i), b"hello".to_vec()))
            .collect()
    }

    fn pdf_options() -> JobOptions {
        JobOptions::new(TargetFormat::Pdf, ConvertOptions::default(), false)
    }

    async fn wait_for(
        coordinator: &JobCoordinator,
        job_id: &str,
        done: impl Fn(&JobSnapshot) -> bool,
    ) -> JobSnapshot {
        for _ in 0..500 {
            let snapshot = coordinator.status(job_id).unwrap();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach the expected state", job_id);
    }

    async fn wait_terminal(coordinator: &JobCoordinator, job_id: &str) -> JobSnapshot {
        wait_for(coordinator, job_id, |s| s.status.is_terminal()).await
    }

    #[tokio::test]
    async fn test_start_job_without_files() {
        let (coordinator, _dir) = coordinator(Arc::new(GatedConverter::default()));

        let result = coordinator.start_job(Vec::new(), pdf_options());

        assert!(matches!(result, Err(JobError::NoFiles)));
        assert_eq!(coordinator.jobs_in_memory(), 0);
    }

    #[tokio::test]
    async fn test_job_runs_to_done() {
        let converter = Arc::new(GatedConverter::default());
        converter.open();
        let (coordinator, _dir) = coordinator(converter);

        let started = coordinator.start_job(files(3), pdf_options()).unwrap();
        assert_eq!(started.total, 3);

        let snapshot = wait_terminal(&coordinator, &started.job_id).await;
        assert_eq!(snapshot.status, JobStatus::Done);
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.items[2].out_name.as_deref(), Some("note2.pdf"));
    }

    #[tokio::test]
    async fn test_status_unknown_job() {
        let (coordinator, _dir) = coordinator(Arc::new(GatedConverter::default()));
        assert!(matches!(coordinator.status("nope"), Err(JobError::NotFound)));
    }

    #[tokio::test]
    async fn test_claim_before_done_is_not_ready() {
        let converter = Arc::new(GatedConverter::default());
        let (coordinator, _dir) = coordinator(converter.clone());
        let started = coordinator.start_job(files(1), pdf_options()).unwrap();

        assert!(matches!(
            coordinator.claim_result(&started.job_id),
            Err(JobError::NotReady)
        ));

        converter.open();
        wait_terminal(&coordinator, &started.job_id).await;
        assert!(coordinator.claim_result(&started.job_id).is_ok());
    }

    #[tokio::test]
    async fn test_claim_is_single_use() {
        let converter = Arc::new(GatedConverter::default());
        converter.open();
        let (coordinator, _dir) = coordinator(converter);
        let started = coordinator.start_job(files(2), pdf_options()).unwrap();
        wait_terminal(&coordinator, &started.job_id).await;

        let claim = coordinator.claim_result(&started.job_id).unwrap();
        let path = claim.path().to_path_buf();
        assert!(path.exists());

        assert!(matches!(
            coordinator.claim_result(&started.job_id),
            Err(JobError::NotFound)
        ));
        assert!(matches!(
            coordinator.status(&started.job_id),
            Err(JobError::NotFound)
        ));

        drop(claim);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrency_limit_keeps_jobs_queued() {
        let converter = Arc::new(GatedConverter::default());
        let (coordinator, _dir) = coordinator(converter.clone());
        let coordinator = coordinator.with_max_concurrent_jobs(Some(1));

        let first = coordinator.start_job(files(1), pdf_options()).unwrap();
        let second = coordinator.start_job(files(1), pdf_options()).unwrap();

        wait_for(&coordinator, &first.job_id, |s| {
            s.items[0].status == ItemStatus::Processing
        })
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = coordinator.status(&second.job_id).unwrap();
        assert_eq!(waiting.status, JobStatus::Processing);
        assert_eq!(waiting.items[0].status, ItemStatus::Queued);

        converter.open();
        assert_eq!(
            wait_terminal(&coordinator, &first.job_id).await.status,
            JobStatus::Done
        );
        assert_eq!(
            wait_terminal(&coordinator, &second.job_id).await.status,
            JobStatus::Done
        );
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_jobs() {
        let converter = Arc::new(GatedConverter::default());
        let (coordinator, _dir) = coordinator(converter.clone());
        let started = coordinator.start_job(files(3), pdf_options()).unwrap();

        wait_for(&coordinator, &started.job_id, |s| {
            s.items[0].status == ItemStatus::Processing
        })
        .await;
        coordinator.cancel_all();
        converter.open();
        coordinator.shutdown().await;

        let snapshot = coordinator.status(&started.job_id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Error);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Job cancelled: service shutting down")
        );
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.items[0].status, ItemStatus::Done);
    }
}

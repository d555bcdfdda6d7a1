//! The item worker loop: converts one job's items in upload order and
//! assembles the result archive.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::model::{JobInput, JobOptions, JobState};
use super::store::JobStore;
use crate::archive::{merge_pdfs, ArchiveAssembler, ArchiveStorage, COMBINED_PDF_NAME};
use crate::converter::{ConvertedOutput, Converter, SourceKind};
use crate::error::{ConvertError, JobError};
use crate::sanitize::output_name;

/// Runs a single job to a terminal state. Owns the uploaded bytes for the
/// duration of the run; each input is dropped once its item is handled.
pub struct ItemWorker {
    job_id: String,
    store: Arc<dyn JobStore>,
    converter: Arc<dyn Converter>,
    storage: ArchiveStorage,
    item_timeout: Option<Duration>,
    cancel: CancellationToken,
}

/// PDFs held back for the combine step, with the items they came from.
#[derive(Default)]
struct CombineBuffer {
    indices: Vec<usize>,
    documents: Vec<Vec<u8>>,
}

impl ItemWorker {
    pub fn new(
        job_id: impl Into<String>,
        store: Arc<dyn JobStore>,
        converter: Arc<dyn Converter>,
        storage: ArchiveStorage,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            store,
            converter,
            storage,
            item_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Processes every input and moves the job to `done`, or to `error` when
    /// something outside per-item isolation fails.
    pub async fn run(self, inputs: Vec<JobInput>, options: JobOptions) {
        let span = tracing::info_span!(
            "job",
            id = %self.job_id,
            total = inputs.len(),
            target = %options.target
        );

        async move {
            let started = Utc::now();

            let outcome = self.process(inputs, &options).await;
            let elapsed_ms = (Utc::now() - started).num_milliseconds();

            match outcome {
                Ok(Some(path)) => {
                    info!(
                        "Job {} finished in {}ms, archive at {}",
                        self.job_id,
                        elapsed_ms,
                        path.display()
                    );
                }
                Ok(None) => {
                    info!("Job {} vanished before it finished", self.job_id);
                }
                Err(e) => {
                    warn!("Job {} failed after {}ms: {}", self.job_id, elapsed_ms, e);
                    let message = e.to_string();
                    self.update(|state| {
                        state.fail(message.clone());
                    });
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Returns the persisted archive path, or `None` when the job was
    /// deleted from the store while it ran.
    async fn process(
        &self,
        inputs: Vec<JobInput>,
        options: &JobOptions,
    ) -> Result<Option<PathBuf>, JobError> {
        let mut archive = ArchiveAssembler::open();
        let mut combine = CombineBuffer::default();

        for (index, input) in inputs.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(JobError::Cancelled);
            }

            let span = tracing::info_span!("item", index, name = %input.name);
            self.process_item(index, input, options, &mut archive, &mut combine)
                .instrument(span)
                .await?;
        }

        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        if options.combine && !combine.documents.is_empty() {
            self.write_combined(combine, &mut archive).await?;
        }

        let entries = archive.len();
        let bytes = archive.seal()?;
        info!("Archive sealed: {} entries, {} bytes", entries, bytes.len());

        let storage = self.storage.clone();
        let job_id = self.job_id.clone();
        let path = blocking(move || storage.persist(&job_id, &bytes)).await??;

        let mut finished = false;
        let exists = self.update(|state| finished = state.finish(path.clone()));

        if !exists || !finished {
            if exists {
                warn!("Job {} was already terminal, discarding archive", self.job_id);
            }
            if let Err(e) = ArchiveStorage::release(&path) {
                warn!("Failed to release orphaned archive: {}", e);
            }
            return Ok(None);
        }

        Ok(Some(path))
    }

    async fn process_item(
        &self,
        index: usize,
        input: JobInput,
        options: &JobOptions,
        archive: &mut ArchiveAssembler,
        combine: &mut CombineBuffer,
    ) -> Result<(), JobError> {
        if !self.update(|state| {
            state.begin_item(index);
        }) {
            debug!("Job {} no longer in store, continuing detached", self.job_id);
        }

        let name = input.name.clone();
        let outputs = match self.convert(input, options).await {
            Ok(outputs) => outputs,
            Err(e) => {
                info!("Item {} '{}' failed: {}", index, name, e);
                let message = e.to_string();
                self.update(|state| {
                    state.fail_item(index, message.clone());
                });
                return Ok(());
            }
        };

        let paged = outputs.len() > 1;
        let mut names = Vec::with_capacity(outputs.len());

        for (page, output) in outputs.into_iter().enumerate() {
            let entry = output_name(&name, output.extension, paged.then_some(page + 1));

            if options.combine {
                names.push(entry);
                combine.documents.push(output.bytes);
            } else {
                names.push(archive.add_entry(&entry, &output.bytes)?);
            }
        }
        if options.combine {
            combine.indices.push(index);
        }

        info!("Item {} '{}' converted to {}", index, name, names.join(", "));
        self.update(|state| {
            state.complete_item(index, names.clone());
        });

        Ok(())
    }

    /// Runs the converter off the async runtime. Panics and timeouts become
    /// ordinary item errors.
    async fn convert(
        &self,
        input: JobInput,
        options: &JobOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let converter = Arc::clone(&self.converter);
        let target = options.target;
        let convert_options = options.convert.clone();

        let task = tokio::task::spawn_blocking(move || {
            let JobInput { name, bytes } = input;
            let source = SourceKind::infer(&name, &bytes)
                .ok_or(ConvertError::UnsupportedInput(name))?;
            converter.convert(&bytes, source, target, &convert_options)
        });

        let joined = match self.item_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                // the blocking thread keeps running; its result is discarded
                Err(_) => return Err(ConvertError::TimedOut(limit.as_secs())),
            },
            None => task.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ConvertError::Aborted(format!(
                "converter panicked: {}",
                panic_message(e.into_panic())
            ))),
            Err(e) => Err(ConvertError::Aborted(e.to_string())),
        }
    }

    async fn write_combined(
        &self,
        combine: CombineBuffer,
        archive: &mut ArchiveAssembler,
    ) -> Result<(), JobError> {
        let CombineBuffer { indices, documents } = combine;
        info!("Combining {} documents", documents.len());

        let merged = blocking(move || merge_pdfs(&documents)).await??;
        let entry = archive.add_entry(COMBINED_PDF_NAME, &merged)?;

        self.update(|state| state.redirect_outputs(&indices, &entry));
        Ok(())
    }

    fn update(&self, mut apply: impl FnMut(&mut JobState)) -> bool {
        self.store.mutate(&self.job_id, &mut apply)
    }
}

async fn blocking<T, F>(work: F) -> Result<T, JobError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| JobError::WorkerFault(e.to_string()))
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

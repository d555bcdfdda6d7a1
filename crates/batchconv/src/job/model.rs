use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::converter::{ConvertOptions, TargetFormat};

/// Job-level state machine: `Processing` → `Done` | `Error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// Per-item state machine: `Queued` → `Processing` → `Done` | `Error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// One uploaded file. The bytes travel with the worker, never the store.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl JobInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Options shared by every item of a job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobOptions {
    pub target: TargetFormat,
    pub convert: ConvertOptions,
    /// Merge all PDF outputs into one document. Only honoured for PDF output.
    pub combine: bool,
}

impl JobOptions {
    pub fn new(target: TargetFormat, convert: ConvertOptions, combine_pdf: bool) -> Self {
        Self {
            target,
            convert,
            combine: combine_pdf && target == TargetFormat::Pdf,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub name: String,
    pub size: u64,
    status: ItemStatus,
    out_names: Vec<String>,
    error: Option<String>,
}

impl ItemRecord {
    pub fn queued(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            status: ItemStatus::Queued,
            out_names: Vec::new(),
            error: None,
        }
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn out_names(&self) -> &[String] {
        &self.out_names
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn begin(&mut self) -> bool {
        self.transition(ItemStatus::Processing)
    }

    pub fn complete(&mut self, out_names: Vec<String>) -> bool {
        if !self.transition(ItemStatus::Done) {
            return false;
        }
        self.out_names = out_names;
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(ItemStatus::Error) {
            return false;
        }
        self.error = Some(message.into());
        true
    }

    /// Allowed moves: queued → processing, processing → done | error, and
    /// queued → error for items abandoned by a failing job.
    fn transition(&mut self, next: ItemStatus) -> bool {
        let allowed = matches!(
            (self.status, next),
            (ItemStatus::Queued, ItemStatus::Processing)
                | (ItemStatus::Queued, ItemStatus::Error)
                | (ItemStatus::Processing, ItemStatus::Done)
                | (ItemStatus::Processing, ItemStatus::Error)
        );

        if allowed {
            self.status = next;
        } else {
            log::warn!(
                "Ignoring item transition {:?} -> {:?} for '{}'",
                self.status,
                next,
                self.name
            );
        }
        allowed
    }

    fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            name: self.name.clone(),
            size: self.size,
            status: self.status,
            out_name: (!self.out_names.is_empty()).then(|| self.out_names.join(", ")),
            error: self.error.clone(),
        }
    }
}

/// Mutable record of one job, owned by the job store.
#[derive(Debug, Clone)]
pub struct JobState {
    items: Vec<ItemRecord>,
    processed: usize,
    status: JobStatus,
    error: Option<String>,
    result_path: Option<PathBuf>,
    retrieval_claimed: bool,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn new(items: Vec<ItemRecord>) -> Self {
        Self {
            items,
            processed: 0,
            status: JobStatus::Processing,
            error: None,
            result_path: None,
            retrieval_claimed: false,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn items(&self) -> &[ItemRecord] {
        &self.items
    }

    pub fn result_path(&self) -> Option<&PathBuf> {
        self.result_path.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn begin_item(&mut self, index: usize) -> bool {
        self.items.get_mut(index).is_some_and(ItemRecord::begin)
    }

    pub fn complete_item(&mut self, index: usize, out_names: Vec<String>) -> bool {
        let moved = self
            .items
            .get_mut(index)
            .is_some_and(|item| item.complete(out_names));
        if moved {
            self.processed += 1;
        }
        moved
    }

    pub fn fail_item(&mut self, index: usize, message: impl Into<String>) -> bool {
        let moved = self
            .items
            .get_mut(index)
            .is_some_and(|item| item.fail(message));
        if moved {
            self.processed += 1;
        }
        moved
    }

    /// Points every finished item at `name`. Used when outputs were merged
    /// into one combined artifact.
    pub fn redirect_outputs(&mut self, indices: &[usize], name: &str) {
        for index in indices {
            if let Some(item) = self.items.get_mut(*index) {
                if item.status == ItemStatus::Done {
                    item.out_names = vec![name.to_string()];
                }
            }
        }
    }

    /// `Processing` → `Done`. Refused unless every item is terminal.
    pub fn finish(&mut self, result_path: PathBuf) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        if self.processed != self.items.len() {
            log::warn!(
                "Refusing to finish job with {}/{} items processed",
                self.processed,
                self.items.len()
            );
            return false;
        }

        self.status = JobStatus::Done;
        self.result_path = Some(result_path);
        self.finished_at = Some(Utc::now());
        true
    }

    /// `Processing` → `Error`. Items that never reached a terminal state are
    /// failed with the same message so `processed` still equals `total`.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }

        let message = message.into();
        for index in 0..self.items.len() {
            if !self.items[index].status.is_terminal() {
                self.fail_item(index, message.clone());
            }
        }

        self.status = JobStatus::Error;
        self.error = Some(message);
        self.finished_at = Some(Utc::now());
        true
    }

    /// Marks the result as handed out. Returns the archive path the first
    /// time it is called on a finished job, `None` afterwards.
    pub fn claim_result(&mut self) -> Option<PathBuf> {
        if self.status != JobStatus::Done || self.retrieval_claimed {
            return None;
        }
        self.retrieval_claimed = true;
        self.result_path.clone()
    }

    pub fn is_claimed(&self) -> bool {
        self.retrieval_claimed
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            total: self.items.len(),
            processed: self.processed,
            status: self.status,
            error: self.error.clone(),
            items: self.items.iter().map(ItemRecord::snapshot).collect(),
        }
    }
}

/// Immutable copy of a job, shaped like the status response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSnapshot {
    pub total: usize,
    pub processed: usize,
    pub status: JobStatus,
    pub error: Option<String>,
    pub items: Vec<ItemSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub name: String,
    pub size: u64,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

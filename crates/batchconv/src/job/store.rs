//! In-memory job store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::model::{ItemRecord, JobSnapshot, JobState};

/// Concurrent mapping from job id to job state.
///
/// Readers get snapshots; writers go through [`mutate`](JobStore::mutate) so
/// every update happens under the store's exclusive access.
pub trait JobStore: Send + Sync {
    /// Registers a new job in `processing` and returns its id.
    fn create(&self, items: Vec<ItemRecord>) -> String;

    fn read(&self, id: &str) -> Option<JobSnapshot>;

    /// Applies `update` to the job. Returns `false` when the job no longer
    /// exists, in which case nothing happens.
    fn mutate(&self, id: &str, update: &mut dyn FnMut(&mut JobState)) -> bool;

    fn delete(&self, id: &str) -> Option<JobState>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Job store backed by a single `RwLock<HashMap>`.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, JobState>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<String, JobState>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<String, JobState>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, items: Vec<ItemRecord>) -> String {
        let mut jobs = self.write_jobs();

        // v4 collisions are not a practical concern, but never clobber a job.
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        while jobs.contains_key(&id) {
            id = uuid::Uuid::new_v4().simple().to_string();
        }

        jobs.insert(id.clone(), JobState::new(items));
        id
    }

    fn read(&self, id: &str) -> Option<JobSnapshot> {
        self.read_jobs().get(id).map(JobState::snapshot)
    }

    fn mutate(&self, id: &str, update: &mut dyn FnMut(&mut JobState)) -> bool {
        match self.write_jobs().get_mut(id) {
            Some(state) => {
                update(state);
                true
            }
            None => false,
        }
    }

    fn delete(&self, id: &str) -> Option<JobState> {
        self.write_jobs().remove(id)
    }

    fn len(&self) -> usize {
        self.read_jobs().len()
    }
}

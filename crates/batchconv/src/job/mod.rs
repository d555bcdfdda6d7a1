//! Job lifecycle: state model, store, worker loop and coordinator.

pub mod coordinator;
pub mod model;
pub mod store;
pub mod worker;

pub use coordinator::{ClaimedArchive, JobCoordinator, StartedJob};
pub use model::{
    ItemRecord, ItemSnapshot, ItemStatus, JobInput, JobOptions, JobSnapshot, JobState, JobStatus,
};
pub use store::{InMemoryJobStore, JobStore};
pub use worker::ItemWorker;

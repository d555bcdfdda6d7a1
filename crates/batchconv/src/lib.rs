//! Batch image and document conversion.
//!
//! A job takes a set of uploads, converts each one independently on a
//! background task and collects the outputs into a zip archive that can be
//! downloaded once. See [`job::JobCoordinator`] for the entry point.

pub mod archive;
pub mod config;
pub mod converter;
pub mod error;
pub mod job;
pub mod legacy;
pub mod sanitize;

pub use archive::{ArchiveAssembler, ArchiveStorage};
pub use config::{load_config, load_config_from_str, ServiceConfig};
pub use converter::{
    ConvertOptions, ConvertedOutput, Converter, ConverterRegistry, SourceKind, TargetFormat,
};
pub use error::{
    ArchiveError, BatchError, ConfigError, ConvertError, JobError, LegacyError, Result,
    StorageError,
};
pub use job::{
    ClaimedArchive, InMemoryJobStore, JobCoordinator, JobInput, JobOptions, JobSnapshot,
    JobStatus, JobStore, StartedJob,
};
pub use legacy::{optimize_batch, LegacyFormat};

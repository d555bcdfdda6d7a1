use std::path::PathBuf;
use thiserror::Error;

use crate::converter::{SourceKind, TargetFormat};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Batch conversion error: {0}")]
    Legacy(#[from] LegacyError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Failure of a single conversion. Always recorded on the item, never
/// escalated to the job.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Unsupported input type: {0}")]
    UnsupportedInput(String),

    #[error("Conversion from {from} to {to} is not supported")]
    UnsupportedConversion { from: SourceKind, to: TargetFormat },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Failed to process PDF: {0}")]
    Pdf(String),

    #[error("Failed to process DOCX: {0}")]
    Docx(String),

    #[error("Failed to render PDF page: {0}")]
    Render(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("All conversion providers failed: {0}")]
    ProvidersExhausted(String),

    #[error("Converter produced no output")]
    EmptyOutput,

    #[error("Conversion timed out after {0}s")]
    TimedOut(u64),

    #[error("Conversion aborted: {0}")]
    Aborted(String),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to write archive entry '{name}': {source}")]
    WriteEntry {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to write archive entry '{name}': {source}")]
    WriteBytes {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to seal archive: {0}")]
    Seal(#[source] zip::result::ZipError),

    #[error("Failed to combine outputs: {0}")]
    Combine(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("No files uploaded")]
    NoFiles,

    #[error("Job not found")]
    NotFound,

    #[error("Job not ready")]
    NotReady,

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Job cancelled: service shutting down")]
    Cancelled,

    #[error("Worker fault: {0}")]
    WorkerFault(String),
}

/// Errors of the synchronous single-shot batch conversion.
#[derive(Error, Debug)]
pub enum LegacyError {
    #[error("No files uploaded")]
    NoFiles,

    #[error("All images failed to process.")]
    AllFailed,

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

pub type Result<T> = std::result::Result<T, BatchError>;

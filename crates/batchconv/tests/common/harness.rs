//! Isolated coordinator setup for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use batchconv::{
    ArchiveStorage, Converter, ConverterRegistry, InMemoryJobStore, JobCoordinator, JobSnapshot,
    ServiceConfig,
};

pub struct TestHarness {
    temp_dir: TempDir,
    pub coordinator: JobCoordinator,
}

impl TestHarness {
    /// Harness with the real converter registry and default settings.
    pub fn new() -> Self {
        let config = ServiceConfig::default();
        Self::with_converter(Arc::new(ConverterRegistry::new(&config)))
    }

    pub fn with_converter(converter: Arc<dyn Converter>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let coordinator = JobCoordinator::new(
            Arc::new(InMemoryJobStore::new()),
            converter,
            ArchiveStorage::new(temp_dir.path().join("archives")),
        );
        Self {
            temp_dir,
            coordinator,
        }
    }

    pub fn archive_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("archives")
    }

    /// Polls until the job leaves `processing`.
    pub async fn wait_terminal(&self, job_id: &str) -> JobSnapshot {
        for _ in 0..1000 {
            let snapshot = self
                .coordinator
                .status(job_id)
                .expect("job disappeared while waiting");
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish in time", job_id);
    }
}

/// Names of all entries in a zip file, in archive order.
pub fn zip_entries(path: &Path) -> Vec<String> {
    let bytes = std::fs::read(path).expect("Failed to read archive");
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("Not a zip archive");
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn zip_entry(path: &Path, name: &str) -> Vec<u8> {
    let bytes = std::fs::read(path).expect("Failed to read archive");
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("Not a zip archive");
    let mut entry = archive.by_name(name).expect("Missing archive entry");
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    data
}

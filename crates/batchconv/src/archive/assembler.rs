use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArchiveError;
use crate::sanitize::{basename, client_filename};

/// Append-only zip being built in memory for one job.
///
/// Entries can be added during the item loop and again afterwards (the
/// combined document) until [`seal`](Self::seal) consumes the assembler.
pub struct ArchiveAssembler {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    names: Vec<String>,
    taken: HashSet<String>,
}

impl ArchiveAssembler {
    pub fn open() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644),
            names: Vec::new(),
            taken: HashSet::new(),
        }
    }

    /// Adds an entry and returns the name it was stored under. Names are
    /// reduced to their final path component; a name already in the archive
    /// gets a `_2`, `_3`, ... suffix before its extension.
    pub fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<String, ArchiveError> {
        let entry_name = self.unique_name(&client_filename(name));

        self.writer
            .start_file(entry_name.as_str(), self.options)
            .map_err(|e| ArchiveError::WriteEntry {
                name: entry_name.clone(),
                source: e,
            })?;
        self.writer
            .write_all(bytes)
            .map_err(|e| ArchiveError::WriteBytes {
                name: entry_name.clone(),
                source: e,
            })?;

        self.taken.insert(entry_name.clone());
        self.names.push(entry_name.clone());
        Ok(entry_name)
    }

    pub fn entry_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Writes the central directory and returns the finished archive. An
    /// assembler with no entries still yields a valid, empty zip.
    pub fn seal(self) -> Result<Vec<u8>, ArchiveError> {
        let cursor = self.writer.finish().map_err(ArchiveError::Seal)?;
        Ok(cursor.into_inner())
    }

    fn unique_name(&self, name: &str) -> String {
        if !self.taken.contains(name) {
            return name.to_string();
        }

        let base = basename(name);
        let ext = &name[base.len()..];

        (2..)
            .map(|counter| format!("{}_{}{}", base, counter, ext))
            .find(|candidate| !self.taken.contains(candidate))
            .unwrap_or_else(|| name.to_string())
    }
}

impl Default for ArchiveAssembler {
    fn default() -> Self {
        Self::open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_entries(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut contents = Vec::new();
                file.read_to_end(&mut contents).unwrap();
                (file.name().to_string(), contents)
            })
            .collect()
    }

    #[test]
    fn test_entries_round_trip() {
        let mut assembler = ArchiveAssembler::open();
        assembler.add_entry("a.webp", b"first").unwrap();
        assembler.add_entry("b.webp", b"second").unwrap();

        let entries = read_entries(assembler.seal().unwrap());
        assert_eq!(
            entries,
            vec![
                ("a.webp".to_string(), b"first".to_vec()),
                ("b.webp".to_string(), b"second".to_vec()),
            ]
        );
    }

    #[test]
    fn test_duplicate_names_get_suffix() {
        let mut assembler = ArchiveAssembler::open();

        assert_eq!(assembler.add_entry("scan.jpg", b"1").unwrap(), "scan.jpg");
        assert_eq!(assembler.add_entry("scan.jpg", b"2").unwrap(), "scan_2.jpg");
        assert_eq!(assembler.add_entry("scan.jpg", b"3").unwrap(), "scan_3.jpg");
        assert_eq!(assembler.add_entry("README", b"4").unwrap(), "README");
        assert_eq!(assembler.add_entry("README", b"5").unwrap(), "README_2");

        assert_eq!(assembler.len(), 5);
    }

    #[test]
    fn test_directory_components_stripped() {
        let mut assembler = ArchiveAssembler::open();

        let name = assembler.add_entry("../../outside.png", b"x").unwrap();
        assert_eq!(name, "outside.png");
        assert_eq!(assembler.entry_names(), &["outside.png".to_string()]);
    }

    #[test]
    fn test_empty_archive_seals() {
        let assembler = ArchiveAssembler::open();
        assert!(assembler.is_empty());

        let bytes = assembler.seal().unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn test_entries_are_deflated() {
        let mut assembler = ArchiveAssembler::open();
        assembler.add_entry("zeros.bin", &[0u8; 4096]).unwrap();

        let bytes = assembler.seal().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let file = archive.by_index(0).unwrap();

        assert_eq!(file.compression(), CompressionMethod::Deflated);
        assert!(file.compressed_size() < file.size());
    }
}

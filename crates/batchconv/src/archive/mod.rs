//! Zip assembly of a job's outputs and on-disk hand-off of the sealed archive.

pub mod assembler;
pub mod combine;
pub mod storage;

pub use assembler::ArchiveAssembler;
pub use combine::{merge_pdfs, COMBINED_PDF_NAME};
pub use storage::ArchiveStorage;

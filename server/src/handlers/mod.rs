pub mod form;
pub mod health;
pub mod index;
pub mod jobs;
pub mod optimize;

/// Attachment name of every archive the server hands out.
pub const ARCHIVE_DOWNLOAD_NAME: &str = "optimized_images.zip";

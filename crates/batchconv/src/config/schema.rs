use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory where sealed archives wait for their single download.
    #[serde(default = "default_archive_directory")]
    pub archive_directory: String,
    /// Upper bound on jobs converting at the same time. `None` = unbounded.
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
    /// Per-item conversion timeout. `None` = wait indefinitely.
    #[serde(default)]
    pub item_timeout_secs: Option<u64>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Resolution used when rasterising PDF pages to images.
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_archive_directory() -> String {
    std::env::temp_dir()
        .join("batchconv")
        .to_string_lossy()
        .to_string()
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_render_dpi() -> u32 {
    150
}

impl ServiceConfig {
    pub fn archive_path(&self) -> PathBuf {
        PathBuf::from(&self.archive_directory)
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            archive_directory: default_archive_directory(),
            max_concurrent_jobs: None,
            item_timeout_secs: None,
            max_upload_bytes: default_max_upload_bytes(),
            render_dpi: default_render_dpi(),
            ocr: OcrConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            dpi: default_dpi(),
        }
    }
}

/// External executables used by some conversion routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: String,
    #[serde(default = "default_pdfinfo")]
    pub pdfinfo: String,
    #[serde(default = "default_soffice")]
    pub soffice: String,
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

fn default_pdfinfo() -> String {
    "pdfinfo".to_string()
}

fn default_soffice() -> String {
    "soffice".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pdftoppm: default_pdftoppm(),
            pdfinfo: default_pdfinfo(),
            soffice: default_soffice(),
        }
    }
}

//! Stand-in OCR engine used when the "ocr" feature is disabled.
//!
//! Every recognition request reports the capability as unavailable so that
//! provider chains can fall through and record why.

use std::sync::Arc;

use crate::error::ConvertError;

#[derive(Clone)]
pub struct OcrEngine {
    inner: Arc<OcrEngineInner>,
}

struct OcrEngineInner {
    languages: String,
    dpi: u32,
}

impl OcrEngine {
    pub fn new(languages: &[String], dpi: u32) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(OcrEngineInner {
                languages: lang_str,
                dpi,
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        false
    }

    pub fn dpi(&self) -> u32 {
        self.inner.dpi
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }

    pub fn recognize(&self, _image_data: &[u8]) -> Result<String, ConvertError> {
        Err(ConvertError::Unavailable(
            "OCR support not compiled in (enable the \"ocr\" feature)".to_string(),
        ))
    }
}

use std::io::Cursor;
use std::sync::Arc;

use crate::error::ConvertError;

/// Tesseract-backed text recognition.
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
        true
    }

    pub fn dpi(&self) -> u32 {
        self.inner.dpi
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }

    pub fn recognize(&self, image_data: &[u8]) -> Result<String, ConvertError> {
        let _span = tracing::info_span!("converter.ocr").entered();

        let img = image::load_from_memory(image_data)
            .map_err(|e| ConvertError::Ocr(format!("Failed to load image: {}", e)))?;

        // leptess reads encoded images, so normalise to PNG first
        let mut png_data = Vec::new();
        img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
            .map_err(|e| ConvertError::Ocr(format!("Failed to convert image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.inner.languages)
            .map_err(|e| ConvertError::Ocr(format!("Failed to initialize Tesseract: {}", e)))?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ConvertError::Ocr(format!("Failed to set image for OCR: {}", e)))?;

        lt.get_utf8_text()
            .map_err(|e| ConvertError::Ocr(format!("Text recognition failed: {}", e)))
    }
}

use std::process::Command;

use crate::converter::docx::write_docx;
use crate::converter::image::{decode_image, RasterEncoder};
use crate::converter::provider::{ConversionProvider, ProviderChain, ProviderOutcome};
use crate::converter::render::run_tool;
use crate::converter::{
    ConvertOptions, ConvertedOutput, FormatConverter, OcrEngine, PageRenderer, SourceKind,
    TargetFormat,
};
use crate::error::ConvertError;

fn load_pdf(input: &[u8]) -> Result<lopdf::Document, ConvertError> {
    lopdf::Document::load_mem(input).map_err(|e| ConvertError::Pdf(format!("Failed to load PDF: {}", e)))
}

/// Renders each page and re-encodes it; one output per page.
pub struct PdfRasterConverter {
    renderer: PageRenderer,
    encoder: RasterEncoder,
    dpi: u32,
}

impl PdfRasterConverter {
    pub fn new(renderer: PageRenderer, dpi: u32) -> Self {
        Self {
            renderer,
            encoder: RasterEncoder::new(),
            dpi,
        }
    }
}

impl FormatConverter for PdfRasterConverter {
    fn name(&self) -> &'static str {
        "pdf-raster"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Pdf && target.is_raster()
    }

    fn convert(
        &self,
        input: &[u8],
        target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let _span = tracing::info_span!("converter.pdf_raster").entered();

        self.renderer
            .render_pages(input, self.dpi)?
            .iter()
            .map(|page| self.encoder.encode(decode_image(page)?, target, options))
            .collect()
    }
}

pub struct PdfRewriteConverter;

impl PdfRewriteConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfRewriteConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter for PdfRewriteConverter {
    fn name(&self) -> &'static str {
        "pdf-rewrite"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Pdf && target == TargetFormat::Pdf
    }

    fn convert(
        &self,
        input: &[u8],
        _target: TargetFormat,
        _options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let _span = tracing::info_span!("converter.pdf_rewrite").entered();

        let mut doc = load_pdf(input)?;
        doc.prune_objects();
        doc.compress();

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| ConvertError::Pdf(e.to_string()))?;

        Ok(vec![ConvertedOutput::new(buffer, "pdf")])
    }
}

/// PDF to DOCX, tried as an ordered chain: layout-preserving conversion
/// through LibreOffice, the embedded text layer, then OCR of rendered pages.
pub struct PdfDocxConverter {
    renderer: PageRenderer,
    ocr: OcrEngine,
    soffice: String,
}

impl PdfDocxConverter {
    pub fn new(renderer: PageRenderer, ocr: OcrEngine, soffice: &str) -> Self {
        Self {
            renderer,
            ocr,
            soffice: soffice.to_string(),
        }
    }

    fn chain(&self, options: &ConvertOptions) -> ProviderChain<[u8]> {
        ProviderChain::new()
            .with(LayoutProvider {
                soffice: self.soffice.clone(),
                enabled: options.preserve_layout,
            })
            .with(TextLayerProvider)
            .with(PageOcrProvider {
                renderer: self.renderer.clone(),
                ocr: self.ocr.clone(),
                enabled: options.ocr,
            })
    }
}

impl FormatConverter for PdfDocxConverter {
    fn name(&self) -> &'static str {
        "pdf-docx"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Pdf && target == TargetFormat::Docx
    }

    fn convert(
        &self,
        input: &[u8],
        _target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let _span = tracing::info_span!("converter.pdf_docx").entered();

        self.chain(options).run(input)
    }
}

struct LayoutProvider {
    soffice: String,
    enabled: bool,
}

impl LayoutProvider {
    fn convert(&self, input: &[u8]) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let dir = tempfile::Builder::new()
            .prefix("batchconv-soffice")
            .tempdir()
            .map_err(|e| ConvertError::Docx(format!("Failed to create scratch directory: {}", e)))?;

        let pdf_path = dir.path().join("input.pdf");
        std::fs::write(&pdf_path, input)
            .map_err(|e| ConvertError::Docx(format!("Failed to write temp PDF: {}", e)))?;

        let output = run_tool(
            Command::new(&self.soffice)
                .args(["--headless", "--infilter=writer_pdf_import", "--convert-to", "docx", "--outdir"])
                .arg(dir.path())
                .arg(&pdf_path),
            &self.soffice,
        )?;

        if !output.status.success() {
            return Err(ConvertError::Docx(format!(
                "{} exited with {}: {}",
                self.soffice,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let docx = std::fs::read(dir.path().join("input.docx"))
            .map_err(|e| ConvertError::Docx(format!("{} produced no document: {}", self.soffice, e)))?;

        Ok(vec![ConvertedOutput::new(docx, "docx")])
    }
}

impl ConversionProvider<[u8]> for LayoutProvider {
    fn name(&self) -> &'static str {
        "layout"
    }

    fn attempt(&self, input: &[u8]) -> ProviderOutcome {
        if !self.enabled {
            return ProviderOutcome::Unavailable("preserve_layout not requested".to_string());
        }
        ProviderOutcome::from_result(self.convert(input))
    }
}

struct TextLayerProvider;

impl ConversionProvider<[u8]> for TextLayerProvider {
    fn name(&self) -> &'static str {
        "text-layer"
    }

    fn attempt(&self, input: &[u8]) -> ProviderOutcome {
        let doc = match load_pdf(input) {
            Ok(doc) => doc,
            Err(e) => return ProviderOutcome::Failed(e.to_string()),
        };

        let text = extract_text_from_pdf(&doc);
        if text_layer_unusable(&text) {
            return ProviderOutcome::Failed("no usable text layer".to_string());
        }

        ProviderOutcome::from_result(
            write_docx(&text).map(|bytes| vec![ConvertedOutput::new(bytes, "docx")]),
        )
    }
}

struct PageOcrProvider {
    renderer: PageRenderer,
    ocr: OcrEngine,
    enabled: bool,
}

impl PageOcrProvider {
    fn recognize_pages(&self, input: &[u8]) -> Result<String, ConvertError> {
        let mut all_text = String::new();

        for (index, page) in self.renderer.render_pages(input, self.ocr.dpi())?.iter().enumerate() {
            match self.ocr.recognize(page) {
                Ok(page_text) => {
                    all_text.push_str(&page_text);
                    all_text.push('\n');
                }
                Err(e) => tracing::warn!(page = index + 1, "OCR failed for page: {}", e),
            }
        }

        Ok(all_text)
    }
}

impl ConversionProvider<[u8]> for PageOcrProvider {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn attempt(&self, input: &[u8]) -> ProviderOutcome {
        if !self.enabled {
            return ProviderOutcome::Unavailable("ocr not requested".to_string());
        }
        if !self.ocr.is_available() {
            return ProviderOutcome::Unavailable("OCR support not compiled in".to_string());
        }

        let text = match self.recognize_pages(input) {
            Ok(text) => text,
            Err(e) => return ProviderOutcome::from_result(Err(e)),
        };
        if text.trim().is_empty() {
            return ProviderOutcome::Failed("no text recognised".to_string());
        }

        ProviderOutcome::from_result(
            write_docx(&text).map(|bytes| vec![ConvertedOutput::new(bytes, "docx")]),
        )
    }
}

fn extract_text_from_pdf(doc: &lopdf::Document) -> String {
    let mut text = String::new();

    for (page_num, _) in doc.get_pages() {
        if let Ok(page_text) = doc.extract_text(&[page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }

    text
}

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Below this many characters the alphanumeric ratio is not checked.
const MIN_TOTAL_CHARS: usize = 50;

const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// True when extracted text is empty, consists only of undecodable-font
/// markers, or is mostly punctuation (garbled encoding).
fn text_layer_unusable(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}

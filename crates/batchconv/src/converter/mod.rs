//! The conversion capability used by the item worker.
//!
//! Each supported `(SourceKind, TargetFormat)` pair is a [`FormatConverter`]
//! route; [`ConverterRegistry`] dispatches to the first route that declares
//! support and fails closed for every other pair.

pub mod docx;
pub mod image;
pub mod pdf;
pub mod provider;
pub mod render;
pub mod text;

#[cfg(feature = "ocr")]
pub mod ocr;

#[cfg(not(feature = "ocr"))]
pub mod ocr_stub;

use std::fmt;
use std::io::Cursor;

#[cfg(feature = "ocr")]
pub use ocr::OcrEngine;

#[cfg(not(feature = "ocr"))]
pub use ocr_stub::OcrEngine;

pub use provider::{ConversionProvider, ProviderChain, ProviderOutcome};
pub use render::PageRenderer;

use crate::config::ServiceConfig;
use crate::error::ConvertError;

/// Kind of an uploaded input, decided once per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Image,
    Pdf,
    Docx,
    Text,
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

impl SourceKind {
    /// Infers the kind from the filename first and falls back to sniffing
    /// the content when the name says nothing useful.
    pub fn infer(name: &str, bytes: &[u8]) -> Option<Self> {
        Self::from_name(name).or_else(|| Self::sniff(bytes))
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let mime = mime_guess::from_path(name).first()?;

        if mime.type_() == mime_guess::mime::IMAGE {
            Some(Self::Image)
        } else if mime.essence_str() == "application/pdf" {
            Some(Self::Pdf)
        } else if mime.essence_str() == DOCX_MIME {
            Some(Self::Docx)
        } else if mime.type_() == mime_guess::mime::TEXT {
            Some(Self::Text)
        } else {
            None
        }
    }

    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        if bytes.starts_with(b"%PDF-") {
            return Some(Self::Pdf);
        }
        if ::image::guess_format(bytes).is_ok() {
            return Some(Self::Image);
        }
        if bytes.starts_with(b"PK\x03\x04") {
            let is_docx = zip::ZipArchive::new(Cursor::new(bytes))
                .map(|archive| archive.index_for_name("word/document.xml").is_some())
                .unwrap_or(false);
            return is_docx.then_some(Self::Docx);
        }
        if std::str::from_utf8(bytes).is_ok() {
            return Some(Self::Text);
        }
        None
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Output format requested for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetFormat {
    #[default]
    Webp,
    Jpeg,
    Png,
    Avif,
    Pdf,
    Docx,
}

impl TargetFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "webp" => Some(Self::Webp),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "avif" => Some(Self::Avif),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Reads the `format` form field. Missing or blank means the default;
    /// any value that is not a known format means JPEG.
    pub fn from_field(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::default(),
            Some(raw) => Self::parse(raw).unwrap_or(Self::Jpeg),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Avif => "avif",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Webp | Self::Jpeg | Self::Png | Self::Avif)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            other => other.extension(),
        };
        f.write_str(name)
    }
}

pub const DEFAULT_QUALITY: u8 = 85;

/// Transform parameters shared by every item of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Lossy encoder quality, always within 10..=100.
    pub quality: u8,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub ocr: bool,
    pub preserve_layout: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            max_width: None,
            max_height: None,
            ocr: false,
            preserve_layout: false,
        }
    }
}

impl ConvertOptions {
    /// Maps a raw quality field to a usable value. Anything missing,
    /// malformed or outside 10..=100 becomes the default.
    pub fn coerce_quality(raw: Option<&str>) -> u8 {
        raw.and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|quality| (10..=100).contains(quality))
            .map(|quality| quality as u8)
            .unwrap_or(DEFAULT_QUALITY)
    }

    /// Parses a dimension constraint. Zero, negative, empty or malformed
    /// values disable the constraint.
    pub fn parse_dimension(raw: Option<&str>) -> Option<u32> {
        raw.and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|dimension| *dimension > 0)
    }
}

/// One artifact produced by a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedOutput {
    pub bytes: Vec<u8>,
    /// Extension of the format actually produced, which can differ from the
    /// requested one when a fallback provider handled the request.
    pub extension: &'static str,
}

impl ConvertedOutput {
    pub fn new(bytes: Vec<u8>, extension: &'static str) -> Self {
        Self { bytes, extension }
    }
}

pub trait Converter: Send + Sync {
    fn convert(
        &self,
        input: &[u8],
        source: SourceKind,
        target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError>;
}

/// A single route of the dispatch table.
pub trait FormatConverter: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool;

    fn convert(
        &self,
        input: &[u8],
        target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError>;
}

pub struct ConverterRegistry {
    routes: Vec<Box<dyn FormatConverter>>,
}

impl ConverterRegistry {
    pub fn new(config: &ServiceConfig) -> Self {
        let ocr = OcrEngine::new(&config.ocr.languages, config.ocr.dpi);
        let renderer = PageRenderer::new(&config.tools.pdftoppm, &config.tools.pdfinfo);

        let routes: Vec<Box<dyn FormatConverter>> = vec![
            Box::new(image::ImageRasterConverter::new()),
            Box::new(image::ImagePdfConverter::new()),
            Box::new(image::ImageDocxConverter::new(ocr.clone())),
            Box::new(pdf::PdfRasterConverter::new(
                renderer.clone(),
                config.render_dpi,
            )),
            Box::new(pdf::PdfRewriteConverter::new()),
            Box::new(pdf::PdfDocxConverter::new(
                renderer,
                ocr,
                &config.tools.soffice,
            )),
            Box::new(docx::DocxPdfConverter::new()),
            Box::new(docx::DocxPassthroughConverter::new()),
            Box::new(text::TextPdfConverter::new()),
            Box::new(text::TextDocxConverter::new()),
        ];

        Self { routes }
    }

    pub fn with_routes(routes: Vec<Box<dyn FormatConverter>>) -> Self {
        Self { routes }
    }

    pub fn route_for(&self, source: SourceKind, target: TargetFormat) -> Option<&dyn FormatConverter> {
        self.routes
            .iter()
            .find(|route| route.supports(source, target))
            .map(|route| route.as_ref())
    }
}

impl Converter for ConverterRegistry {
    fn convert(
        &self,
        input: &[u8],
        source: SourceKind,
        target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let route = self
            .route_for(source, target)
            .ok_or(ConvertError::UnsupportedConversion {
                from: source,
                to: target,
            })?;

        let _span = tracing::info_span!(
            "converter.route",
            route = route.name(),
            %source,
            %target
        )
        .entered();

        let outputs = route.convert(input, target, options)?;
        if outputs.is_empty() {
            return Err(ConvertError::EmptyOutput);
        }

        Ok(outputs)
    }
}

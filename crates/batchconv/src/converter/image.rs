use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use lopdf::{dictionary, Document, Object, Stream};
use webp::{Encoder as WebpEncoder, WebPConfig};

use crate::converter::docx::write_docx;
use crate::converter::provider::{ConversionProvider, ProviderChain, ProviderOutcome};
use crate::converter::{
    ConvertOptions, ConvertedOutput, FormatConverter, OcrEngine, SourceKind, TargetFormat,
};
use crate::error::ConvertError;

/// US Letter in points.
const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const PAGE_MARGIN: f64 = 36.0;

pub fn decode_image(input: &[u8]) -> Result<DynamicImage, ConvertError> {
    image::load_from_memory(input).map_err(|e| ConvertError::Decode(e.to_string()))
}

/// Shrinks `img` proportionally so it fits the given bounds. Never upscales;
/// a missing bound leaves that axis unconstrained.
pub fn fit_within(img: DynamicImage, max_width: Option<u32>, max_height: Option<u32>) -> DynamicImage {
    let (width, height) = img.dimensions();
    let bound_width = max_width.unwrap_or(width).min(width);
    let bound_height = max_height.unwrap_or(height).min(height);

    if bound_width >= width && bound_height >= height {
        return img;
    }

    img.resize(bound_width, bound_height, FilterType::Lanczos3)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ConvertError::Encode(format!("JPEG: {}", e)))?;
    Ok(buffer)
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilter::Adaptive);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ConvertError::Encode(format!("PNG: {}", e)))?;
    Ok(buffer)
}

/// libwebp compression effort, 0 (fast) to 6 (smallest).
const WEBP_METHOD: i32 = 6;

/// Lossy WebP at the given quality. Alpha is kept when the source has it.
pub fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let (width, height) = img.dimensions();
    let mut config = WebPConfig::new()
        .map_err(|_| ConvertError::Encode("WebP: failed to initialise encoder".to_string()))?;
    config.quality = f32::from(quality);
    config.method = WEBP_METHOD;

    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        WebpEncoder::from_rgba(rgba.as_raw(), width, height).encode_advanced(&config)
    } else {
        let rgb = img.to_rgb8();
        WebpEncoder::from_rgb(rgb.as_raw(), width, height).encode_advanced(&config)
    };
    let memory = encoded.map_err(|e| ConvertError::Encode(format!("WebP: {:?}", e)))?;

    Ok(memory.to_vec())
}

#[cfg(feature = "avif")]
fn encode_avif(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    use image::codecs::avif::AvifEncoder;

    let mut buffer = Vec::new();
    let encoder = AvifEncoder::new_with_speed_quality(&mut buffer, 6, quality);
    img.to_rgba8()
        .write_with_encoder(encoder)
        .map_err(|e| ConvertError::Encode(format!("AVIF: {}", e)))?;
    Ok(buffer)
}

#[cfg(not(feature = "avif"))]
fn encode_avif(_img: &DynamicImage, _quality: u8) -> Result<Vec<u8>, ConvertError> {
    Err(ConvertError::Unavailable(
        "AVIF encoder not compiled in (enable the \"avif\" feature)".to_string(),
    ))
}

pub struct EncodeRequest {
    pub image: DynamicImage,
    pub quality: u8,
}

struct AvifProvider;

impl ConversionProvider<EncodeRequest> for AvifProvider {
    fn name(&self) -> &'static str {
        "avif"
    }

    fn attempt(&self, request: &EncodeRequest) -> ProviderOutcome {
        ProviderOutcome::from_result(
            encode_avif(&request.image, request.quality)
                .map(|bytes| vec![ConvertedOutput::new(bytes, "avif")]),
        )
    }
}

struct WebpFallbackProvider;

impl ConversionProvider<EncodeRequest> for WebpFallbackProvider {
    fn name(&self) -> &'static str {
        "webp"
    }

    fn attempt(&self, request: &EncodeRequest) -> ProviderOutcome {
        ProviderOutcome::from_result(
            encode_webp(&request.image, request.quality)
                .map(|bytes| vec![ConvertedOutput::new(bytes, "webp")]),
        )
    }
}

/// Re-encodes decoded images to one of the raster targets.
pub struct RasterEncoder {
    avif_chain: ProviderChain<EncodeRequest>,
}

impl RasterEncoder {
    pub fn new() -> Self {
        Self {
            avif_chain: ProviderChain::new()
                .with(AvifProvider)
                .with(WebpFallbackProvider),
        }
    }

    pub fn encode(
        &self,
        img: DynamicImage,
        target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<ConvertedOutput, ConvertError> {
        let img = fit_within(img, options.max_width, options.max_height);

        match target {
            TargetFormat::Jpeg => Ok(ConvertedOutput::new(
                encode_jpeg(&img, options.quality)?,
                target.extension(),
            )),
            TargetFormat::Png => Ok(ConvertedOutput::new(encode_png(&img)?, target.extension())),
            TargetFormat::Webp => Ok(ConvertedOutput::new(
                encode_webp(&img, options.quality)?,
                target.extension(),
            )),
            TargetFormat::Avif => {
                let request = EncodeRequest {
                    image: img,
                    quality: options.quality,
                };
                let mut outputs = self.avif_chain.run(&request)?;
                outputs.pop().ok_or(ConvertError::EmptyOutput)
            }
            TargetFormat::Pdf | TargetFormat::Docx => Err(ConvertError::UnsupportedConversion {
                from: SourceKind::Image,
                to: target,
            }),
        }
    }
}

impl Default for RasterEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ImageRasterConverter {
    encoder: RasterEncoder,
}

impl ImageRasterConverter {
    pub fn new() -> Self {
        Self {
            encoder: RasterEncoder::new(),
        }
    }
}

impl Default for ImageRasterConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter for ImageRasterConverter {
    fn name(&self) -> &'static str {
        "image-raster"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Image && target.is_raster()
    }

    fn convert(
        &self,
        input: &[u8],
        target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let _span = tracing::info_span!("converter.image").entered();

        let img = decode_image(input)?;
        Ok(vec![self.encoder.encode(img, target, options)?])
    }
}

pub struct ImagePdfConverter;

impl ImagePdfConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImagePdfConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter for ImagePdfConverter {
    fn name(&self) -> &'static str {
        "image-pdf"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Image && target == TargetFormat::Pdf
    }

    fn convert(
        &self,
        input: &[u8],
        _target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let _span = tracing::info_span!("converter.image_pdf").entered();

        let img = fit_within(decode_image(input)?, options.max_width, options.max_height);
        let pdf = create_image_pdf(&img, options.quality)?;
        Ok(vec![ConvertedOutput::new(pdf, "pdf")])
    }
}

/// Builds a one-page PDF with the image centred inside the page margins.
pub fn create_image_pdf(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let (width, height) = img.dimensions();
    let jpeg = encode_jpeg(img, quality)?;

    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let resources_id = doc.new_object_id();
    let content_id = doc.new_object_id();
    let page_id = doc.new_object_id();
    let image_id = doc.new_object_id();

    let image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    );
    doc.objects.insert(image_id, Object::Stream(image_stream));

    doc.objects.insert(
        resources_id,
        Object::Dictionary(dictionary! {
            "XObject" => dictionary! {
                "Im1" => image_id,
            },
        }),
    );

    let available_width = PAGE_WIDTH - 2.0 * PAGE_MARGIN;
    let available_height = PAGE_HEIGHT - 2.0 * PAGE_MARGIN;
    let scale = (available_width / width as f64).min(available_height / height as f64);

    let img_width = (width as f64 * scale) as i64;
    let img_height = (height as f64 * scale) as i64;
    let x = ((PAGE_WIDTH - img_width as f64) / 2.0) as i64;
    let y = ((PAGE_HEIGHT - img_height as f64) / 2.0) as i64;

    let content = format!(
        "q\n{} 0 0 {} {} {} cm\n/Im1 Do\nQ\n",
        img_width, img_height, x, y
    );
    doc.objects.insert(
        content_id,
        Object::Stream(Stream::new(dictionary! {}, content.into_bytes())),
    );

    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        }),
    );

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ConvertError::Pdf(e.to_string()))?;

    Ok(buffer)
}

struct ImageOcrProvider {
    ocr: OcrEngine,
}

impl ConversionProvider<[u8]> for ImageOcrProvider {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn attempt(&self, input: &[u8]) -> ProviderOutcome {
        let text = match self.ocr.recognize(input) {
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

/// Image to DOCX is only possible through text recognition.
pub struct ImageDocxConverter {
    chain: ProviderChain<[u8]>,
}

impl ImageDocxConverter {
    pub fn new(ocr: OcrEngine) -> Self {
        Self {
            chain: ProviderChain::new().with(ImageOcrProvider { ocr }),
        }
    }
}

impl FormatConverter for ImageDocxConverter {
    fn name(&self) -> &'static str {
        "image-docx"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Image && target == TargetFormat::Docx
    }

    fn convert(
        &self,
        input: &[u8],
        target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        if !options.ocr {
            return Err(ConvertError::UnsupportedConversion {
                from: SourceKind::Image,
                to: target,
            });
        }

        let _span = tracing::info_span!("converter.image_docx").entered();
        self.chain.run(input)
    }
}

//! Synchronous single-shot image conversion behind `POST /optimize`.
//!
//! No job, no progress: every upload is converted in order and the archive
//! is returned directly. Inputs that fail to convert are skipped.

use image::DynamicImage;
use log::{debug, info};

use crate::archive::ArchiveAssembler;
use crate::converter::image::{decode_image, encode_jpeg, encode_webp};
use crate::converter::DEFAULT_QUALITY;
use crate::error::{ConvertError, LegacyError};
use crate::job::JobInput;
use crate::sanitize::output_name;

/// Output format of the legacy endpoint. Anything but `webp` means JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyFormat {
    Webp,
    Jpeg,
}

impl LegacyFormat {
    pub fn from_field(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            None => Self::Webp,
            Some(v) if v == "webp" => Self::Webp,
            Some(_) => Self::Jpeg,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpg",
        }
    }
}

/// Converts every file and returns the sealed zip.
pub fn optimize_batch(files: &[JobInput], format: LegacyFormat) -> Result<Vec<u8>, LegacyError> {
    let _span = tracing::info_span!("legacy.optimize", files = files.len()).entered();

    if files.is_empty() {
        return Err(LegacyError::NoFiles);
    }

    let mut archive = ArchiveAssembler::open();

    for file in files {
        let bytes = match reencode(&file.bytes, format) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Skipping '{}': {}", file.name, e);
                continue;
            }
        };
        archive.add_entry(&output_name(&file.name, format.extension(), None), &bytes)?;
    }

    if archive.is_empty() {
        return Err(LegacyError::AllFailed);
    }

    info!("Optimized {}/{} images", archive.len(), files.len());
    Ok(archive.seal()?)
}

fn reencode(input: &[u8], format: LegacyFormat) -> Result<Vec<u8>, ConvertError> {
    let img = DynamicImage::ImageRgb8(decode_image(input)?.to_rgb8());

    match format {
        LegacyFormat::Webp => encode_webp(&img, DEFAULT_QUALITY),
        LegacyFormat::Jpeg => encode_jpeg(&img, DEFAULT_QUALITY),
    }
}

//! In-memory fixtures and converter doubles.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use batchconv::converter::docx::write_docx;
use batchconv::converter::text::create_text_pdf;
use batchconv::{ConvertError, ConvertOptions, ConvertedOutput, Converter, JobInput, SourceKind, TargetFormat};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    buffer.into_inner()
}

pub fn pdf_bytes(text: &str) -> Vec<u8> {
    create_text_pdf(text).expect("Failed to build PDF fixture")
}

pub fn docx_bytes(text: &str) -> Vec<u8> {
    write_docx(text).expect("Failed to build DOCX fixture")
}

pub fn png_input(name: &str) -> JobInput {
    JobInput::new(name, png_bytes(16, 12))
}

pub fn corrupt_input(name: &str) -> JobInput {
    // PNG signature followed by garbage
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(b"definitely not image data");
    JobInput::new(name, bytes)
}

pub fn text_input(name: &str, body: &str) -> JobInput {
    JobInput::new(name, body.as_bytes().to_vec())
}

/// Converter whose behaviour is driven by the input bytes:
/// `fail:<msg>` errors, `sleep:<ms>` waits first, anything else echoes.
/// Records the options of every call.
#[derive(Default)]
pub struct ScriptedConverter {
    seen: Mutex<Vec<ConvertOptions>>,
}

impl ScriptedConverter {
    pub fn seen_options(&self) -> Vec<ConvertOptions> {
        self.seen.lock().unwrap().clone()
    }
}

impl Converter for ScriptedConverter {
    fn convert(
        &self,
        input: &[u8],
        _source: SourceKind,
        target: TargetFormat,
        options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        self.seen.lock().unwrap().push(options.clone());

        let script = String::from_utf8_lossy(input);
        if let Some(message) = script.strip_prefix("fail:") {
            return Err(ConvertError::Decode(message.to_string()));
        }
        if let Some(ms) = script.strip_prefix("sleep:") {
            let ms: u64 = ms.trim().parse().unwrap_or(10);
            std::thread::sleep(Duration::from_millis(ms));
        }

        Ok(vec![ConvertedOutput::new(input.to_vec(), target.extension())])
    }
}

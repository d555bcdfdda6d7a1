use lopdf::{dictionary, Document, Object, Stream};

use crate::converter::docx::write_docx;
use crate::converter::{ConvertOptions, ConvertedOutput, FormatConverter, SourceKind, TargetFormat};
use crate::error::ConvertError;

const LINES_PER_PAGE: usize = 50;

pub struct TextPdfConverter;

impl TextPdfConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextPdfConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter for TextPdfConverter {
    fn name(&self) -> &'static str {
        "text-pdf"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Text && target == TargetFormat::Pdf
    }

    fn convert(
        &self,
        input: &[u8],
        _target: TargetFormat,
        _options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let _span = tracing::info_span!("converter.text_pdf").entered();

        let text = String::from_utf8_lossy(input);
        Ok(vec![ConvertedOutput::new(create_text_pdf(&text)?, "pdf")])
    }
}

pub struct TextDocxConverter;

impl TextDocxConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextDocxConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter for TextDocxConverter {
    fn name(&self) -> &'static str {
        "text-docx"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Text && target == TargetFormat::Docx
    }

    fn convert(
        &self,
        input: &[u8],
        _target: TargetFormat,
        _options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let _span = tracing::info_span!("converter.text_docx").entered();

        let text = String::from_utf8_lossy(input);
        Ok(vec![ConvertedOutput::new(write_docx(&text)?, "docx")])
    }
}

/// Lays plain text out on Letter pages, `LINES_PER_PAGE` lines each, using
/// a built-in Helvetica font. Always produces at least one page.
pub fn create_text_pdf(text: &str) -> Result<Vec<u8>, ConvertError> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.new_object_id();
    let resources_id = doc.new_object_id();

    doc.objects.insert(
        font_id,
        Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        }),
    );

    doc.objects.insert(
        resources_id,
        Object::Dictionary(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        }),
    );

    let lines: Vec<&str> = text.lines().collect();
    let page_count = lines.len().div_ceil(LINES_PER_PAGE).max(1);

    let mut page_ids = Vec::with_capacity(page_count);

    for page_num in 0..page_count {
        let start_line = page_num * LINES_PER_PAGE;
        let end_line = ((page_num + 1) * LINES_PER_PAGE).min(lines.len());
        let page_lines = if start_line < lines.len() {
            &lines[start_line..end_line]
        } else {
            &[]
        };

        let content_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        let content = format_text_for_pdf(page_lines);
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

        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| (*id).into()).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
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

fn format_text_for_pdf(lines: &[&str]) -> String {
    let mut content = String::new();
    content.push_str("BT\n");
    content.push_str("/F1 11 Tf\n");
    content.push_str("50 742 Td\n");
    content.push_str("14 TL\n");

    for line in lines {
        content.push_str(&format!("({}) Tj T*\n", escape_pdf_string(line)));
    }

    content.push_str("ET\n");
    content
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            '\t' => "    ".to_string(),
            c if c.is_ascii() && !c.is_control() => c.to_string(),
            // Type1 base fonts only cover ASCII here
            _ => "?".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_text_pairs() {
        assert!(TextPdfConverter::new().supports(SourceKind::Text, TargetFormat::Pdf));
        assert!(!TextPdfConverter::new().supports(SourceKind::Docx, TargetFormat::Pdf));
        assert!(TextDocxConverter::new().supports(SourceKind::Text, TargetFormat::Docx));
        assert!(!TextDocxConverter::new().supports(SourceKind::Text, TargetFormat::Png));
    }

    #[test]
    fn test_text_pdf_paginates() {
        let text: String = (0..120).map(|i| format!("line {}\n", i)).collect();

        let pdf = create_text_pdf(&text).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();

        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_empty_text_still_has_a_page() {
        let pdf = create_text_pdf("").unwrap();
        let doc = Document::load_mem(&pdf).unwrap();

        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_text_pdf_is_extractable() {
        let pdf = create_text_pdf("Quarterly report").unwrap();
        let doc = Document::load_mem(&pdf).unwrap();

        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("Quarterly report"));
    }

    #[test]
    fn test_escape_pdf_string() {
        assert_eq!(escape_pdf_string("a(b)c\\"), "a\\(b\\)c\\\\");
        assert_eq!(escape_pdf_string("caf\u{e9}"), "caf?");
    }

    #[test]
    fn test_text_to_docx() {
        let outputs = TextDocxConverter::new()
            .convert(b"Hello\nWorld", TargetFormat::Docx, &ConvertOptions::default())
            .unwrap();

        assert_eq!(outputs[0].extension, "docx");
        assert!(outputs[0].bytes.starts_with(b"PK"));
    }
}

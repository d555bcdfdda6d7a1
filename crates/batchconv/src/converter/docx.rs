use std::io::{Cursor, Read, Seek, Write};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesRef, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::converter::text::create_text_pdf;
use crate::converter::{ConvertOptions, ConvertedOutput, FormatConverter, SourceKind, TargetFormat};
use crate::error::ConvertError;

const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

pub struct DocxPdfConverter;

impl DocxPdfConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxPdfConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter for DocxPdfConverter {
    fn name(&self) -> &'static str {
        "docx-pdf"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Docx && target == TargetFormat::Pdf
    }

    fn convert(
        &self,
        input: &[u8],
        _target: TargetFormat,
        _options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        let _span = tracing::info_span!("converter.docx_pdf").entered();

        let text = read_docx_text(input)?;
        Ok(vec![ConvertedOutput::new(create_text_pdf(&text)?, "pdf")])
    }
}

/// DOCX to DOCX keeps the original bytes once they are known to be a
/// readable document.
pub struct DocxPassthroughConverter;

impl DocxPassthroughConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxPassthroughConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter for DocxPassthroughConverter {
    fn name(&self) -> &'static str {
        "docx-passthrough"
    }

    fn supports(&self, source: SourceKind, target: TargetFormat) -> bool {
        source == SourceKind::Docx && target == TargetFormat::Docx
    }

    fn convert(
        &self,
        input: &[u8],
        _target: TargetFormat,
        _options: &ConvertOptions,
    ) -> Result<Vec<ConvertedOutput>, ConvertError> {
        read_docx_text(input)?;
        Ok(vec![ConvertedOutput::new(input.to_vec(), "docx")])
    }
}

pub fn read_docx_text(input: &[u8]) -> Result<String, ConvertError> {
    let mut archive = ZipArchive::new(Cursor::new(input))
        .map_err(|e| ConvertError::Docx(format!("Failed to open DOCX: {}", e)))?;

    extract_docx_text(&mut archive)
}

fn extract_docx_text<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, ConvertError> {
    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| ConvertError::Docx(format!("Failed to find document.xml: {}", e)))?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| ConvertError::Docx(format!("Failed to read document.xml: {}", e)))?;

    parse_docx_xml(&xml_content)
}

fn parse_docx_xml(xml: &str) -> Result<String, ConvertError> {
    // No trimming: whitespace inside <w:t> is content.
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;
    let mut in_paragraph = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = true,
                b"p" => in_paragraph = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" if in_paragraph => text.push('\t'),
                b"br" if in_paragraph => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" if in_paragraph => {
                    text.push('\n');
                    in_paragraph = false;
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_element => {
                let decoded = e
                    .decode()
                    .map_err(|e| ConvertError::Docx(format!("Invalid text encoding: {}", e)))?;
                text.push_str(&decoded);
            }
            Ok(Event::GeneralRef(e)) if in_text_element => {
                text.push_str(&resolve_reference(&e)?);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ConvertError::Docx(format!("XML parsing error: {}", e)));
            }
            _ => {}
        }
    }

    Ok(text)
}

/// Expands `&amp;`-style and numeric (`&#38;`, `&#x26;`) references. An
/// unknown named entity is kept verbatim.
fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, ConvertError> {
    let char_ref = reference
        .resolve_char_ref()
        .map_err(|e| ConvertError::Docx(format!("Invalid character reference: {}", e)))?;
    if let Some(ch) = char_ref {
        return Ok(ch.to_string());
    }

    let name = reference
        .decode()
        .map_err(|e| ConvertError::Docx(format!("Invalid entity name: {}", e)))?;
    Ok(match resolve_predefined_entity(&name) {
        Some(value) => value.to_string(),
        None => format!("&{};", name),
    })
}

fn xml_err(e: impl std::fmt::Display) -> ConvertError {
    ConvertError::Docx(format!("Failed to build document.xml: {}", e))
}

/// Writes a minimal WordprocessingML package with one paragraph per line.
pub fn write_docx(text: &str) -> Result<Vec<u8>, ConvertError> {
    let document_xml = build_document_xml(text)?;

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, contents) in [
            ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
            ("_rels/.rels", PACKAGE_RELS_XML.as_bytes()),
            ("word/document.xml", document_xml.as_slice()),
        ] {
            zip.start_file(name, options)
                .map_err(|e| ConvertError::Docx(format!("Failed to add {}: {}", name, e)))?;
            zip.write_all(contents)
                .map_err(|e| ConvertError::Docx(format!("Failed to write {}: {}", name, e)))?;
        }

        zip.finish()
            .map_err(|e| ConvertError::Docx(format!("Failed to finish DOCX: {}", e)))?;
    }

    Ok(buffer.into_inner())
}

fn build_document_xml(text: &str) -> Result<Vec<u8>, ConvertError> {
    let mut writer = Writer::new(Vec::new());

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("w:document").with_attributes([("xmlns:w", WORDML_NS)]),
        ))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("w:body")))
        .map_err(xml_err)?;

    for line in text.lines() {
        writer
            .write_event(Event::Start(BytesStart::new("w:p")))
            .map_err(xml_err)?;
        if !line.is_empty() {
            writer
                .write_event(Event::Start(BytesStart::new("w:r")))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Start(
                    BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
                ))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(line)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("w:t")))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("w:r")))
                .map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("w:p")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("w:body")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("w:document")))
        .map_err(xml_err)?;

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_docx_pairs() {
        assert!(DocxPdfConverter::new().supports(SourceKind::Docx, TargetFormat::Pdf));
        assert!(!DocxPdfConverter::new().supports(SourceKind::Pdf, TargetFormat::Pdf));
        assert!(DocxPassthroughConverter::new().supports(SourceKind::Docx, TargetFormat::Docx));
        assert!(!DocxPassthroughConverter::new().supports(SourceKind::Docx, TargetFormat::Webp));
    }

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
            <w:body>
                <w:p>
                    <w:r>
                        <w:t>Hello World</w:t>
                    </w:r>
                </w:p>
            </w:body>
        </w:document>"#;

        let text = parse_docx_xml(xml).unwrap();
        assert!(text.contains("Hello World"));
    }

    #[test]
    fn test_parse_keeps_entities_and_spaces() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
            <w:body>
                <w:p><w:r><w:t>Smith &amp; Sons &lt;Ltd&gt;</w:t></w:r></w:p>
                <w:p><w:r><w:t xml:space="preserve">  indented &#38; &#x41;BC </w:t></w:r></w:p>
                <w:p><w:r><w:t>Price &quot;net&quot; &apos;24</w:t></w:r></w:p>
            </w:body>
        </w:document>"#;

        let text = parse_docx_xml(xml).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines,
            vec!["Smith & Sons <Ltd>", "  indented & ABC ", "Price \"net\" '24"]
        );
    }

    #[test]
    fn test_written_docx_keeps_markup_characters() {
        let bytes = write_docx("R&D <draft> \"final\"").unwrap();

        assert_eq!(read_docx_text(&bytes).unwrap(), "R&D <draft> \"final\"\n");
    }

    #[test]
    fn test_written_docx_reads_back() {
        let bytes = write_docx("First paragraph\n\nThird paragraph").unwrap();

        let text = read_docx_text(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["First paragraph", "", "Third paragraph"]);
    }

    #[test]
    fn test_written_docx_has_package_parts() {
        let bytes = write_docx("x").unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        assert!(archive.index_for_name("[Content_Types].xml").is_some());
        assert!(archive.index_for_name("_rels/.rels").is_some());
        assert!(archive.index_for_name("word/document.xml").is_some());
    }

    #[test]
    fn test_docx_to_pdf() {
        let docx = write_docx("Meeting notes").unwrap();

        let outputs = DocxPdfConverter::new()
            .convert(&docx, TargetFormat::Pdf, &ConvertOptions::default())
            .unwrap();

        assert_eq!(outputs[0].extension, "pdf");
        assert!(outputs[0].bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_passthrough_keeps_bytes() {
        let docx = write_docx("unchanged").unwrap();

        let outputs = DocxPassthroughConverter::new()
            .convert(&docx, TargetFormat::Docx, &ConvertOptions::default())
            .unwrap();

        assert_eq!(outputs[0].bytes, docx);
    }

    #[test]
    fn test_corrupt_docx_rejected() {
        let result = DocxPassthroughConverter::new().convert(
            b"PK not really a zip",
            TargetFormat::Docx,
            &ConvertOptions::default(),
        );

        assert!(matches!(result, Err(ConvertError::Docx(_))));
    }
}

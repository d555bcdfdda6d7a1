//! PDF page rasterisation through poppler's command-line tools.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output};

use crate::error::ConvertError;

#[derive(Debug, Clone)]
pub struct PageRenderer {
    pdftoppm: String,
    pdfinfo: String,
}

impl PageRenderer {
    pub fn new(pdftoppm: &str, pdfinfo: &str) -> Self {
        Self {
            pdftoppm: pdftoppm.to_string(),
            pdfinfo: pdfinfo.to_string(),
        }
    }

    /// Counts pages with lopdf, falling back to `pdfinfo` for files lopdf
    /// cannot parse (broken cross-reference tables and the like).
    pub fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ConvertError> {
        match lopdf::Document::load_mem(pdf_bytes) {
            Ok(doc) => Ok(doc.get_pages().len()),
            Err(e) => {
                tracing::warn!("lopdf failed to parse PDF: {}. Asking pdfinfo.", e);
                let dir = scratch_dir()?;
                let pdf_path = dir.path().join("input.pdf");
                write_input(&pdf_path, pdf_bytes)?;
                self.count_with_pdfinfo(&pdf_path)
            }
        }
    }

    /// Renders every page to PNG, in page order.
    pub fn render_pages(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, ConvertError> {
        let _span = tracing::info_span!("converter.render", dpi).entered();

        let dir = scratch_dir()?;
        let pdf_path = dir.path().join("input.pdf");
        write_input(&pdf_path, pdf_bytes)?;

        let page_count = match lopdf::Document::load_mem(pdf_bytes) {
            Ok(doc) => doc.get_pages().len(),
            Err(_) => self.count_with_pdfinfo(&pdf_path)?,
        };

        if page_count == 0 {
            return Err(ConvertError::Render("PDF has no pages".to_string()));
        }

        let mut pages = Vec::with_capacity(page_count);
        for page_num in 1..=page_count {
            let prefix = dir.path().join(format!("page-{}", page_num));
            self.render_page(&pdf_path, &prefix, page_num, dpi)?;

            let image_path = prefix.with_extension("png");
            let image_data = std::fs::read(&image_path).map_err(|e| {
                ConvertError::Render(format!("Failed to read rendered page {}: {}", page_num, e))
            })?;
            pages.push(image_data);
        }

        Ok(pages)
    }

    fn render_page(
        &self,
        pdf_path: &Path,
        prefix: &Path,
        page_num: usize,
        dpi: u32,
    ) -> Result<(), ConvertError> {
        let page = page_num.to_string();
        let output = run_tool(
            Command::new(&self.pdftoppm)
                .args(["-png", "-singlefile", "-r", &dpi.to_string(), "-f", &page, "-l", &page])
                .arg(pdf_path)
                .arg(prefix),
            &self.pdftoppm,
        )?;

        if !output.status.success() {
            return Err(ConvertError::Render(format!(
                "{} failed on page {}: {}",
                self.pdftoppm,
                page_num,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }

    fn count_with_pdfinfo(&self, pdf_path: &Path) -> Result<usize, ConvertError> {
        let output = run_tool(Command::new(&self.pdfinfo).arg(pdf_path), &self.pdfinfo)?;

        if !output.status.success() {
            return Err(ConvertError::Pdf(format!(
                "{} failed: {}",
                self.pdfinfo,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            ConvertError::Pdf(format!("{} did not report a page count", self.pdfinfo))
        })
    }
}

fn scratch_dir() -> Result<tempfile::TempDir, ConvertError> {
    tempfile::Builder::new()
        .prefix("batchconv-render")
        .tempdir()
        .map_err(|e| ConvertError::Render(format!("Failed to create scratch directory: {}", e)))
}

fn write_input(path: &Path, pdf_bytes: &[u8]) -> Result<(), ConvertError> {
    std::fs::write(path, pdf_bytes)
        .map_err(|e| ConvertError::Render(format!("Failed to write temp PDF: {}", e)))
}

/// A missing executable is reported as unavailable rather than failed.
pub(crate) fn run_tool(command: &mut Command, tool: &str) -> Result<Output, ConvertError> {
    command.output().map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConvertError::Unavailable(format!("{} is not installed", tool)),
        _ => ConvertError::Render(format!("Failed to run {}: {}", tool, e)),
    })
}

fn parse_pdfinfo_pages(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix("Pages:"))
        .find_map(|count| count.trim().parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object};

    fn blank_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                })
                .into()
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_page_count_with_lopdf() {
        let renderer = PageRenderer::new("pdftoppm", "pdfinfo");
        assert_eq!(renderer.page_count(&blank_pdf(3)).unwrap(), 3);
    }

    #[test]
    fn test_parse_pdfinfo_pages() {
        let stdout = "Title:          report\nProducer:       test\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_pdfinfo_pages(stdout), Some(12));
        assert_eq!(parse_pdfinfo_pages("Title: x\n"), None);
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let renderer = PageRenderer::new(
            "batchconv-no-such-pdftoppm",
            "batchconv-no-such-pdfinfo",
        );

        let result = renderer.page_count(b"%PDF-1.4 garbage that lopdf rejects");
        assert!(matches!(result, Err(ConvertError::Unavailable(_))));

        let result = renderer.render_pages(&blank_pdf(1), 72);
        assert!(matches!(result, Err(ConvertError::Unavailable(_))));
    }
}

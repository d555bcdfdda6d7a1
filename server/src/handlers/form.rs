//! Multipart parsing shared by the upload endpoints.

use std::collections::HashMap;

use axum::extract::Multipart;

use batchconv::{ConvertOptions, JobInput, JobOptions, TargetFormat};

use crate::error::{AppError, AppResult};

const FILES_FIELD: &str = "files";

/// Item name for a file part sent without a filename.
const UNNAMED_UPLOAD: &str = "image";

/// An upload form: the `files` parts plus every other field as text.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<JobInput>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn from_multipart(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == FILES_FIELD {
                let filename = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;

                // browsers send an empty part when nothing was selected
                if filename.is_none() && data.is_empty() {
                    continue;
                }
                let filename = filename.unwrap_or_else(|| UNNAMED_UPLOAD.to_string());
                form.files.push(JobInput::new(filename, data.to_vec()));
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn flag(&self, name: &str) -> bool {
        matches!(
            self.field(name).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "on" | "yes")
        )
    }

    /// Job options from the form fields. Nothing is rejected: an unknown
    /// `format` means JPEG and malformed numbers fall back to their defaults.
    pub fn job_options(&self) -> JobOptions {
        let target = TargetFormat::from_field(self.field("format"));

        let convert = ConvertOptions {
            quality: ConvertOptions::coerce_quality(self.field("quality")),
            max_width: ConvertOptions::parse_dimension(self.field("max_width")),
            max_height: ConvertOptions::parse_dimension(self.field("max_height")),
            ocr: self.flag("ocr"),
            preserve_layout: self.flag("preserve_layout"),
        };

        JobOptions::new(target, convert, self.flag("combine_pdf"))
    }
}

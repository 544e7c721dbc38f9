//! Form registry
//!
//! One directory per form id under `forms_dir`:
//!
//! ```text
//! {forms_dir}/{form_id}/form.pdf
//! {forms_dir}/{form_id}/labels_{lang}.json   externally produced guidance
//! {forms_dir}/{form_id}/cache_{lang}.json    persisted enriched schema
//! ```

use crate::error::ApiError;
use formfill_core::{extract_fields, write_atomic, ExtractOptions, Extraction};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

lazy_static! {
    static ref SAFE_ID: Regex = Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").unwrap();
}

const FORM_FILE: &str = "form.pdf";

/// Reject ids that could escape `forms_dir`
pub fn validate_id(kind: &str, id: &str) -> Result<(), ApiError> {
    if !SAFE_ID.is_match(id) || id.contains("..") || id == "." {
        return Err(ApiError::InvalidRequest(format!("invalid {} '{}'", kind, id)));
    }
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Outcome of storing a form
#[derive(Debug)]
pub struct StoredForm {
    pub sha256: String,
    pub page_count: u32,
    pub extraction: Extraction,
}

#[derive(Debug, Clone)]
pub struct FormRegistry {
    forms_dir: PathBuf,
}

impl FormRegistry {
    pub fn new(forms_dir: impl Into<PathBuf>) -> Self {
        Self {
            forms_dir: forms_dir.into(),
        }
    }

    pub fn form_dir(&self, form_id: &str) -> PathBuf {
        self.forms_dir.join(form_id)
    }

    pub fn form_path(&self, form_id: &str) -> PathBuf {
        self.form_dir(form_id).join(FORM_FILE)
    }

    pub fn labels_path(&self, form_id: &str, language: &str) -> PathBuf {
        self.form_dir(form_id).join(format!("labels_{}.json", language))
    }

    pub fn cache_path(&self, form_id: &str, language: &str) -> PathBuf {
        self.form_dir(form_id).join(format!("cache_{}.json", language))
    }

    /// Read a registered form's bytes
    pub async fn load(&self, form_id: &str) -> Result<Arc<Vec<u8>>, ApiError> {
        validate_id("form id", form_id)?;
        match tokio::fs::read(self.form_path(form_id)).await {
            Ok(bytes) => Ok(Arc::new(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ApiError::FormNotFound(form_id.to_string()))
            }
            Err(e) => Err(formfill_core::FormFillError::Io(e).into()),
        }
    }

    /// Validate `bytes` by extracting its fields, then store it atomically.
    /// Replacing a form also drops its persisted schema caches.
    pub async fn store(
        &self,
        form_id: &str,
        bytes: Vec<u8>,
        options: ExtractOptions,
    ) -> Result<StoredForm, ApiError> {
        validate_id("form id", form_id)?;
        let dest = self.form_path(form_id);
        let form_dir = self.form_dir(form_id);

        let stored = tokio::task::spawn_blocking(move || {
            let extraction = extract_fields(&bytes, options)?;
            write_atomic(&dest, &bytes)?;
            remove_schema_caches(&form_dir);
            Ok::<_, formfill_core::FormFillError>(StoredForm {
                sha256: sha256_hex(&bytes),
                page_count: extraction.page_count,
                extraction,
            })
        })
        .await??;

        tracing::info!(
            form_id = %form_id,
            sha256 = %stored.sha256,
            pages = stored.page_count,
            widgets = stored.extraction.widgets.len(),
            "Stored form"
        );
        Ok(stored)
    }
}

fn remove_schema_caches(form_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(form_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("cache_") && name.ends_with(".json") {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(path = %entry.path().display(), "could not remove schema cache: {}", e);
            }
        }
    }
}

//! Request and response bodies for the formfill API

use chrono::{DateTime, Utc};
use formfill_core::{
    ExtractWarning, Progress, SchemaField, SessionState, SkippedAnswer, Validation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_LANGUAGE: &str = "en";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub sessions: usize,
    pub schemas_computed: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub form_id: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub form_id: String,
    pub language: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub total_pages: usize,
    pub fields: Vec<SchemaField>,
    pub answers: BTreeMap<String, String>,
    pub progress: Progress,
}

/// One question per page
#[derive(Debug, Serialize)]
pub struct FillPageResponse {
    pub session_id: String,
    pub current_page: usize,
    pub total_pages: usize,
    pub field: SchemaField,
    /// Answer already given for this field, if any
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub session_id: String,
    pub field_id: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub success: bool,
    pub field_id: String,
    #[serde(flatten)]
    pub progress: Progress,
}

#[derive(Debug, Serialize)]
pub struct ClearAnswersResponse {
    pub success: bool,
    pub session_id: String,
    pub state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub session_id: String,
    pub state: SessionState,
    #[serde(flatten)]
    pub validation: Validation,
    pub can_generate: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub session_id: String,
    pub artifact_path: String,
    pub document_url: String,
    pub validation: Validation,
    pub filled_fields: Vec<String>,
    /// Answer keys that were not written: rejected at submission or
    /// skipped by the writer
    pub skipped_fields: Vec<String>,
    pub skipped: Vec<SkippedAnswer>,
}

#[derive(Debug, Serialize)]
pub struct FormUploadResponse {
    pub success: bool,
    pub form_id: String,
    pub sha256: String,
    pub page_count: u32,
    pub widget_count: usize,
    pub has_form: bool,
    pub warnings: Vec<ExtractWarning>,
}

#[derive(Debug, Deserialize)]
pub struct SchemaQuery {
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FormSchemaResponse {
    pub form_id: String,
    pub language: String,
    pub total_pages: usize,
    pub fields: Vec<SchemaField>,
}

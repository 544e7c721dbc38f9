//! HTTP handlers for the formfill API

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use formfill_core::{fill_to_path, FormFillError, Session};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::forms::validate_id;
use crate::models::*;
use crate::state::AppState;

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "formfill-api",
        sessions: state.sessions.len().await,
        schemas_computed: state.schemas.computations(),
    })
}

/// Store (or replace) a form document
pub async fn upload_form(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    body: Bytes,
) -> Result<Json<FormUploadResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::InvalidRequest("empty document body".into()));
    }
    let stored = state
        .forms
        .store(&form_id, body.to_vec(), state.extract_options())
        .await?;

    Ok(Json(FormUploadResponse {
        success: true,
        form_id,
        sha256: stored.sha256,
        page_count: stored.page_count,
        widget_count: stored.extraction.widgets.len(),
        has_form: stored.extraction.has_form,
        warnings: stored.extraction.warnings,
    }))
}

/// Enriched schema of a registered form
pub async fn form_schema(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    Query(query): Query<SchemaQuery>,
) -> Result<Json<FormSchemaResponse>, ApiError> {
    let language = query.lang.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    validate_id("language", &language)?;

    let document = state.forms.load(&form_id).await?;
    let schema = state
        .schemas
        .schema(&form_id, &language, document, state.extract_options())
        .await?;

    Ok(Json(FormSchemaResponse {
        form_id,
        language,
        total_pages: schema.len(),
        fields: schema.rows(),
    }))
}

/// Start a filling session on a registered form
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    validate_id("language", &req.language)?;
    let document = state.forms.load(&req.form_id).await?;
    let schema = state
        .schemas
        .schema(&req.form_id, &req.language, document.clone(), state.extract_options())
        .await?;

    let mut session = Session::new(Uuid::new_v4().to_string(), req.form_id, req.language);
    session.attach_schema((*schema).clone())?;

    let entry = state.sessions.insert(session, document).await;
    entry.read(session_response).await.map(Json)
}

/// Get session by ID
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let entry = state.sessions.get(&id).await?;
    entry.read(session_response).await.map(Json)
}

/// One field of the session's schema, 1-based
pub async fn fill_page(
    State(state): State<Arc<AppState>>,
    Path((id, page_num)): Path<(String, usize)>,
) -> Result<Json<FillPageResponse>, ApiError> {
    let entry = state.sessions.get(&id).await?;
    entry
        .read(|session| -> Result<Json<FillPageResponse>, ApiError> {
            let schema = session.schema()?;
            let page = schema.page(page_num).ok_or(ApiError::PageOutOfRange {
                page: page_num,
                total: schema.len(),
            })?;
            Ok(Json(FillPageResponse {
                session_id: session.session_id.clone(),
                answer: session.answers().get(&page.field.field_id).cloned(),
                current_page: page.current_page,
                total_pages: page.total_pages,
                field: page.field,
            }))
        })
        .await
}

/// Record one answer
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, ApiError> {
    let entry = state.sessions.get(&req.session_id).await?;
    let progress = entry
        .update(|session| session.submit_answer(&req.field_id, req.answer))
        .await?;

    tracing::debug!(
        session_id = %req.session_id,
        field_id = %req.field_id,
        completion = progress.completion_percentage,
        "Answer recorded"
    );
    Ok(Json(SubmitAnswerResponse {
        success: true,
        field_id: req.field_id,
        progress,
    }))
}

pub async fn clear_answers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ClearAnswersResponse>, ApiError> {
    let entry = state.sessions.get(&id).await?;
    let session_state = entry
        .update(|session| session.clear_answers().map(|()| session.state()))
        .await?;

    Ok(Json(ClearAnswersResponse {
        success: true,
        session_id: id,
        state: session_state,
    }))
}

pub async fn validate_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ValidationResponse>, ApiError> {
    let entry = state.sessions.get(&id).await?;
    entry
        .update(|session| -> Result<Json<ValidationResponse>, ApiError> {
            let validation = session.validate()?;
            Ok(Json(ValidationResponse {
                session_id: session.session_id.clone(),
                state: session.state(),
                validation,
                can_generate: session.can_generate(),
            }))
        })
        .await
}

/// Write the session's answers into a fresh copy of its form
pub async fn generate_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let entry = state.sessions.get(&id).await?;
    let _generation = entry.generation_lock().await;

    let (answers, rejected) = entry
        .read(|session| {
            Ok::<_, FormFillError>((
                session.generation_answers()?,
                session.rejected_keys().clone(),
            ))
        })
        .await?;

    let dest = state.output_path(&id);
    let document = entry.document();
    let report = {
        let dest = dest.clone();
        tokio::task::spawn_blocking(move || fill_to_path(&document, &answers, &dest)).await??
    };

    let validation = entry
        .update(|session| {
            session.mark_generated(dest.clone());
            session.validation()
        })
        .await?;

    let skipped_fields: BTreeSet<String> = rejected
        .into_iter()
        .chain(report.skipped_ids())
        .collect();

    tracing::info!(
        session_id = %id,
        filled = report.filled.len(),
        skipped = skipped_fields.len(),
        valid = validation.valid,
        "Generated document"
    );

    Ok(Json(GenerateResponse {
        success: true,
        document_url: format!("/api/sessions/{}/document", id),
        session_id: id,
        artifact_path: dest.display().to_string(),
        validation,
        filled_fields: report.filled,
        skipped_fields: skipped_fields.into_iter().collect(),
        skipped: report.skipped,
    }))
}

/// Download the last generated document
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.sessions.get(&id).await?;
    let path = entry
        .read(|session| session.last_artifact().map(|p| p.to_path_buf()))
        .await
        .ok_or_else(|| {
            FormFillError::InvalidState(format!("no document generated for session {}", id))
        })?;

    let bytes = tokio::fs::read(&path).await.map_err(FormFillError::from)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}-filled.pdf\"", id),
            ),
        ],
        bytes,
    ))
}

fn session_response(session: &Session) -> Result<SessionResponse, ApiError> {
    let schema = session.schema()?;
    Ok(SessionResponse {
        session_id: session.session_id.clone(),
        form_id: session.form_id.clone(),
        language: session.language.clone(),
        state: session.state(),
        created_at: session.created_at,
        total_pages: schema.len(),
        fields: schema.rows(),
        answers: session.answers().clone(),
        progress: session.progress()?,
    })
}

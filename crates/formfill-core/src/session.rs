//! Session and validation state machine
//!
//! ```text
//! CREATED -> SCHEMA_READY -> ANSWERING <-> VALIDATED -> DOCUMENT_GENERATED
//! ```
//!
//! `VALIDATED` is a snapshot, not a lock: submitting again returns to
//! `ANSWERING`. Generation is permitted whenever at least one answer exists,
//! even if required fields are still missing.

use crate::error::FormFillError;
use crate::schema::FormSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

const ANSWER_PREFIX: &str = "answer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Created,
    SchemaReady,
    Answering,
    Validated,
    DocumentGenerated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "CREATED",
            SessionState::SchemaReady => "SCHEMA_READY",
            SessionState::Answering => "ANSWERING",
            SessionState::Validated => "VALIDATED",
            SessionState::DocumentGenerated => "DOCUMENT_GENERATED",
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = FormFillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(SessionState::Created),
            "SCHEMA_READY" => Ok(SessionState::SchemaReady),
            "ANSWERING" => Ok(SessionState::Answering),
            "VALIDATED" => Ok(SessionState::Validated),
            "DOCUMENT_GENERATED" => Ok(SessionState::DocumentGenerated),
            other => Err(FormFillError::SerializationError(format!(
                "unknown session state '{}'",
                other
            ))),
        }
    }
}

/// Returned after every answer submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub completion_percentage: f64,
    pub filled_fields: usize,
    pub total_fields: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Validation {
    pub completion_percentage: f64,
    /// Required fields without a non-blank answer, in schema order
    pub missing_fields: Vec<String>,
    pub valid: bool,
    pub filled_fields: usize,
    pub total_fields: usize,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub form_id: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    schema: Option<FormSchema>,
    answers: BTreeMap<String, String>,
    rejected_keys: BTreeSet<String>,
    state: SessionState,
    last_artifact: Option<PathBuf>,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        form_id: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            form_id: form_id.into(),
            language: language.into(),
            created_at: Utc::now(),
            schema: None,
            answers: BTreeMap::new(),
            rejected_keys: BTreeSet::new(),
            state: SessionState::Created,
            last_artifact: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    /// Keys submitted for fields the schema does not contain
    pub fn rejected_keys(&self) -> &BTreeSet<String> {
        &self.rejected_keys
    }

    pub fn last_artifact(&self) -> Option<&Path> {
        self.last_artifact.as_deref()
    }

    pub fn schema(&self) -> Result<&FormSchema, FormFillError> {
        self.schema.as_ref().ok_or_else(|| {
            FormFillError::InvalidState(format!(
                "session {} has no schema attached",
                self.session_id
            ))
        })
    }

    pub fn attach_schema(&mut self, schema: FormSchema) -> Result<(), FormFillError> {
        if self.state != SessionState::Created {
            return Err(FormFillError::InvalidState(format!(
                "schema already attached to session {} ({})",
                self.session_id,
                self.state.as_str()
            )));
        }
        debug!(session_id = %self.session_id, fields = schema.len(), "schema attached");
        self.schema = Some(schema);
        self.state = SessionState::SchemaReady;
        Ok(())
    }

    /// Store an answer for `field_id`. Unknown ids are rejected but
    /// remembered so generation can report them.
    pub fn submit_answer(
        &mut self,
        field_id: &str,
        answer: impl Into<String>,
    ) -> Result<Progress, FormFillError> {
        if !self.schema()?.contains(field_id) {
            self.rejected_keys.insert(field_id.to_string());
            return Err(FormFillError::FieldNotFound(field_id.to_string()));
        }
        self.answers.insert(field_id.to_string(), answer.into());
        self.state = SessionState::Answering;
        self.progress()
    }

    pub fn clear_answers(&mut self) -> Result<(), FormFillError> {
        self.schema()?;
        self.answers.clear();
        self.rejected_keys.clear();
        self.state = SessionState::SchemaReady;
        Ok(())
    }

    pub fn progress(&self) -> Result<Progress, FormFillError> {
        let schema = self.schema()?;
        let filled = self.filled_count(schema);
        Ok(Progress {
            completion_percentage: completion(filled, schema.len()),
            filled_fields: filled,
            total_fields: schema.len(),
        })
    }

    /// Compute the validation snapshot without changing state
    pub fn validation(&self) -> Result<Validation, FormFillError> {
        let schema = self.schema()?;
        let missing_fields: Vec<String> = schema
            .required_ids()
            .filter(|id| !self.has_answer(id))
            .map(str::to_string)
            .collect();
        let filled = self.filled_count(schema);

        Ok(Validation {
            completion_percentage: completion(filled, schema.len()),
            valid: missing_fields.is_empty(),
            missing_fields,
            filled_fields: filled,
            total_fields: schema.len(),
        })
    }

    /// Compute the validation snapshot and record it
    pub fn validate(&mut self) -> Result<Validation, FormFillError> {
        let validation = self.validation()?;
        if self.state != SessionState::DocumentGenerated {
            self.state = SessionState::Validated;
        }
        Ok(validation)
    }

    pub fn can_generate(&self) -> bool {
        self.schema.is_some() && !self.answers.is_empty()
    }

    /// Snapshot of the answers to write; fails while no answer exists
    pub fn generation_answers(&self) -> Result<BTreeMap<String, String>, FormFillError> {
        if !self.can_generate() {
            return Err(FormFillError::InvalidState(format!(
                "session {} has no answers to write",
                self.session_id
            )));
        }
        Ok(self.answers.clone())
    }

    pub fn mark_generated(&mut self, artifact: impl Into<PathBuf>) {
        self.last_artifact = Some(artifact.into());
        self.state = SessionState::DocumentGenerated;
    }

    /// Flatten into string pairs for a key-value store
    pub fn to_flat_map(&self) -> Result<BTreeMap<String, String>, FormFillError> {
        let mut flat = BTreeMap::new();
        flat.insert("session_id".to_string(), self.session_id.clone());
        flat.insert("form_id".to_string(), self.form_id.clone());
        flat.insert("language".to_string(), self.language.clone());
        flat.insert("created_at".to_string(), self.created_at.to_rfc3339());
        flat.insert("state".to_string(), self.state.as_str().to_string());
        if let Some(schema) = &self.schema {
            flat.insert("schema".to_string(), to_json(schema)?);
        }
        if !self.rejected_keys.is_empty() {
            flat.insert("rejected_keys".to_string(), to_json(&self.rejected_keys)?);
        }
        if let Some(path) = &self.last_artifact {
            flat.insert("last_artifact".to_string(), path.display().to_string());
        }
        for (field_id, answer) in &self.answers {
            flat.insert(format!("{}{}", ANSWER_PREFIX, field_id), answer.clone());
        }
        Ok(flat)
    }

    pub fn from_flat_map(flat: &BTreeMap<String, String>) -> Result<Self, FormFillError> {
        let required = |key: &str| {
            flat.get(key).cloned().ok_or_else(|| {
                FormFillError::SerializationError(format!("missing key '{}'", key))
            })
        };

        let created_at = DateTime::parse_from_rfc3339(&required("created_at")?)
            .map_err(|e| FormFillError::SerializationError(format!("created_at: {}", e)))?
            .with_timezone(&Utc);
        let schema: Option<FormSchema> = flat.get("schema").map(|s| from_json(s)).transpose()?;
        let rejected_keys: BTreeSet<String> = flat
            .get("rejected_keys")
            .map(|s| from_json(s))
            .transpose()?
            .unwrap_or_default();
        let answers: BTreeMap<String, String> = flat
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ANSWER_PREFIX)
                    .map(|field_id| (field_id.to_string(), value.clone()))
            })
            .collect();

        if let Some(schema) = &schema {
            if let Some(unknown) = answers.keys().find(|id| !schema.contains(id)) {
                return Err(FormFillError::FieldNotFound(unknown.clone()));
            }
        } else if !answers.is_empty() {
            return Err(FormFillError::SerializationError(
                "answers present without a schema".into(),
            ));
        }

        Ok(Self {
            session_id: required("session_id")?,
            form_id: required("form_id")?,
            language: required("language")?,
            created_at,
            schema,
            answers,
            rejected_keys,
            state: required("state")?.parse()?,
            last_artifact: flat.get("last_artifact").map(PathBuf::from),
        })
    }

    fn has_answer(&self, field_id: &str) -> bool {
        self.answers
            .get(field_id)
            .is_some_and(|answer| !answer.trim().is_empty())
    }

    fn filled_count(&self, schema: &FormSchema) -> usize {
        schema
            .fields
            .iter()
            .filter(|f| self.has_answer(&f.base_id))
            .count()
    }
}

/// Percentage rounded to two decimals; an empty schema is 0.0
fn completion(filled: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = filled as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

fn to_json<T: Serialize>(value: &T) -> Result<String, FormFillError> {
    serde_json::to_string(value).map_err(|e| FormFillError::SerializationError(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, FormFillError> {
    serde_json::from_str(s).map_err(|e| FormFillError::SerializationError(e.to_string()))
}

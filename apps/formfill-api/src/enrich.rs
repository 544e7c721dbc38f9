//! Schema enrichment and caching
//!
//! Human guidance (label, description, required flag) comes from an
//! [`Enricher`]. Enriched schemas are cached per (form id, document sha-256,
//! language) and computed at most once concurrently per key: later callers
//! await the first caller's result instead of triggering their own. A schema
//! built without enrichment is handed to the callers waiting on it but never
//! cached, in memory or on disk, so guidance that appears later is picked up.

use crate::error::ApiError;
use crate::forms::{sha256_hex, FormRegistry};
use async_trait::async_trait;
use formfill_core::{
    extract_fields, group_widgets, write_atomic, ExtractOptions, FieldMetadata, FormSchema,
    LogicalField,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Source of field guidance. Returning `None` means "no enrichment" and
/// never fails schema building.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(
        &self,
        form_id: &str,
        language: &str,
        fields: &[LogicalField],
    ) -> Option<HashMap<String, FieldMetadata>>;
}

/// Reads `labels_{lang}.json` next to the form:
///
/// ```json
/// {"questions": [{"field_id": "First", "question": "What is your first name?",
///                 "explanation": "As on your passport", "required": true}]}
/// ```
pub struct LabelFileEnricher {
    forms: FormRegistry,
}

#[derive(Debug, Deserialize)]
struct LabelFile {
    #[serde(default)]
    questions: Vec<LabelEntry>,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    field_id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    required: bool,
}

impl LabelFileEnricher {
    pub fn new(forms: FormRegistry) -> Self {
        Self { forms }
    }
}

#[async_trait]
impl Enricher for LabelFileEnricher {
    async fn enrich(
        &self,
        form_id: &str,
        language: &str,
        fields: &[LogicalField],
    ) -> Option<HashMap<String, FieldMetadata>> {
        let path = self.forms.labels_path(form_id, language);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(_) => {
                debug!(path = %path.display(), "no labels file, schema stays unenriched");
                return None;
            }
        };
        let file: LabelFile = match serde_json::from_slice(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), "ignoring unreadable labels file: {}", e);
                return None;
            }
        };

        let metadata: HashMap<String, FieldMetadata> = file
            .questions
            .into_iter()
            .map(|q| {
                (
                    q.field_id,
                    FieldMetadata {
                        label: q.question,
                        description: q.explanation,
                        required: q.required,
                    },
                )
            })
            .collect();

        let unknown = metadata
            .keys()
            .filter(|id| !fields.iter().any(|f| &f.base_id == *id))
            .count();
        if unknown > 0 {
            warn!(form_id, language, unknown, "labels reference fields the form lacks");
        }
        Some(metadata)
    }
}

/// On-disk form of an enriched schema
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSchema {
    document_sha256: String,
    language: String,
    schema: FormSchema,
}

/// `(form id, document sha-256, language)`
type CacheKey = (String, String, String);

/// A computed schema and whether enrichment contributed to it
type Computed = (Arc<FormSchema>, bool);

pub struct SchemaCache {
    enricher: Arc<dyn Enricher>,
    forms: FormRegistry,
    cells: Mutex<HashMap<CacheKey, Arc<OnceCell<Computed>>>>,
    computations: AtomicUsize,
}

impl SchemaCache {
    pub fn new(enricher: Arc<dyn Enricher>, forms: FormRegistry) -> Self {
        Self {
            enricher,
            forms,
            cells: Mutex::new(HashMap::new()),
            computations: AtomicUsize::new(0),
        }
    }

    /// Number of schemas actually computed (cache misses)
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    /// The enriched schema of `document` in `language`
    pub async fn schema(
        &self,
        form_id: &str,
        language: &str,
        document: Arc<Vec<u8>>,
        options: ExtractOptions,
    ) -> Result<Arc<FormSchema>, ApiError> {
        let digest = sha256_hex(&document);
        let key = (form_id.to_string(), digest.clone(), language.to_string());
        let cell = {
            let mut cells = self.cells.lock().await;
            cells
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let (schema, enriched) = cell
            .get_or_try_init(|| self.compute(form_id, language, &digest, document, options))
            .await?;

        if !*enriched {
            let mut cells = self.cells.lock().await;
            if cells.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                cells.remove(&key);
            }
        }
        Ok(schema.clone())
    }

    async fn compute(
        &self,
        form_id: &str,
        language: &str,
        digest: &str,
        document: Arc<Vec<u8>>,
        options: ExtractOptions,
    ) -> Result<Computed, ApiError> {
        let computation = self.computations.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(schema) = self.read_persisted(form_id, language, digest).await {
            info!(form_id, language, computation, "Loaded persisted schema");
            return Ok((Arc::new(schema), true));
        }

        let fields = tokio::task::spawn_blocking(move || {
            let extraction = extract_fields(&document, options)?;
            Ok::<_, formfill_core::FormFillError>(group_widgets(extraction.widgets))
        })
        .await??;

        let metadata = self.enricher.enrich(form_id, language, &fields).await;
        let schema = FormSchema::build(fields, &metadata);
        info!(
            form_id,
            language,
            fields = schema.len(),
            enriched = metadata.is_some(),
            computation,
            "Built schema"
        );

        let enriched = metadata.is_some();
        if enriched {
            self.persist(form_id, language, digest, &schema).await;
        }
        Ok((Arc::new(schema), enriched))
    }

    async fn read_persisted(&self, form_id: &str, language: &str, digest: &str) -> Option<FormSchema> {
        let raw = tokio::fs::read(self.forms.cache_path(form_id, language))
            .await
            .ok()?;
        match serde_json::from_slice::<PersistedSchema>(&raw) {
            Ok(persisted) if persisted.document_sha256 == digest => Some(persisted.schema),
            Ok(_) => {
                debug!(form_id, language, "persisted schema is for another document version");
                None
            }
            Err(e) => {
                warn!(form_id, language, "ignoring unreadable schema cache: {}", e);
                None
            }
        }
    }

    /// Best-effort: a failed write only costs a recomputation later
    async fn persist(&self, form_id: &str, language: &str, digest: &str, schema: &FormSchema) {
        let persisted = PersistedSchema {
            document_sha256: digest.to_string(),
            language: language.to_string(),
            schema: schema.clone(),
        };
        let bytes = match serde_json::to_vec_pretty(&persisted) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(form_id, "could not encode schema cache: {}", e);
                return;
            }
        };
        let path = self.forms.cache_path(form_id, language);
        let result = tokio::task::spawn_blocking(move || write_atomic(&path, &bytes)).await;
        match result {
            Ok(Ok(())) => debug!(form_id, language, "Persisted schema"),
            Ok(Err(e)) => warn!(form_id, "could not persist schema cache: {}", e),
            Err(e) => warn!(form_id, "schema cache writer failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formfill_core::testutil::FormBuilder;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    /// Slow enricher that counts its invocations
    struct CountingEnricher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Enricher for CountingEnricher {
        async fn enrich(
            &self,
            _form_id: &str,
            _language: &str,
            fields: &[LogicalField],
        ) -> Option<HashMap<String, FieldMetadata>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Some(
                fields
                    .iter()
                    .map(|f| {
                        (
                            f.base_id.clone(),
                            FieldMetadata {
                                label: format!("Label for {}", f.base_id),
                                description: String::new(),
                                required: true,
                            },
                        )
                    })
                    .collect(),
            )
        }
    }

    fn form() -> Arc<Vec<u8>> {
        Arc::new(
            FormBuilder::new(1)
                .text("First", 1, [0.0, 0.0, 100.0, 20.0])
                .text("Last", 1, [0.0, 30.0, 100.0, 50.0])
                .build(),
        )
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_computation() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = Arc::new(CountingEnricher {
            calls: AtomicUsize::new(0),
        });
        let cache = SchemaCache::new(enricher.clone(), FormRegistry::new(dir.path()));
        let document = form();

        let (a, b, c) = tokio::join!(
            cache.schema("names", "en", document.clone(), ExtractOptions::default()),
            cache.schema("names", "en", document.clone(), ExtractOptions::default()),
            cache.schema("names", "en", document.clone(), ExtractOptions::default()),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.computations(), 1);
        assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
        assert_eq!(a.field("First").unwrap().human_label.as_deref(), Some("Label for First"));
    }

    #[tokio::test]
    async fn test_languages_are_cached_separately() {
        let dir = tempfile::tempdir().unwrap();
        let enricher = Arc::new(CountingEnricher {
            calls: AtomicUsize::new(0),
        });
        let cache = SchemaCache::new(enricher.clone(), FormRegistry::new(dir.path()));

        cache.schema("names", "en", form(), ExtractOptions::default()).await.unwrap();
        cache.schema("names", "es", form(), ExtractOptions::default()).await.unwrap();
        cache.schema("names", "en", form(), ExtractOptions::default()).await.unwrap();
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persisted_schema_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FormRegistry::new(dir.path());

        let first = SchemaCache::new(
            Arc::new(CountingEnricher {
                calls: AtomicUsize::new(0),
            }),
            registry.clone(),
        );
        first.schema("names", "en", form(), ExtractOptions::default()).await.unwrap();
        assert!(registry.cache_path("names", "en").exists());

        let enricher = Arc::new(CountingEnricher {
            calls: AtomicUsize::new(0),
        });
        let second = SchemaCache::new(enricher.clone(), registry);
        let schema = second
            .schema("names", "en", form(), ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
        assert!(schema.field("Last").unwrap().required);
    }

    #[tokio::test]
    async fn test_label_file_enricher_reads_questions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FormRegistry::new(dir.path());
        std::fs::create_dir_all(registry.form_dir("names")).unwrap();
        std::fs::write(
            registry.labels_path("names", "es"),
            r#"{"questions":[{"field_id":"First","question":"¿Cuál es su nombre?","explanation":"Como en su pasaporte","required":true}]}"#,
        )
        .unwrap();

        let cache = SchemaCache::new(
            Arc::new(LabelFileEnricher::new(registry.clone())),
            registry,
        );
        let schema = cache
            .schema("names", "es", form(), ExtractOptions::default())
            .await
            .unwrap();

        let first = schema.field("First").unwrap();
        assert!(first.required);
        assert_eq!(first.human_label.as_deref(), Some("¿Cuál es su nombre?"));
        assert_eq!(first.human_description.as_deref(), Some("Como en su pasaporte"));
        assert!(!schema.field("Last").unwrap().required);
    }

    #[tokio::test]
    async fn test_same_bytes_under_two_forms_are_cached_apart() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FormRegistry::new(dir.path());
        for (form_id, label, required) in [("form-a", "A label", true), ("form-b", "B label", false)] {
            std::fs::create_dir_all(registry.form_dir(form_id)).unwrap();
            std::fs::write(
                registry.labels_path(form_id, "en"),
                format!(
                    r#"{{"questions":[{{"field_id":"First","question":"{}","required":{}}}]}}"#,
                    label, required
                ),
            )
            .unwrap();
        }

        let cache = SchemaCache::new(
            Arc::new(LabelFileEnricher::new(registry.clone())),
            registry,
        );
        let a = cache.schema("form-a", "en", form(), ExtractOptions::default()).await.unwrap();
        let b = cache.schema("form-b", "en", form(), ExtractOptions::default()).await.unwrap();

        assert_eq!(a.field("First").unwrap().human_label.as_deref(), Some("A label"));
        assert!(a.field("First").unwrap().required);
        assert_eq!(b.field("First").unwrap().human_label.as_deref(), Some("B label"));
        assert!(!b.field("First").unwrap().required);
    }

    #[tokio::test]
    async fn test_labels_added_later_are_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FormRegistry::new(dir.path());
        let cache = SchemaCache::new(
            Arc::new(LabelFileEnricher::new(registry.clone())),
            registry.clone(),
        );

        let bare = cache.schema("names", "en", form(), ExtractOptions::default()).await.unwrap();
        assert_eq!(bare.field("First").unwrap().human_label, None);
        assert!(!registry.cache_path("names", "en").exists());

        std::fs::create_dir_all(registry.form_dir("names")).unwrap();
        std::fs::write(
            registry.labels_path("names", "en"),
            r#"{"questions":[{"field_id":"First","question":"Given name","required":true}]}"#,
        )
        .unwrap();

        // Same process
        let enriched = cache.schema("names", "en", form(), ExtractOptions::default()).await.unwrap();
        assert_eq!(enriched.field("First").unwrap().human_label.as_deref(), Some("Given name"));
        assert!(registry.cache_path("names", "en").exists());

        // After a restart
        let restarted = SchemaCache::new(
            Arc::new(LabelFileEnricher::new(registry.clone())),
            registry,
        );
        let schema = restarted
            .schema("names", "en", form(), ExtractOptions::default())
            .await
            .unwrap();
        assert!(schema.field("First").unwrap().required);
    }

    #[tokio::test]
    async fn test_missing_labels_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FormRegistry::new(dir.path());
        let cache = SchemaCache::new(
            Arc::new(LabelFileEnricher::new(registry.clone())),
            registry,
        );
        let schema = cache
            .schema("names", "en", form(), ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.required_ids().count(), 0);
    }
}

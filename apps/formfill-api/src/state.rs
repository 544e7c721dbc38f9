//! Application state for the formfill API

use anyhow::Result;
use formfill_core::ExtractOptions;
use std::path::PathBuf;
use std::sync::Arc;

use crate::enrich::{Enricher, LabelFileEnricher, SchemaCache};
use crate::forms::FormRegistry;
use crate::sessions::SessionStore;

#[derive(Debug, Clone)]
pub struct Config {
    pub forms_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Reject documents without an AcroForm instead of treating them as empty forms
    pub require_fields: bool,
}

pub struct AppState {
    pub config: Config,
    pub forms: FormRegistry,
    pub sessions: SessionStore,
    pub schemas: SchemaCache,
}

impl AppState {
    /// State with the label-file enricher reading from `forms_dir`
    pub async fn new(config: Config) -> Result<Self> {
        let forms = FormRegistry::new(&config.forms_dir);
        let enricher = Arc::new(LabelFileEnricher::new(forms.clone()));
        Self::with_enricher(config, enricher).await
    }

    pub async fn with_enricher(config: Config, enricher: Arc<dyn Enricher>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.forms_dir).await?;
        tokio::fs::create_dir_all(&config.output_dir).await?;
        tracing::info!(
            forms_dir = %config.forms_dir.display(),
            output_dir = %config.output_dir.display(),
            "Initialized form storage"
        );

        let forms = FormRegistry::new(&config.forms_dir);
        Ok(Self {
            schemas: SchemaCache::new(enricher, forms.clone()),
            forms,
            sessions: SessionStore::new(),
            config,
        })
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            require_form: self.config.require_fields,
        }
    }

    /// Where a session's filled document is written
    pub fn output_path(&self, session_id: &str) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}-filled.pdf", session_id))
    }
}

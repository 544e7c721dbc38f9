//! Formfill API Server - guided filling of AcroForm documents
//!
//! Provides REST endpoints for:
//! - Form registration and enriched schemas
//! - Filling sessions: one question per page, answers, validation
//! - Generation and download of the filled document

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod enrich;
mod error;
mod forms;
mod handlers;
mod models;
mod sessions;
mod state;
#[cfg(test)]
mod tests;

use state::{AppState, Config};

/// Largest accepted form upload
const MAX_FORM_BYTES: usize = 50 * 1024 * 1024;

/// Command-line arguments for the formfill server
#[derive(Parser, Debug)]
#[command(name = "formfill-api")]
#[command(about = "HTTP service for guided AcroForm filling sessions")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "FORMFILL_PORT", default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "FORMFILL_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory holding one sub-directory per form id
    #[arg(long, env = "FORMFILL_FORMS_DIR", default_value = "static/forms")]
    forms_dir: PathBuf,

    /// Directory for filled documents
    #[arg(long, env = "FORMFILL_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Reject documents that carry no AcroForm at all
    #[arg(long, env = "FORMFILL_REQUIRE_FIELDS")]
    require_fields: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "FORMFILL_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive("debug".parse()?)
    } else {
        EnvFilter::from_default_env()
            .add_directive("formfill_api=info".parse()?)
            .add_directive("formfill_core=info".parse()?)
            .add_directive("tower_http=debug".parse()?)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Initializing formfill API...");
    let state = AppState::new(Config {
        forms_dir: args.forms_dir,
        output_dir: args.output_dir,
        require_fields: args.require_fields,
    })
    .await?;

    let app = router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting formfill API on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Forms
        .route("/api/forms/:form_id", put(handlers::upload_form))
        .route("/api/forms/:form_id/schema", get(handlers::form_schema))
        // Sessions
        .route("/api/sessions", post(handlers::create_session))
        .route("/api/sessions/:id", get(handlers::get_session))
        .route("/api/sessions/:id/fill/:page_num", get(handlers::fill_page))
        .route("/api/sessions/:id/answers", delete(handlers::clear_answers))
        .route("/api/sessions/:id/validation", get(handlers::validate_session))
        .route("/api/sessions/:id/generate", post(handlers::generate_document))
        .route("/api/sessions/:id/document", get(handlers::get_document))
        // Answers
        .route("/api/responses", post(handlers::submit_answer))
        // Add middleware
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

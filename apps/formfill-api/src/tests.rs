//! HTTP endpoint tests using axum-test
//!
//! Every test runs the real router against a temporary forms/output tree.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum_test::TestServer;
use formfill_core::read_widget_states;
use formfill_core::testutil::FormBuilder;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use crate::router;
use crate::state::{AppState, Config};

struct Harness {
    server: TestServer,
    state: Arc<AppState>,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        forms_dir: dir.path().join("forms"),
        output_dir: dir.path().join("output"),
        require_fields: false,
    };
    let state = Arc::new(AppState::new(config).await.unwrap());
    let server = TestServer::new(router(state.clone())).unwrap();
    Harness {
        server,
        state,
        _dir: dir,
    }
}

fn names_form() -> Vec<u8> {
    FormBuilder::new(1)
        .text("First", 1, [72.0, 700.0, 272.0, 720.0])
        .text("Middle", 1, [72.0, 670.0, 272.0, 690.0])
        .text("Last", 1, [72.0, 640.0, 272.0, 660.0])
        .build()
}

const NAMES_LABELS: &str = r#"{"questions":[
    {"field_id":"First","question":"What is your first name?","explanation":"Given name","required":true},
    {"field_id":"Middle","question":"What is your middle name?","explanation":"","required":false},
    {"field_id":"Last","question":"What is your last name?","explanation":"Family name","required":true}
]}"#;

impl Harness {
    async fn upload(&self, form_id: &str, pdf: Vec<u8>) -> axum_test::TestResponse {
        self.server
            .put(&format!("/api/forms/{}", form_id))
            .content_type("application/pdf")
            .bytes(Bytes::from(pdf))
            .await
    }

    /// Register the names form with its labels and open a session on it
    async fn names_session(&self) -> String {
        self.upload("names", names_form()).await.assert_status_ok();
        std::fs::write(
            self.state.forms.labels_path("names", "en"),
            NAMES_LABELS,
        )
        .unwrap();

        let response = self
            .server
            .post("/api/sessions")
            .json(&json!({ "form_id": "names", "language": "en" }))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["session_id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn answer(&self, session_id: &str, field_id: &str, answer: &str) -> axum_test::TestResponse {
        self.server
            .post("/api/responses")
            .json(&json!({ "session_id": session_id, "field_id": field_id, "answer": answer }))
            .await
    }
}

#[tokio::test]
async fn test_health_returns_200() {
    let h = harness().await;
    let response = h.server.get("/health").await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "formfill-api");
    assert_eq!(json["sessions"], 0);
}

#[tokio::test]
async fn test_health_via_oneshot() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let h = harness().await;
    let response = router(h.state.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_reports_widgets() {
    let h = harness().await;
    let response = h.upload("names", names_form()).await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(json["success"], true);
    assert_eq!(json["widget_count"], 3);
    assert_eq!(json["page_count"], 1);
    assert_eq!(json["sha256"].as_str().unwrap().len(), 64);
    assert!(h.state.forms.form_path("names").exists());
}

#[tokio::test]
async fn test_upload_rejects_garbage() {
    let h = harness().await;
    let response = h.upload("broken", b"definitely not a pdf".to_vec()).await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let json = response.json::<Value>();
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "MALFORMED_DOCUMENT");
    assert!(!h.state.forms.form_path("broken").exists());
}

#[tokio::test]
async fn test_upload_rejects_unsafe_form_id() {
    let h = harness().await;
    let response = h.upload("a..b", names_form()).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_schema_lists_fields_in_document_order() {
    let h = harness().await;
    h.upload("names", names_form()).await.assert_status_ok();

    let response = h.server.get("/api/forms/names/schema").await;
    response.assert_status_ok();

    let json = response.json::<Value>();
    assert_eq!(json["language"], "en");
    assert_eq!(json["total_pages"], 3);
    let ids: Vec<&str> = json["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["First", "Middle", "Last"]);
    assert_eq!(json["fields"][0]["type"], "text");
    assert_eq!(json["fields"][0]["required"], false);
}

#[tokio::test]
async fn test_exclusive_group_schema_lists_options() {
    let h = harness().await;
    let pdf = FormBuilder::new(1)
        .checkbox("Gender[0]", 1, [72.0, 650.0, 84.0, 662.0], "M")
        .checkbox("Gender[1]", 1, [120.0, 650.0, 132.0, 662.0], "F")
        .build();
    h.upload("gender", pdf).await.assert_status_ok();

    let json = h.server.get("/api/forms/gender/schema").await.json::<Value>();
    let field = &json["fields"][0];
    assert_eq!(field["field_id"], "Gender");
    assert_eq!(field["type"], "exclusive_group");
    assert_eq!(field["options"][0]["state"], "M");
    assert_eq!(field["options"][1]["option_id"], "Gender[1]");
}

#[tokio::test]
async fn test_unknown_form_is_404() {
    let h = harness().await;
    let response = h
        .server
        .post("/api/sessions")
        .json(&json!({ "form_id": "missing" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["code"], "FORM_NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let h = harness().await;
    let response = h.server.get("/api/sessions/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_session_carries_enriched_schema() {
    let h = harness().await;
    let session_id = h.names_session().await;

    let json = h
        .server
        .get(&format!("/api/sessions/{}", session_id))
        .await
        .json::<Value>();
    assert_eq!(json["state"], "SCHEMA_READY");
    assert_eq!(json["total_pages"], 3);
    assert_eq!(json["fields"][0]["label"], "What is your first name?");
    assert_eq!(json["fields"][0]["required"], true);
    assert_eq!(json["fields"][1]["required"], false);
    assert_eq!(json["progress"]["completion_percentage"], 0.0);
}

#[tokio::test]
async fn test_fill_pages_one_field_each() {
    let h = harness().await;
    let session_id = h.names_session().await;
    h.answer(&session_id, "Middle", "Maria").await.assert_status_ok();

    let json = h
        .server
        .get(&format!("/api/sessions/{}/fill/2", session_id))
        .await
        .json::<Value>();
    assert_eq!(json["current_page"], 2);
    assert_eq!(json["total_pages"], 3);
    assert_eq!(json["field"]["field_id"], "Middle");
    assert_eq!(json["answer"], "Maria");

    for page in [0, 4] {
        let response = h
            .server
            .get(&format!("/api/sessions/{}/fill/{}", session_id, page))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["code"], "PAGE_NOT_FOUND");
    }
}

#[tokio::test]
async fn test_full_flow_generates_document() {
    let h = harness().await;
    let session_id = h.names_session().await;

    let json = h.answer(&session_id, "First", "Ana").await.json::<Value>();
    assert_eq!(json["completion_percentage"], 33.33);
    let json = h.answer(&session_id, "Last", "Ruiz").await.json::<Value>();
    assert_eq!(json["completion_percentage"], 66.67);
    assert_eq!(json["filled_fields"], 2);
    assert_eq!(json["total_fields"], 3);

    let rejected = h.answer(&session_id, "Suffix", "Jr").await;
    rejected.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(rejected.json::<Value>()["code"], "FIELD_NOT_FOUND");

    let validation = h
        .server
        .get(&format!("/api/sessions/{}/validation", session_id))
        .await
        .json::<Value>();
    assert_eq!(validation["state"], "VALIDATED");
    assert_eq!(validation["completion_percentage"], 66.67);
    assert_eq!(validation["missing_fields"], json!([]));
    assert_eq!(validation["valid"], true);
    assert_eq!(validation["can_generate"], true);

    let generated = h
        .server
        .post(&format!("/api/sessions/{}/generate", session_id))
        .await;
    generated.assert_status_ok();
    let generated = generated.json::<Value>();
    assert_eq!(generated["success"], true);
    assert_eq!(generated["filled_fields"], json!(["First", "Last"]));
    assert_eq!(generated["skipped_fields"], json!(["Suffix"]));
    assert_eq!(generated["validation"]["valid"], true);
    assert!(h.state.output_path(&session_id).exists());

    let document = h
        .server
        .get(&format!("/api/sessions/{}/document", session_id))
        .await;
    document.assert_status_ok();
    assert_eq!(document.header("content-type"), "application/pdf");

    let states = read_widget_states(document.as_bytes()).unwrap();
    let last = states.iter().find(|s| s.raw_id == "Last").unwrap();
    assert_eq!(last.value.as_deref(), Some("Ruiz"));

    let session = h
        .server
        .get(&format!("/api/sessions/{}", session_id))
        .await
        .json::<Value>();
    assert_eq!(session["state"], "DOCUMENT_GENERATED");
}

#[tokio::test]
async fn test_generation_allowed_with_missing_required_fields() {
    let h = harness().await;
    let session_id = h.names_session().await;
    h.answer(&session_id, "Middle", "Maria").await.assert_status_ok();

    let generated = h
        .server
        .post(&format!("/api/sessions/{}/generate", session_id))
        .await;
    generated.assert_status_ok();
    let json = generated.json::<Value>();
    assert_eq!(json["validation"]["valid"], false);
    assert_eq!(json["validation"]["missing_fields"], json!(["First", "Last"]));
}

#[tokio::test]
async fn test_generation_requires_an_answer() {
    let h = harness().await;
    let session_id = h.names_session().await;

    let response = h
        .server
        .post(&format!("/api/sessions/{}/generate", session_id))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_STATE");

    let response = h
        .server
        .get(&format!("/api/sessions/{}/document", session_id))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_answers_resets_session() {
    let h = harness().await;
    let session_id = h.names_session().await;
    h.answer(&session_id, "First", "Ana").await.assert_status_ok();

    let response = h
        .server
        .delete(&format!("/api/sessions/{}/answers", session_id))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["state"], "SCHEMA_READY");

    let session = h
        .server
        .get(&format!("/api/sessions/{}", session_id))
        .await
        .json::<Value>();
    assert_eq!(session["answers"], json!({}));
}

#[tokio::test]
async fn test_sessions_on_same_form_share_schema_computation() {
    let h = harness().await;
    h.names_session().await;
    let before = h.state.schemas.computations();

    h.server
        .post("/api/sessions")
        .json(&json!({ "form_id": "names", "language": "en" }))
        .await
        .assert_status_ok();
    h.server
        .get("/api/forms/names/schema?lang=en")
        .await
        .assert_status_ok();

    assert_eq!(h.state.schemas.computations(), before);
}

#[tokio::test]
async fn test_concurrent_generation_on_one_session() {
    use std::future::IntoFuture;

    let h = harness().await;
    let session_id = h.names_session().await;
    h.answer(&session_id, "First", "Ana").await.assert_status_ok();
    h.answer(&session_id, "Last", "Ruiz").await.assert_status_ok();

    let path = format!("/api/sessions/{}/generate", session_id);
    let (first, second) = tokio::join!(
        h.server.post(&path).into_future(),
        h.server.post(&path).into_future()
    );
    first.assert_status_ok();
    second.assert_status_ok();
    assert_eq!(
        first.json::<Value>()["artifact_path"],
        second.json::<Value>()["artifact_path"]
    );

    let artifact = std::fs::read(h.state.output_path(&session_id)).unwrap();
    let states = read_widget_states(&artifact).unwrap();
    let values: Vec<Option<&str>> = states.iter().map(|s| s.value.as_deref()).collect();
    assert_eq!(values, vec![Some("Ana"), None, Some("Ruiz")]);

    let leftovers: Vec<_> = std::fs::read_dir(&h.state.config.output_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_forms_with_identical_bytes_keep_their_own_labels() {
    let h = harness().await;
    h.upload("form-a", names_form()).await.assert_status_ok();
    h.upload("form-b", names_form()).await.assert_status_ok();
    std::fs::write(
        h.state.forms.labels_path("form-a", "en"),
        r#"{"questions":[{"field_id":"First","question":"A label","required":true}]}"#,
    )
    .unwrap();
    std::fs::write(
        h.state.forms.labels_path("form-b", "en"),
        r#"{"questions":[{"field_id":"First","question":"B label","required":false}]}"#,
    )
    .unwrap();

    let a = h.server.get("/api/forms/form-a/schema").await.json::<Value>();
    let b = h.server.get("/api/forms/form-b/schema").await.json::<Value>();
    assert_eq!(a["fields"][0]["label"], "A label");
    assert_eq!(a["fields"][0]["required"], true);
    assert_eq!(b["fields"][0]["label"], "B label");
    assert_eq!(b["fields"][0]["required"], false);
}

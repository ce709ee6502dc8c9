//! Router assembly and the serve loop.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use diagbox_core::config::ServiceConfig;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::catalog::Catalog;
use crate::error::ServiceResult;
use crate::handlers;
use crate::registry::Registry;

/// Shared state. The catalog is immutable after startup.
pub struct AppState {
    pub config: ServiceConfig,
    pub catalog: Catalog,
    pub registry: RwLock<Registry>,
}

impl AppState {
    /// Load the seed catalog and register its sample patients.
    pub fn new(config: ServiceConfig) -> ServiceResult<Self> {
        let catalog = Catalog::seed()?;
        let mut registry = Registry::default();
        for p in catalog.seed_patients() {
            registry.add_patient(&p.name, p.age, &p.gender, p.medical_history.clone());
        }
        Ok(Self {
            config,
            catalog,
            registry: RwLock::new(registry),
        })
    }
}

/// Create the models and uploads directories if they are missing.
pub fn prepare_dirs(config: &ServiceConfig) -> ServiceResult<()> {
    for dir in [&config.models_dir, &config.uploads_dir] {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = usize::try_from(state.config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(1);

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/patients", post(handlers::create_patient))
        .route("/patients/:id", get(handlers::get_patient))
        .route("/medications", get(handlers::list_medications))
        .route(
            "/medications/check-compatibility",
            post(handlers::check_compatibility),
        )
        .route("/medications/alternatives", get(handlers::alternatives))
        .route("/medications/recommend-otc", post(handlers::recommend_otc))
        .route("/medications/prescribe", post(handlers::prescribe))
        .route(
            "/medications/patient/:id",
            get(handlers::patient_medications),
        )
        .route(
            "/uploads",
            post(handlers::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/models", get(handlers::list_models));

    Router::new()
        .route("/", get(handlers::root))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> ServiceResult<()> {
    prepare_dirs(&config)?;
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config)?);
    tracing::info!(
        medications = state.catalog.len(),
        interaction_edges = state.catalog.interaction_edges(),
        models_dir = %state.config.models_dir.display(),
        uploads_dir = %state.config.uploads_dir.display(),
        "catalog seeded"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "service ready");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        _dir: tempfile::TempDir,
        state: Arc<AppState>,
    }

    impl TestApp {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = ServiceConfig {
                models_dir: dir.path().join("models"),
                uploads_dir: dir.path().join("uploads"),
                max_upload_bytes: 64,
                ..ServiceConfig::default()
            };
            prepare_dirs(&config).unwrap();
            Self {
                state: Arc::new(AppState::new(config).unwrap()),
                _dir: dir,
            }
        }

        async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
            let resp = router(self.state.clone()).oneshot(req).await.unwrap();
            let status = resp.status();
            let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            let req = Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(req).await
        }

        async fn new_patient(&self) -> u64 {
            let (status, body) = self
                .post_json(
                    "/api/v1/patients",
                    json!({"name": "Ada", "age": 61, "gender": "Female"}),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body["id"].as_u64().unwrap()
        }

        async fn prescribe(&self, patient_id: u64, med: &str) -> (StatusCode, Value) {
            self.post_json(
                "/api/v1/medications/prescribe",
                json!({
                    "patient_id": patient_id,
                    "medication_name": med,
                    "dosage": "5mg",
                    "frequency": "daily",
                    "duration": "30 days"
                }),
            )
            .await
        }
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let app = TestApp::new();
        let (status, body) = app.get("/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = app.get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["features"].as_array().unwrap().len() > 3);
    }

    #[tokio::test]
    async fn test_patient_validation_and_lookup() {
        let app = TestApp::new();
        let (status, body) = app
            .post_json("/api/v1/patients", json!({"name": "", "age": 30, "gender": "Male"}))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");

        let (status, _) = app
            .post_json("/api/v1/patients", json!({"name": "Old", "age": 130, "gender": "Male"}))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let id = app.new_patient().await;
        let (status, body) = app.get(&format!("/api/v1/patients/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Ada");

        let (status, body) = app.get("/api/v1/patients/9999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_compatibility_reports_major_interaction() {
        let app = TestApp::new();
        let id = app.new_patient().await;
        let (status, _) = app.prescribe(id, "Warfarin").await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .post_json(
                "/api/v1/medications/check-compatibility",
                json!({"patient_id": id, "medication_name": "ibuprofen"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_compatible"], false);
        assert_eq!(body["interactions_found"], 1);
        assert_eq!(body["interactions"][0]["severity"], "major");
        assert_eq!(body["current_medications"], json!(["Warfarin"]));
        assert!(body["recommendation"].as_str().unwrap().starts_with("MAJOR"));

        let (status, _) = app
            .post_json(
                "/api/v1/medications/check-compatibility",
                json!({"patient_id": id, "medication_name": "<script>"}),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = app
            .post_json(
                "/api/v1/medications/check-compatibility",
                json!({"patient_id": 4242, "medication_name": "Aspirin"}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_prescription_blocked_on_major_interaction() {
        let app = TestApp::new();
        let id = app.new_patient().await;
        assert_eq!(app.prescribe(id, "Warfarin").await.0, StatusCode::CREATED);

        let (status, body) = app.prescribe(id, "Aspirin").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["detail"].as_str().unwrap().contains("Warfarin"));

        assert_eq!(app.prescribe(id, "Metformin").await.0, StatusCode::CREATED);
        assert_eq!(app.prescribe(id, "Unobtainium").await.0, StatusCode::NOT_FOUND);

        let (status, body) = app.get(&format!("/api/v1/medications/patient/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = body["prescriptions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["medication_name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Warfarin", "Metformin"]);
    }

    #[tokio::test]
    async fn test_otc_and_alternatives() {
        let app = TestApp::new();
        let id = app.new_patient().await;
        app.prescribe(id, "Warfarin").await;

        let (status, body) = app
            .post_json(
                "/api/v1/medications/recommend-otc",
                json!({"patient_id": id, "symptoms": ["headache", "Runny Nose"]}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_checked"], 3);
        assert_eq!(body["safe_count"], 1);
        assert_eq!(body["safe_otc_recommendations"][0]["medication"], "Pseudoephedrine");
        assert_eq!(body["medications_with_warnings"].as_array().unwrap().len(), 2);

        let (status, body) = app
            .get(&format!("/api/v1/medications/alternatives?patient_id={id}&category=Antihistamine"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["alternatives"], json!(["Cetirizine", "Loratadine"]));
    }

    #[tokio::test]
    async fn test_upload_stored_with_sanitized_name() {
        let app = TestApp::new();
        let req = Request::post("/api/v1/uploads?filename=..%2F..%2Fbottle%201.png")
            .body(Body::from("fake png bytes"))
            .unwrap();
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["filename"], "bottle_1.png");

        let stored = app
            .state
            .config
            .uploads_dir
            .join(body["stored_as"].as_str().unwrap());
        assert_eq!(std::fs::read(&stored).unwrap(), b"fake png bytes");
        assert!(stored.starts_with(&app.state.config.uploads_dir));

        let (_, stats) = app.get("/api/v1/stats").await;
        assert_eq!(stats["total_uploads"], 1);
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_and_oversized() {
        let app = TestApp::new();
        let req = Request::post("/api/v1/uploads?filename=a.bin")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(req).await.0, StatusCode::BAD_REQUEST);

        let req = Request::post("/api/v1/uploads?filename=a.bin")
            .body(Body::from(vec![0u8; 65]))
            .unwrap();
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "payload_too_large");
    }

    #[tokio::test]
    async fn test_upload_far_over_limit_still_returns_json_error() {
        let app = TestApp::new();
        let req = Request::post("/api/v1/uploads?filename=big.bin")
            .header("content-length", "4096")
            .body(Body::from(vec![0u8; 4096]))
            .unwrap();
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "payload_too_large");
        assert!(body["detail"].as_str().unwrap().contains("4096"));

        let req = Request::post("/api/v1/uploads?filename=big.bin")
            .body(Body::from(vec![0u8; 4096]))
            .unwrap();
        let (status, body) = app.send(req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "payload_too_large");
        assert_eq!(std::fs::read_dir(&app.state.config.uploads_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_models_listing() {
        let app = TestApp::new();
        std::fs::write(app.state.config.models_dir.join("medication_cnn.pth"), b"1234").unwrap();
        let (status, body) = app.get("/api/v1/models").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"][0]["name"], "medication_cnn.pth");
        assert_eq!(body["models"][0]["size_bytes"], 4);
    }

    #[tokio::test]
    async fn test_stats_include_seed_data() {
        let app = TestApp::new();
        let (status, body) = app.get("/api/v1/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_patients"], 3);
        assert_eq!(body["catalog_size"], 26);
    }

    #[test]
    fn test_prepare_dirs_creates_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            models_dir: dir.path().join("a/models"),
            uploads_dir: dir.path().join("b/uploads"),
            ..ServiceConfig::default()
        };
        prepare_dirs(&config).unwrap();
        assert!(config.models_dir.is_dir());
        assert!(config.uploads_dir.is_dir());
    }
}

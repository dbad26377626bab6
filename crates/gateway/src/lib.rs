//! HTTP API gateway for Diarist.
//!
//! Exposes the companion conversation, per-persona history, journal entries
//! (JSON or multipart with media) and on-demand profile analysis. Every route
//! except `/health` requires `Authorization: Bearer <credential>`.
//!
//! Built on Axum; the profile sweep runs on the workflow scheduler alongside
//! the server.

pub mod auth;
pub mod error;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Router, middleware,
    response::Json,
    routing::{get, post},
};
use diarist_companion::{ContextAssembler, ContextWindow, Conversation, EntryService, ModelSettings, ProfileAnalyzer, ResponseDelay};
use diarist_config::{AppConfig, SchedulerConfig};
use diarist_core::auth::IdentityVerifier;
use diarist_core::document::DocumentStore;
use diarist_core::error::Error;
use diarist_core::media::MediaStore;
use diarist_core::persona::PersonaLibrary;
use diarist_core::provider::Provider;
use diarist_store::{DisabledMediaStore, HistoryStore, InMemoryDocumentStore, LocalMediaStore, SqliteDocumentStore};
use diarist_workflow::{JobEngine, JobKind};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use auth::StaticTokenVerifier;
pub use error::ApiError;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub conversation: Arc<Conversation>,
    pub analyzer: Arc<ProfileAnalyzer>,
    pub entries: Arc<EntryService>,
    pub history: HistoryStore,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub history_page_size: usize,
    pub max_body_bytes: usize,
    pub cors_origins: Vec<String>,
    /// Served under `/media` when uploads are stored locally.
    pub media_dir: Option<PathBuf>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Wire the services over already-built collaborators.
    pub fn assemble(
        store: Arc<dyn DocumentStore>,
        media: Arc<dyn MediaStore>,
        provider: Arc<dyn Provider>,
        personas: PersonaLibrary,
        verifier: Arc<dyn IdentityVerifier>,
        config: &AppConfig,
    ) -> Self {
        let model = ModelSettings::from(config);
        let assembler = ContextAssembler::from_store(store.clone(), ContextWindow::from(&config.companion));
        let history = HistoryStore::new(store.clone());

        let conversation = Conversation::new(
            assembler,
            history.clone(),
            Arc::new(personas),
            provider.clone(),
            model.clone(),
        )
        .with_delay(ResponseDelay::from(&config.companion));

        Self {
            conversation: Arc::new(conversation),
            analyzer: Arc::new(ProfileAnalyzer::new(store.clone(), provider, model)),
            entries: Arc::new(EntryService::new(store, media)),
            history,
            verifier,
            history_page_size: config.companion.history_page_size,
            max_body_bytes: config.gateway.max_body_bytes,
            cors_origins: config.gateway.cors_origins.clone(),
            media_dir: None,
        }
    }

    /// Open the configured store, media backend and provider.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let store: Arc<dyn DocumentStore> = match config.store.backend.as_str() {
            "memory" => {
                warn!("Using the in-memory store; data is lost on restart");
                Arc::new(InMemoryDocumentStore::new())
            }
            _ => Arc::new(SqliteDocumentStore::open_file(&config.store.resolved_path()).await?),
        };

        let (media, media_dir): (Arc<dyn MediaStore>, Option<PathBuf>) = match config.media.backend.as_str() {
            "disabled" => (Arc::new(DisabledMediaStore), None),
            _ => {
                let dir = config.media.resolved_dir();
                let local = LocalMediaStore::new(
                    dir.clone(),
                    config.media.public_base_url.clone(),
                    config.media.max_upload_bytes,
                )
                .await?;
                (Arc::new(local), Some(dir))
            }
        };

        let provider = diarist_providers::build_from_config(config)
            .default()
            .ok_or_else(|| Error::Config {
                message: format!("provider {:?} is not available", config.default_provider),
            })?;

        let personas = PersonaLibrary::load(config.personas.dir.as_deref().map(Path::new));
        let verifier = StaticTokenVerifier::from_config(&config.auth);
        if verifier.is_empty() {
            warn!("No auth tokens configured; every protected request will be rejected");
        }

        let mut state = Self::assemble(store, media, provider, personas, Arc::new(verifier), config);
        state.media_dir = media_dir;
        Ok(state)
    }
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/conversation/{persona}", post(routes::converse))
        .route("/history/{persona}", get(routes::history))
        .route("/entries", get(routes::list_entries).post(routes::save_entry))
        .route("/entries/{date_id}", get(routes::get_entry).delete(routes::delete_entry))
        .route("/profile/analyze-now", post(routes::analyze_now))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    let mut app = Router::new().route("/health", get(health_handler)).merge(protected);
    if let Some(dir) = &state.media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(cors_layer(&state.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when none are configured, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Run the profile sweep on its cron schedule. Returns `None` when the job
/// is disabled.
pub async fn spawn_scheduler(
    config: &SchedulerConfig,
    analyzer: Arc<ProfileAnalyzer>,
) -> Result<Option<tokio::task::JoinHandle<()>>, Error> {
    if !config.profile_sweep.enabled {
        info!("Profile sweep disabled");
        return Ok(None);
    }
    let engine = JobEngine::from_config(config).await.map_err(|e| Error::Config {
        message: e.to_string(),
    })?;
    let (mut triggered, _ticker) = engine.start(std::time::Duration::from_secs(60));

    let handle = tokio::spawn(async move {
        while let Some(job) = triggered.recv().await {
            match job.kind {
                JobKind::ProfileSweep => match analyzer.sweep().await {
                    Ok(report) => info!(total = report.total(), fired_at = %job.fired_at, "Scheduled sweep done"),
                    Err(e) => error!(error = %e, "Scheduled sweep could not list users"),
                },
            }
        }
    });
    Ok(Some(handle))
}

/// Start the gateway HTTP server and the scheduler.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(GatewayState::from_config(&config).await?);
    let scheduler = spawn_scheduler(&config.scheduler, state.analyzer.clone()).await?;

    let app = build_router(state);
    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use diarist_core::auth::UserId;
    use diarist_core::error::ProviderError;
    use diarist_core::provider::{ProviderRequest, ProviderResponse};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    /// Returns a fixed reply (or error) and keeps every prompt.
    struct StubProvider {
        reply: Result<String, ProviderError>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubProvider {
        fn new(reply: Result<String, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.prompts.lock().unwrap().push(request.prompt);
            self.reply.clone().map(|text| ProviderResponse {
                text,
                usage: None,
                model: request.model,
            })
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.companion.short_delay_ms = 0;
        config.companion.long_delay_ms = 0;
        config
    }

    fn state_with(provider: Arc<StubProvider>, media: Arc<dyn MediaStore>) -> SharedState {
        let verifier = StaticTokenVerifier::new([
            (TOKEN.to_string(), UserId::from("alice")),
            ("other-token".to_string(), UserId::from("bob")),
        ]);
        Arc::new(GatewayState::assemble(
            Arc::new(InMemoryDocumentStore::new()),
            media,
            provider,
            PersonaLibrary::builtin(),
            Arc::new(verifier),
            &test_config(),
        ))
    }

    fn test_state(reply: &str) -> SharedState {
        state_with(StubProvider::new(Ok(reply.to_string())), Arc::new(DisabledMediaStore))
    }

    fn authed(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {TOKEN}"))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        authed(method, uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state("hi"));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = build_router(test_state("hi"));

        let missing = Request::builder().uri("/entries").body(Body::empty()).unwrap();
        let (status, body) = send(&app, missing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let wrong = Request::builder()
            .uri("/entries")
            .header("Authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, wrong).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn conversation_replies_and_records_history() {
        let app = build_router(test_state("Hello from Fumiko"));

        let (status, body) = send(
            &app,
            json_request("POST", "/conversation/fumiko", json!({"message": "Hi", "chat_id": "c1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Hello from Fumiko");
        assert_eq!(body["persona"], "fumiko");

        let (status, body) = send(&app, authed("GET", "/history/fumiko").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["message"], "Hi");
        assert_eq!(messages[0]["response"], "Hello from Fumiko");
        assert_eq!(messages[0]["chat_id"], "c1");
        assert!(messages[0]["id"].is_string());
    }

    #[tokio::test]
    async fn history_is_isolated_by_persona_and_user() {
        let app = build_router(test_state("ok"));
        send(&app, json_request("POST", "/conversation/krishna", json!({"message": "to krishna"}))).await;

        let (_, fumiko) = send(&app, authed("GET", "/history/fumiko").body(Body::empty()).unwrap()).await;
        assert!(fumiko["messages"].as_array().unwrap().is_empty());

        let (_, krishna) = send(&app, authed("GET", "/history/krishna?limit=5").body(Body::empty()).unwrap()).await;
        assert_eq!(krishna["messages"].as_array().unwrap().len(), 1);

        let bob = Request::builder()
            .uri("/history/krishna")
            .header("Authorization", "Bearer other-token")
            .body(Body::empty())
            .unwrap();
        let (_, bob) = send(&app, bob).await;
        assert!(bob["messages"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn conversation_rejects_bad_input_before_calling_the_model() {
        let provider = StubProvider::new(Ok("unused".into()));
        let app = build_router(state_with(provider.clone(), Arc::new(DisabledMediaStore)));

        let empty = json_request("POST", "/conversation/fumiko", json!({"message": "   "}));
        assert_eq!(send(&app, empty).await.0, StatusCode::BAD_REQUEST);

        let unknown = json_request("POST", "/conversation/nobody", json!({"message": "hi"}));
        assert_eq!(send(&app, unknown).await.0, StatusCode::BAD_REQUEST);

        let malformed = authed("POST", "/conversation/fumiko")
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        assert_eq!(send(&app, malformed).await.0, StatusCode::BAD_REQUEST);

        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_service_unavailable() {
        let provider = StubProvider::new(Err(ProviderError::Timeout("slow".into())));
        let app = build_router(state_with(provider, Arc::new(DisabledMediaStore)));

        let (status, body) = send(&app, json_request("POST", "/conversation/fumiko", json!({"message": "hi"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body["error"].as_str().unwrap().contains("slow"));

        let (_, history) = send(&app, authed("GET", "/history/fumiko").body(Body::empty()).unwrap()).await;
        assert!(history["messages"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_round_trip_over_json() {
        let app = build_router(test_state("ok"));

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/entries",
                json!({
                    "date_id": "2024-05-01",
                    "title": "May Day",
                    "blocks": [{"type": "text", "text": "Sunny"}, {"type": "image", "url": "blob:local/1"}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["date_id"], "2024-05-01");
        assert_eq!(body["blocks_saved"], 2);
        assert_eq!(body["message"], "Entry saved successfully");

        let (status, entry) = send(&app, authed("GET", "/entries/2024-05-01").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entry["title"], "May Day");
        assert_eq!(entry["blocks"][1]["url"], "");

        let (_, list) = send(&app, authed("GET", "/entries").body(Body::empty()).unwrap()).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["date_id"], "2024-05-01");

        let bad_date = json_request("POST", "/entries", json!({"date_id": "May 1st"}));
        assert_eq!(send(&app, bad_date).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn multipart_entry_stores_uploaded_media() {
        let media_root = tempfile::tempdir().unwrap();
        let media = LocalMediaStore::new(media_root.path().to_path_buf(), "http://test/media", 1024)
            .await
            .unwrap();
        let app = build_router(state_with(StubProvider::new(Ok("ok".into())), Arc::new(media)));

        let boundary = "XBOUNDARYX";
        let blocks = r#"[{"type":"text","text":"Look"},{"type":"image","url":"blob:local/1"}]"#;
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"date_id\"\r\n\r\n2024-05-02\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nPhotos\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"blocks\"\r\n\r\n{blocks}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file_1\"; filename=\"cat.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n\
             --{b}--\r\n",
            b = boundary
        );
        let req = authed("POST", "/entries")
            .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let (status, saved) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED, "{saved}");
        assert_eq!(saved["blocks_saved"], 2);

        let (_, entry) = send(&app, authed("GET", "/entries/2024-05-02").body(Body::empty()).unwrap()).await;
        let url = entry["blocks"][1]["url"].as_str().unwrap();
        assert!(url.starts_with("http://test/media/alice/2024-05-02/"), "{url}");
        assert!(url.ends_with("cat.png"));
    }

    #[tokio::test]
    async fn missing_entry_is_404_and_delete_is_idempotent() {
        let app = build_router(test_state("ok"));

        let (status, _) = send(&app, authed("GET", "/entries/2023-01-01").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        for _ in 0..2 {
            let (status, body) =
                send(&app, authed("DELETE", "/entries/2023-01-01").body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["message"], "Entry deleted successfully");
        }
    }

    #[tokio::test]
    async fn analyze_now_needs_an_entry() {
        let app = build_router(test_state(r#"{"summary": "Calm and curious", "emotional_state": "content"}"#));

        let (status, _) = send(&app, authed("POST", "/profile/analyze-now").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(
            &app,
            json_request(
                "POST",
                "/entries",
                json!({"date_id": "2024-05-03", "blocks": [{"type": "text", "text": "Read all afternoon"}]}),
            ),
        )
        .await;
        let (status, body) = send(&app, authed("POST", "/profile/analyze-now").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"]["summary"], "Calm and curious");
        assert_eq!(body["message"], "Profile analysis completed");
    }
}

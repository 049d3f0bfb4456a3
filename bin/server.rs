// Donor Linkage - Web Server
// REST API with Axum: run a resolution over JSON rows

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use donor_linkage::{
    find_fragmented_ids, Dataset, FragmentedId, GivingTotals, Platform, PlatformRegistry,
    ResolutionEngine, ResolutionError, ResolutionOptions, ResolutionReport, ResolvedRow,
    DEFAULT_ID_DELIMITER,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: Arc<PlatformRegistry>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// One platform export as JSON objects
#[derive(Deserialize)]
struct DatasetPayload {
    platform: String,
    /// Header of the export, for files whose rows are all missing a column
    #[serde(default)]
    columns: Vec<String>,
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl DatasetPayload {
    fn into_dataset(self) -> Dataset {
        let mut dataset = Dataset::from_json_rows(&self.platform, self.rows);
        for column in self.columns {
            if !dataset.has_column(&column) {
                dataset.columns.push(column);
            }
        }
        dataset
    }
}

#[derive(Deserialize)]
struct ResolveRequest {
    /// Overrides the server's platform configuration
    #[serde(default)]
    platforms: Option<Vec<Platform>>,
    #[serde(default)]
    options: Option<ResolutionOptions>,
    datasets: Vec<DatasetPayload>,
}

#[derive(Serialize)]
struct ResolveResponse {
    report: ResolutionReport,
    totals: GivingTotals,
    rows: Vec<ResolvedRow>,
}

#[derive(Deserialize)]
struct AuditRequest {
    ids: Vec<String>,
    #[serde(default)]
    delimiter: Option<String>,
}

fn failure<T: Serialize>(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::<T>::err(message))).into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/platforms - Platform configuration in use
async fn get_platforms(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.registry.platforms().to_vec()))
}

/// POST /api/resolve - Resolve identities across the posted datasets
async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> Response {
    let registry = match request.platforms {
        Some(platforms) => PlatformRegistry::from_platforms(platforms),
        None => state.registry.as_ref().clone(),
    };
    let options = request.options.unwrap_or_default();
    let datasets: Vec<Dataset> = request
        .datasets
        .into_iter()
        .map(DatasetPayload::into_dataset)
        .collect();

    info!(datasets = datasets.len(), "resolve request");

    // CPU-bound: keep it off the async workers
    let engine = ResolutionEngine::with_options(registry, options);
    let joined = tokio::task::spawn_blocking(move || engine.resolve(&datasets)).await;

    match joined {
        Ok(Ok(resolution)) => {
            let response = ResolveResponse {
                totals: GivingTotals::from_resolution(&resolution),
                rows: resolution.records().map(ResolvedRow::from_record).collect(),
                report: resolution.report,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Ok(Err(e)) if e.is_configuration() => {
            failure::<ResolveResponse>(StatusCode::BAD_REQUEST, e.to_string())
        }
        Ok(Err(e)) => {
            error!("Resolution failed: {}", e);
            failure::<ResolveResponse>(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("Resolution worker failed: {}", e);
            failure::<ResolveResponse>(
                StatusCode::INTERNAL_SERVER_ERROR,
                ResolutionError::WorkerPanicked.to_string(),
            )
        }
    }
}

/// POST /api/audit - Find fragmented Relationship IDs
async fn audit(Json(request): Json<AuditRequest>) -> impl IntoResponse {
    let delimiter = request
        .delimiter
        .unwrap_or_else(|| DEFAULT_ID_DELIMITER.to_string());
    let fragmented: Vec<FragmentedId> = find_fragmented_ids(&request.ids, &delimiter);

    Json(ApiResponse::ok(fragmented))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    println!("🌐 Donor Linkage - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Platform configuration: file from argv, else built-in defaults
    let registry = match std::env::args().nth(1) {
        Some(path) => PlatformRegistry::from_file(&path)?,
        None => PlatformRegistry::defaults(),
    };
    registry.validate()?;
    println!("✓ {} platforms configured", registry.len());

    // Create shared state
    let state = AppState {
        registry: Arc::new(registry),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/platforms", get(get_platforms))
        .route("/resolve", post(resolve))
        .route("/audit", post(audit))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("DONOR_LINKAGE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: POST /api/resolve, POST /api/audit, GET /api/platforms");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

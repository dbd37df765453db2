//! HTTP API: router, handlers and bearer token authentication.

use crate::app_state::{AppState, SharedAppState};
use crate::error::EquipStatError;
use crate::ingest;
use crate::metrics;
use crate::models::{
    AggregateEnvelope, EnvelopeSummary, HistoryQuery, LoginRequest, RefreshRequest, TokenPair,
};
use crate::report;
use crate::table;
use crate::validated_json::{ValidatedJson, ValidatedQuery};

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

/// Name of the multipart form field carrying the uploaded CSV file.
const UPLOAD_FIELD: &str = "file";

/// `axum` service type. Trailing slashes are removed from request paths before routing.
pub type Service = NormalizePath<Router>;

/// Returns an [axum::Router] for the equipstat API
///
/// The router is populated with all routes as well as the following middleware:
///
/// * a [tower_http::trace::TraceLayer] for tracing requests and responses, feeding the request
///   and response metrics
/// * a bearer token check on every dataset route
/// * a limit on the size of request bodies
///
/// # Arguments
///
/// * `state`: Shared application state
pub fn router(state: SharedAppState) -> Router {
    let datasets = Router::new()
        .route("/upload", post(upload))
        .route("/history", get(history))
        .route("/datasets/:id", get(dataset))
        .route("/datasets/:id/report", get(dataset_report))
        .route("/datasets/:id/report.pdf", get(dataset_report))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/.well-known/equipstat-schema", get(schema))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/api/token", post(token))
        .route("/api/token/refresh", post(token_refresh))
        .merge(datasets)
        .layer(DefaultBodyLimit::max(state.args.max_upload_size))
        .layer(
            TraceLayer::new_for_http()
                .on_request(metrics::request_counter)
                .on_response(metrics::record_response_metrics),
        )
        .with_state(state)
}

/// Returns an [axum::Router] for the equipstat API, wrapped to normalise request paths.
pub fn service(state: SharedAppState) -> Service {
    NormalizePathLayer::trim_trailing_slash().layer(router(state))
}

/// Create the application state and return the service built on it.
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn init(args: &crate::cli::CommandLineArgs) -> Result<Service, EquipStatError> {
    let state = AppState::new(args)?;
    Ok(service(Arc::new(state)))
}

/// Reject requests without a valid bearer access token.
async fn authenticate(
    State(state): State<SharedAppState>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, EquipStatError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .ok_or(EquipStatError::Unauthorized)?;
    let username = state.authority.verify(&token).await?;
    tracing::debug!(username = %username, "Authenticated request");
    Ok(next.run(request).await)
}

async fn schema() -> &'static str {
    "equipstat: upload equipment sensor CSV tables to /upload and read summaries of the most \
     recent uploads from /history and /datasets/:id"
}

/// Log in with a username and password.
async fn token(
    State(state): State<SharedAppState>,
    ValidatedJson(login): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenPair>, EquipStatError> {
    let pair = state.authority.issue(&login.username, &login.password).await?;
    Ok(Json(pair))
}

/// Exchange a refresh token for a new token pair.
async fn token_refresh(
    State(state): State<SharedAppState>,
    ValidatedJson(request): ValidatedJson<RefreshRequest>,
) -> Result<Json<TokenPair>, EquipStatError> {
    let pair = state.authority.refresh(&request.refresh).await?;
    Ok(Json(pair))
}

/// Read the uploaded file from a multipart form.
async fn read_upload(multipart: &mut Multipart) -> Result<bytes::Bytes, EquipStatError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(field.bytes().await?);
        }
    }
    Err(EquipStatError::UploadMissing)
}

/// Parse and summarise an uploaded CSV table.
fn summarise(data: &[u8]) -> Result<EnvelopeSummary, EquipStatError> {
    let rows = table::parse_csv(data)?;
    ingest::build(&rows)
}

/// Summarise an uploaded CSV table and retain the summary.
///
/// Nothing is retained if the table cannot be summarised.
#[tracing::instrument(level = "DEBUG", skip(state, multipart))]
async fn upload(
    State(state): State<SharedAppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<AggregateEnvelope>), EquipStatError> {
    let mut multipart = multipart?;
    let data = read_upload(&mut multipart).await?;
    let _memory_permit = state.resource_manager.memory(data.len()).await?;
    let _task_permit = state.resource_manager.task().await?;
    let summary = if state.args.use_rayon {
        tokio_rayon::spawn(move || summarise(&data)).await?
    } else {
        summarise(&data)?
    };
    let envelope = state.store.append(summary).await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

/// List retained summaries, most recent first.
async fn history(
    State(state): State<SharedAppState>,
    ValidatedQuery(query): ValidatedQuery<HistoryQuery>,
) -> Json<Vec<AggregateEnvelope>> {
    let limit = query.limit.unwrap_or(state.store.capacity().get());
    Json(state.store.list(limit).await)
}

async fn dataset(
    State(state): State<SharedAppState>,
    Path(id): Path<u64>,
) -> Result<Json<AggregateEnvelope>, EquipStatError> {
    Ok(Json(state.store.get(id).await?))
}

/// Render the report document of a retained summary.
async fn dataset_report(
    State(state): State<SharedAppState>,
    Path(id): Path<u64>,
) -> Result<Response, EquipStatError> {
    let envelope = state.store.get(id).await?;
    let document = state.renderer.render(&report::project(&envelope))?;
    Ok((
        [
            (header::CONTENT_TYPE, state.renderer.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", state.renderer.file_name(id)),
            ),
        ],
        document,
    )
        .into_response())
}

/*!
The HTTP interface.

| Route | Response |
|-------|----------|
| `GET /files` | the registered files |
| `GET\|POST /index/{key}` | an [`IndexListing`] of a file's scans |
| `GET\|POST /scan/{key}/{scan_id}` | a [`ScanRecord`] |
| `GET\|POST /scan_index_to_id/{key}/{index}` | a [`ScanRecord`] |

Processing parameters (`ms1-averaging`, `ms1-averagine`, `msn-averagine`) are
read from the query string and, for `POST`, from a URL-encoded or multipart
form body. Errors are reported as `{"error": message}`.
*/
use std::io;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use log::{debug, error, info, warn};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ProcessingConfig;
use crate::pipeline::ScanProcessor;
use crate::record::{FileListingRecord, IndexListing, ScanRecord};
use crate::registry::{FileRegistry, FileRegistryEntry, RegistryError};
use crate::source::{ScanAccessError, ScanCriterion, ScanSource};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    ScanAccess(#[from] ScanAccessError),
    #[error("{0}")]
    BadRequest(String),
    #[error("The processing task failed: {0}")]
    TaskFailed(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Registry(e) if e.is_unknown_key() => StatusCode::NOT_FOUND,
            Self::ScanAccess(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// The request parameters, in the order they were given
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RequestParams(pub Vec<(String, String)>);

impl RequestParams {
    pub fn config(&self) -> ProcessingConfig {
        ProcessingConfig::from_params(self.0.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequest<S> for RequestParams {
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bad_request = |e: &dyn std::fmt::Display| ServiceError::BadRequest(e.to_string());

        let mut params = if req.uri().query().is_some() {
            Query::<Vec<(String, String)>>::try_from_uri(req.uri())
                .map_err(|e| bad_request(&e))?
                .0
        } else {
            Vec::new()
        };

        if req.method() != Method::POST {
            return Ok(Self(params));
        }

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| bad_request(&e))?;
            while let Some(field) = multipart.next_field().await.map_err(|e| bad_request(&e))? {
                let Some(name) = field.name().map(|s| s.to_string()) else {
                    continue;
                };
                let value = field.text().await.map_err(|e| bad_request(&e))?;
                params.push((name, value));
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| bad_request(&e))?;
            params.extend(body);
        }
        Ok(Self(params))
    }
}

/// Shared, read-only state handed to every request handler
pub struct AppState<R: ScanSource> {
    pub registry: Arc<FileRegistry<R>>,
    pub processor: Arc<ScanProcessor>,
}

impl<R: ScanSource> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            processor: self.processor.clone(),
        }
    }
}

impl<R: ScanSource> AppState<R> {
    pub fn new(registry: FileRegistry<R>, processor: ScanProcessor) -> Self {
        Self {
            registry: Arc::new(registry),
            processor: Arc::new(processor),
        }
    }
}

/// Where to listen and whom to let in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to make cross-origin requests. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            allowed_origins: Vec::new(),
        }
    }
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring invalid origin {o:?}: {e}");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn router<R: ScanSource + 'static>(state: AppState<R>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/files", get(list_files::<R>))
        .route("/index/:key", get(scan_index::<R>).post(scan_index::<R>))
        .route(
            "/scan/:key/:scan_id",
            get(scan_by_id::<R>).post(scan_by_id::<R>),
        )
        .route(
            "/scan_index_to_id/:key/:index",
            get(scan_by_index::<R>).post(scan_by_index::<R>),
        )
        .layer(cors)
        .with_state(state)
}

async fn list_files<R: ScanSource + 'static>(
    State(state): State<AppState<R>>,
) -> Json<Vec<FileListingRecord>> {
    let files = state
        .registry
        .iter()
        .map(|entry| FileListingRecord {
            key: entry.key().to_string(),
            path: entry.path().display().to_string(),
            scan_count: entry.index().len(),
        })
        .collect();
    Json(files)
}

async fn scan_index<R: ScanSource + 'static>(
    State(state): State<AppState<R>>,
    Path(key): Path<String>,
) -> Result<Json<IndexListing>, ServiceError> {
    let entry = state.registry.resolve(&key)?;
    Ok(Json(IndexListing::from(entry.index())))
}

async fn scan_by_id<R: ScanSource + 'static>(
    State(state): State<AppState<R>>,
    Path((key, scan_id)): Path<(String, String)>,
    params: RequestParams,
) -> Result<Json<ScanRecord>, ServiceError> {
    let entry = state.registry.resolve(&key)?;
    process_scan(&state, entry, ScanCriterion::Id(scan_id), params.config()).await
}

async fn scan_by_index<R: ScanSource + 'static>(
    State(state): State<AppState<R>>,
    Path((key, index)): Path<(String, String)>,
    params: RequestParams,
) -> Result<Json<ScanRecord>, ServiceError> {
    let index: usize = index
        .parse()
        .map_err(|e| ServiceError::BadRequest(format!("Invalid scan index {index:?}: {e}")))?;
    let entry = state.registry.resolve(&key)?;
    process_scan(&state, entry, ScanCriterion::Index(index), params.config()).await
}

/// Fetch and process a scan on the blocking thread pool
async fn process_scan<R: ScanSource + 'static>(
    state: &AppState<R>,
    entry: Arc<FileRegistryEntry<R>>,
    criterion: ScanCriterion,
    config: ProcessingConfig,
) -> Result<Json<ScanRecord>, ServiceError> {
    let processor = state.processor.clone();
    let record = tokio::task::spawn_blocking(move || {
        processor
            .process_entry(&entry, &criterion, &config)
            .map(|scan| ScanRecord::from(&scan))
    })
    .await
    .map_err(|e| ServiceError::TaskFailed(e.to_string()))??;
    Ok(Json(record))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Serve `state` until interrupted
pub async fn serve<R: ScanSource + 'static>(state: AppState<R>, config: &ServerConfig) -> io::Result<()> {
    let app = router(state, cors_layer(&config.allowed_origins));
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = ServiceError::from(RegistryError::UnknownKey("9".into()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let err = ServiceError::from(ScanAccessError::IdNotFound("scan=1".into()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let err = ServiceError::from(ScanAccessError::ArrayRetrieval {
            id: "scan=1".into(),
            message: "bad".into(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = ServiceError::BadRequest("nope".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_request_params_config() {
        let params = RequestParams(vec![
            ("ms1-averaging".into(), "1".into()),
            ("msn-averagine".into(), "glycan".into()),
        ]);
        let config = params.config();
        assert_eq!(config.ms1_averaging, 1);
        assert_eq!(
            config.msn.averagine,
            crate::deconvolution::AveragineModel::Glycan
        );
    }
}

//! JSON routes over [`SearchService`].
//!
//! Every response carries a `result` flag; failures add an `error` message.

use crate::fetcher::Fetch;
use crate::indexer::ReindexError;
use crate::search::{SearchError, SearchHit, SearchRequest, DEFAULT_LIMIT};
use crate::service::{SearchService, ServiceError};
use crate::stats::StatisticsData;
use crate::store::Storage;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

/// Builds the router with `service` as shared state.
pub fn router<S: Storage, F: Fetch>(service: Arc<SearchService<S, F>>) -> Router {
    Router::new()
        .route("/api/statistics", get(statistics::<S, F>))
        .route("/api/startIndexing", get(start_indexing::<S, F>))
        .route("/api/stopIndexing", get(stop_indexing::<S, F>))
        .route("/api/indexPage", post(index_page::<S, F>))
        .route("/api/search", get(search::<S, F>))
        .with_state(service)
}

/// Success body without payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct OkBody {
    /// Always `true`.
    pub result: bool,
}

/// Failure body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub result: bool,
    /// Human-readable reason.
    pub error: String,
}

/// Statistics response.
#[derive(Debug, Serialize)]
pub struct StatisticsBody {
    /// Always `true`.
    pub result: bool,
    /// Totals and per-site rows.
    pub statistics: StatisticsData,
}

/// Search response.
#[derive(Debug, Serialize)]
pub struct SearchBody {
    /// Always `true`.
    pub result: bool,
    /// Total matching pages before pagination.
    pub count: usize,
    /// Requested window of ranked hits.
    pub data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct IndexPageParams {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    site: Option<String>,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

const OK: OkBody = OkBody { result: true };

async fn statistics<S: Storage, F: Fetch>(
    State(service): State<Arc<SearchService<S, F>>>,
) -> ApiResult<StatisticsBody> {
    let statistics = service.statistics().await.map_err(service_error)?;
    Ok(Json(StatisticsBody {
        result: true,
        statistics,
    }))
}

async fn start_indexing<S: Storage, F: Fetch>(
    State(service): State<Arc<SearchService<S, F>>>,
) -> ApiResult<OkBody> {
    service.start_indexing().map_err(service_error)?;
    Ok(Json(OK))
}

async fn stop_indexing<S: Storage, F: Fetch>(
    State(service): State<Arc<SearchService<S, F>>>,
) -> ApiResult<OkBody> {
    service.stop_indexing().map_err(service_error)?;
    Ok(Json(OK))
}

async fn index_page<S: Storage, F: Fetch>(
    State(service): State<Arc<SearchService<S, F>>>,
    Query(params): Query<IndexPageParams>,
) -> ApiResult<OkBody> {
    let Some(url) = params.url.filter(|url| !url.trim().is_empty()) else {
        return Err(failure(StatusCode::BAD_REQUEST, "url parameter is required"));
    };
    service.index_page(&url).await.map_err(service_error)?;
    Ok(Json(OK))
}

async fn search<S: Storage, F: Fetch>(
    State(service): State<Arc<SearchService<S, F>>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchBody> {
    let request = SearchRequest {
        query: params.query.unwrap_or_default(),
        site: params.site.filter(|site| !site.is_empty()),
        offset: params.offset,
        limit: params.limit,
    };
    let results = service.search(&request).await.map_err(service_error)?;
    Ok(Json(SearchBody {
        result: true,
        count: results.count,
        data: results.data,
    }))
}

fn service_error(err: ServiceError) -> (StatusCode, Json<ErrorBody>) {
    match &err {
        ServiceError::AlreadyIndexing => failure(StatusCode::CONFLICT, "Indexing is already running"),
        ServiceError::NotIndexing => {
            failure(StatusCode::METHOD_NOT_ALLOWED, "Indexing is not running")
        }
        ServiceError::Reindex(
            ReindexError::NotConfigured(_)
            | ReindexError::NotYetIndexed(_)
            | ReindexError::InvalidUrl { .. },
        ) => failure(StatusCode::BAD_REQUEST, err.to_string()),
        ServiceError::Search(SearchError::EmptyQuery) => {
            failure(StatusCode::BAD_REQUEST, "Empty search query")
        }
        _ => {
            error!(error = %err, "request failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            result: false,
            error: message.into(),
        }),
    )
}

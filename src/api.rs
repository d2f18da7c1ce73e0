//! # HTTP API
//!
//! A thin JSON adapter over `CrawlOrchestrator` and `PageStore`. Each handler
//! maps one request to one library call; no pipeline logic lives here.
//!
//! | Method | Path                  | Purpose                                 |
//! |--------|-----------------------|-----------------------------------------|
//! | POST   | `/api/crawl`          | `obtain` a URL                          |
//! | GET    | `/api/pages`          | Filtered, paginated listing             |
//! | POST   | `/api/get-clean-json` | Clean export of pages by id             |
//! | GET    | `/api/status`         | Readiness                               |
//! | POST   | `/api/shutdown`       | Release the acquisition session         |

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::crawler::{Acquisition, CrawlOrchestrator};
use crate::error::Result;
use crate::store::{CleanPage, PageFilter, PageRecord, StorageError};

/// Page size used when a listing request does not give one
pub const DEFAULT_PER_PAGE: u32 = 10;

struct AppState<A> {
    orchestrator: Arc<CrawlOrchestrator<A>>,
}

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
        }
    }
}

/// Body of `POST /api/crawl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// URL to obtain
    pub url: String,
}

/// Response of `POST /api/crawl`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResponse {
    /// Canonical URL of the page, or the requested URL on failure
    pub url: String,
    /// Title of the page
    pub title: String,
    /// Short description of the page
    pub description: String,
    /// Normalized body text
    pub content: String,
    /// Whether the page was obtained
    pub success: bool,
    /// True when the stored copy was fresh
    pub cached: bool,
    /// Outcome or error description
    pub message: String,
}

/// Query of `GET /api/pages`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagesQuery {
    /// Case-insensitive URL substring
    pub url: Option<String>,
    /// Case-insensitive title substring
    pub title: Option<String>,
    /// 1-based page number, default 1
    pub page: Option<u32>,
    /// Records per page, default `DEFAULT_PER_PAGE`
    pub per_page: Option<u32>,
}

/// Response of `GET /api/pages`
#[derive(Debug, Clone, Serialize)]
pub struct PagesResponse {
    /// Always true; failures use the error body
    pub success: bool,
    /// Records on this page
    pub count: usize,
    /// Records matching the filter
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Number of pages for the filter
    pub total_pages: u64,
    /// Records on this page, most recently refreshed first
    pub pages: Vec<PageRecord>,
}

/// Body of `POST /api/get-clean-json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanJsonRequest {
    /// Page ids to export, in output order
    pub ids: Vec<i64>,
}

/// Error response with a JSON body of `{success: false, message}`
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        let status = match err {
            StorageError::InvalidPagination { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Build the API router over `orchestrator`
pub fn router<A: Acquisition + 'static>(orchestrator: Arc<CrawlOrchestrator<A>>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/api/crawl", post(crawl_handler::<A>))
        .route("/api/pages", get(pages_handler::<A>))
        .route("/api/get-clean-json", post(clean_json_handler::<A>))
        .route("/api/status", get(status_handler::<A>))
        .route("/api/shutdown", post(shutdown_handler::<A>))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves
pub async fn serve<A, F>(
    orchestrator: Arc<CrawlOrchestrator<A>>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<()>
where
    A: Acquisition + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn crawl_handler<A: Acquisition + 'static>(
    State(state): State<AppState<A>>,
    Json(request): Json<CrawlRequest>,
) -> Response {
    match state.orchestrator.obtain(&request.url).await {
        Ok(obtained) => {
            let message = if obtained.served_from_cache {
                "Served from cache"
            } else {
                "Page crawled and stored"
            };
            let record = obtained.record;
            Json(CrawlResponse {
                url: record.url,
                title: record.title,
                description: record.description,
                content: record.content,
                success: true,
                cached: obtained.served_from_cache,
                message: message.to_string(),
            })
            .into_response()
        }
        Err(e) => {
            error!("Crawl of {} failed: {}", request.url, e);
            let body = CrawlResponse {
                url: request.url,
                success: false,
                message: e.to_string(),
                ..Default::default()
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn pages_handler<A: Acquisition + 'static>(
    State(state): State<AppState<A>>,
    Query(query): Query<PagesQuery>,
) -> std::result::Result<Json<PagesResponse>, ApiError> {
    let filter = PageFilter {
        url_contains: query.url,
        title_contains: query.title,
    };
    let listing = state
        .orchestrator
        .store()
        .list(
            &filter,
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(DEFAULT_PER_PAGE),
        )
        .await?;

    Ok(Json(PagesResponse {
        success: true,
        count: listing.records.len(),
        total: listing.total_count,
        page: listing.page,
        total_pages: listing.total_pages,
        pages: listing.records,
    }))
}

async fn clean_json_handler<A: Acquisition + 'static>(
    State(state): State<AppState<A>>,
    Json(request): Json<CleanJsonRequest>,
) -> std::result::Result<Json<Vec<CleanPage>>, ApiError> {
    let pages = state.orchestrator.store().export_clean(&request.ids).await?;
    Ok(Json(pages))
}

async fn status_handler<A: Acquisition + 'static>(
    State(state): State<AppState<A>>,
) -> impl IntoResponse {
    let ready = state.orchestrator.is_ready();
    Json(json!({
        "status": if ready { "running" } else { "shut_down" },
        "ready": ready,
        "session_open": state.orchestrator.session_open(),
    }))
}

async fn shutdown_handler<A: Acquisition + 'static>(
    State(state): State<AppState<A>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    state
        .orchestrator
        .release_session()
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Acquisition session released",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{AcquisitionError, CrawlerConfig, RenderOptions, RenderedPage};
    use crate::store::PageStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::ServiceExt;

    struct StaticPage {
        open: bool,
    }

    #[async_trait]
    impl Acquisition for StaticPage {
        async fn render(
            &mut self,
            url: &str,
            _options: &RenderOptions,
        ) -> std::result::Result<RenderedPage, AcquisitionError> {
            if url.contains("broken") {
                return Err(AcquisitionError::Navigation { status: 500 });
            }
            self.open = true;
            Ok(RenderedPage {
                html: format!(
                    "<html><head><title>Title of {}</title></head><body><p>Body text</p></body></html>",
                    url
                ),
                ..Default::default()
            })
        }

        async fn close(&mut self) -> std::result::Result<(), AcquisitionError> {
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    async fn setup() -> (Router, Arc<CrawlOrchestrator<StaticPage>>, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir
            .path()
            .join("pages.db")
            .to_string_lossy()
            .to_string();
        let store = PageStore::open(&db_path).await.unwrap();
        let config = CrawlerConfig::builder()
            .database_path(db_path)
            .settle_delay_secs(0)
            .build();
        let orchestrator = Arc::new(CrawlOrchestrator::new(
            store,
            StaticPage { open: false },
            config,
        ));
        (router(orchestrator.clone()), orchestrator, temp_dir)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_crawl_then_cached() {
        let (app, _orchestrator, _temp_dir) = setup().await;

        let (status, body) = send(
            &app,
            post_json("/api/crawl", json!({"url": "https://example.com/"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["cached"], false);
        assert_eq!(body["title"], "Title of https://example.com/");
        assert_eq!(body["content"], "Body text");

        let (_, body) = send(
            &app,
            post_json("/api/crawl", json!({"url": "https://example.com/"})),
        )
        .await;
        assert_eq!(body["cached"], true);
    }

    #[tokio::test]
    async fn test_crawl_failure_is_500() {
        let (app, _orchestrator, _temp_dir) = setup().await;

        let (status, body) = send(
            &app,
            post_json("/api/crawl", json!({"url": "https://example.com/broken"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_list_pages_with_filter() {
        let (app, orchestrator, _temp_dir) = setup().await;
        for path in ["a", "b", "other"] {
            orchestrator
                .obtain(&format!("https://example.com/{}", path))
                .await
                .unwrap();
        }

        let (status, body) = send(&app, get("/api/pages?url=EXAMPLE&per_page=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["count"], 2);
        assert_eq!(body["total_pages"], 2);
        assert!(body["pages"][0].get("raw_markup").is_none());

        let (_, body) = send(&app, get("/api/pages?url=other")).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["pages"][0]["url"], "https://example.com/other");
    }

    #[tokio::test]
    async fn test_list_pages_rejects_page_zero() {
        let (app, _orchestrator, _temp_dir) = setup().await;

        let (status, body) = send(&app, get("/api/pages?page=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_list_pages_rejects_offset_overflow() {
        let (app, _orchestrator, _temp_dir) = setup().await;

        let (status, body) = send(
            &app,
            get("/api/pages?page=4294967295&per_page=4294967295"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_get_clean_json() {
        let (app, orchestrator, _temp_dir) = setup().await;
        let first = orchestrator.obtain("https://example.com/1").await.unwrap();
        let second = orchestrator.obtain("https://example.com/2").await.unwrap();

        let (status, body) = send(
            &app,
            post_json(
                "/api/get-clean-json",
                json!({"ids": [second.record.id, 404, first.record.id]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let pages = body.as_array().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0]["url"], "https://example.com/2");
        assert_eq!(pages[1]["content"], "Body text");
    }

    #[tokio::test]
    async fn test_status_and_shutdown() {
        let (app, orchestrator, _temp_dir) = setup().await;
        orchestrator.obtain("https://example.com/").await.unwrap();

        let (_, body) = send(&app, get("/api/status")).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["ready"], true);
        assert_eq!(body["session_open"], true);

        let (status, body) = send(&app, post_json("/api/shutdown", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = send(&app, get("/api/status")).await;
        assert_eq!(body["session_open"], false);
        assert_eq!(body["ready"], true);
    }
}

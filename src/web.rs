use crate::app::{App, AppError};
use crate::config::Config;
use crate::posts::{Post, PostSummary};
use crate::refresh::RefreshSummary;
use crate::search::{SearchError, SearchHit};
use crate::store::PlatformInfo;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    app: Arc<App>,
}

async fn start_app(app: App, addr: &str, preload: bool) -> anyhow::Result<()> {
    let app = Arc::new(app);

    if preload {
        let app = app.clone();
        tokio::spawn(async move {
            log::info!("preloading model and refreshing stale platforms");
            let summary = app.preload().await;
            for status in &summary.platforms {
                log::info!("preload '{}': {:?}", status.platform, status.outcome);
            }
        });
    }

    let shared_state = Arc::new(SharedState { app });

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    let router = router(shared_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(shared_state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/api/posts/list", post(list))
        .route("/api/posts/get", post(get_post))
        .route("/api/posts/search", post(search))
        .route("/api/refresh", post(refresh))
        .route("/api/platforms", get(platforms))
        .route("/api/config", get(get_config))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

pub fn start_daemon(app: App, addr: &str, preload: bool) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(app, addr, preload).await })
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({"error": self.0.to_string()}).to_string();
        match self.0 {
            AppError::NotFound(_) => (axum::http::StatusCode::NOT_FOUND, body),
            AppError::Search(SearchError::InvalidTopN)
            | AppError::Search(SearchError::InvalidMinSimilarity(_)) => {
                (axum::http::StatusCode::BAD_REQUEST, body)
            }
            AppError::Config(_) => {
                log::error!("{self:?}");
                (axum::http::StatusCode::BAD_REQUEST, body)
            }
            _ => {
                log::error!("{self:?}");
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPostsRequest {
    pub platform: Option<String>,
}

async fn list(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ListPostsRequest>,
) -> Result<axum::Json<Vec<PostSummary>>, HttpError> {
    log::debug!("payload: {payload:?}");

    state
        .app
        .list_posts(payload.platform.as_deref())
        .map(Into::into)
        .map_err(Into::into)
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetPostRequest {
    pub id: String,
}

async fn get_post(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<GetPostRequest>,
) -> Result<axum::Json<Post>, HttpError> {
    log::debug!("payload: {payload:?}");

    state.app.get_post(&payload.id).map(Into::into).map_err(Into::into)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_n: Option<usize>,
    pub min_similarity: Option<f32>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<axum::Json<Vec<SearchHit>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    // query embedding may run model inference
    tokio::task::block_in_place(move || {
        app.search(&payload.query, payload.top_n, payload.min_similarity)
            .map(Into::into)
            .map_err(Into::into)
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    pub platform: Option<String>,

    #[serde(default)]
    pub force: bool,
}

async fn refresh(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<axum::Json<RefreshSummary>, HttpError> {
    log::debug!("payload: {payload:?}");

    state
        .app
        .refresh(payload.platform.as_deref(), payload.force)
        .await
        .map(Into::into)
        .map_err(Into::into)
}

async fn platforms(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Vec<PlatformInfo>>, HttpError> {
    Ok(state.app.platforms().into())
}

async fn get_config(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Config>, HttpError> {
    Ok(state.app.config().clone().into())
}

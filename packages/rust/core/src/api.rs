//! HTTP menu API.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use localvore_scraper::SeasonalGuide;
use localvore_shared::{LocalvoreError, Result};
use localvore_storage::Storage;

use crate::pipeline::{MenuRequest, recommend};

/// Shared state behind every route.
#[derive(Clone)]
pub struct ApiState {
    pub storage: Arc<Storage>,
    pub guide: SeasonalGuide,
    /// Collections searched when the request names none.
    pub default_collections: Vec<String>,
    /// Menu length when the request gives none.
    pub default_n: usize,
}

#[derive(Debug, Deserialize)]
struct MenuParams {
    /// Comma-separated collection names.
    collections: Option<String>,
    n: Option<usize>,
    seed: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MenuResponse {
    pub menu: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip)]
    status: StatusCode,
}

impl From<LocalvoreError> for ApiError {
    fn from(e: LocalvoreError) -> Self {
        let status = match &e {
            LocalvoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            LocalvoreError::Validation { .. } => StatusCode::BAD_REQUEST,
            LocalvoreError::Network(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            error: e.to_string(),
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/api/menu/{state}", get(menu))
        .with_state(state)
}

async fn hello() -> &'static str {
    "Hello World!"
}

async fn menu(
    State(api): State<ApiState>,
    Path(state): Path<String>,
    Query(params): Query<MenuParams>,
) -> std::result::Result<Json<MenuResponse>, ApiError> {
    let collections = match params.collections.as_deref() {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        None => api.default_collections.clone(),
    };

    let request = MenuRequest {
        state,
        collections,
        n: params.n.unwrap_or(api.default_n),
        seed: params.seed,
    };

    match recommend(&api.storage, &api.guide, &request).await {
        Ok(menu) => Ok(Json(MenuResponse { menu })),
        Err(e) => {
            warn!(state = %request.state, error = %e, "menu request failed");
            Err(e.into())
        }
    }
}

/// Serve the menu API on `bind` until Ctrl-C.
pub async fn serve(bind: &str, state: ApiState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| LocalvoreError::Network(format!("cannot bind {bind}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| LocalvoreError::Network(format!("cannot bind {bind}: {e}")))?;
    info!(%local, "menu API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| LocalvoreError::Network(format!("server error: {e}")))?;

    info!("menu API stopped");
    Ok(())
}

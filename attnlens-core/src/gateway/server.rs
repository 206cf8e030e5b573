//! HTTP gateway server built on axum.

use super::GatewayConfig;
use crate::canvas::{render_bar_figure, render_heatmap_figure};
use crate::error::{AttnLensError, ModelError};
use crate::view::{ViewModel, ViewRequest, Viewer};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = include_str!("index.html");

/// Thread-safe shared gateway reference for axum handlers.
///
/// The lock is held only to read settings and touch the model cache, never
/// across a model load or a forward pass.
pub type SharedGateway = Arc<Mutex<GatewayServer>>;

/// The HTTP gateway server.
#[derive(Debug)]
pub struct GatewayServer {
    config: GatewayConfig,
    viewer: Viewer,
    started_at: chrono::DateTime<Utc>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, viewer: Viewer) -> Self {
        Self {
            config,
            viewer,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut Viewer {
        &mut self.viewer
    }

    /// Uptime in seconds since the server was created.
    pub fn uptime_secs(&self) -> u64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_seconds().max(0) as u64
    }

    /// Settings the page needs to build its widgets.
    pub fn settings_json(&self) -> Value {
        let cfg = self.viewer.config();
        json!({
            "models": cfg.models,
            "default_model": cfg.default_model(),
            "min_tokens": cfg.min_tokens,
            "max_tokens": cfg.max_tokens,
            "token_step": cfg.token_step,
            "default_tokens": cfg.default_tokens,
            "default_sentence": cfg.default_sentence,
            "default_token_index": cfg.default_token_index,
        })
    }
}

/// Query string of `/api/view`. Missing fields fall back to the configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub sentence: Option<String>,
    pub model: Option<String>,
    pub max_len: Option<usize>,
    pub layer: Option<usize>,
    pub head: Option<usize>,
    pub token: Option<usize>,
}

impl ViewQuery {
    fn into_request(self, defaults: ViewRequest) -> ViewRequest {
        ViewRequest {
            sentence: self.sentence.unwrap_or(defaults.sentence),
            model: self.model.unwrap_or(defaults.model),
            max_tokens: self.max_len.unwrap_or(defaults.max_tokens),
            layer: self.layer.unwrap_or(defaults.layer),
            head: self.head.unwrap_or(defaults.head),
            token: self.token.unwrap_or(defaults.token),
        }
    }
}

/// Build an axum Router with the page, `/health` and the JSON API.
pub fn router(shared: SharedGateway) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/settings", get(settings_handler))
        .route("/api/view", get(view_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let gw = gw.lock().await;
    Json(json!({
        "status": "ok",
        "loaded_models": gw.viewer().models().loaded_names(),
        "uptime_secs": gw.uptime_secs(),
    }))
}

async fn settings_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let gw = gw.lock().await;
    Json(gw.settings_json())
}

async fn view_handler(
    State(gw): State<SharedGateway>,
    Query(query): Query<ViewQuery>,
) -> Response {
    let prepared = {
        let gw = gw.lock().await;
        let request = query.into_request(ViewRequest::from_config(gw.viewer().config()));
        gw.viewer().prepare(&request)
    };
    let pending = match prepared {
        Ok(Some(pending)) => pending,
        Ok(None) => return Json(json!({ "view": null })).into_response(),
        Err(e) => return error_response(e),
    };

    // Model loading and the forward pass run without the gateway lock.
    let outcome = match tokio::task::spawn_blocking(move || pending.run()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            return error_response(
                ModelError::inference(format!("Inference task join error: {e}")).into(),
            );
        }
    };

    let completed = gw.lock().await.viewer_mut().complete(outcome);
    match completed {
        Ok(view) => Json(json!({ "view": view_json(&view) })).into_response(),
        Err(e) => error_response(e),
    }
}

/// Render a view's chart specs to Plotly figures for the page.
pub fn view_json(view: &ViewModel) -> Value {
    let grid: Vec<Value> = view
        .head_grid
        .iter()
        .map(|panel| {
            json!({
                "head": panel.head,
                "summary": panel.summary,
                "figure": render_bar_figure(&panel.bar),
            })
        })
        .collect();

    json!({
        "tokens": view.tokens,
        "num_layers": view.num_layers,
        "num_heads": view.num_heads,
        "seq_len": view.seq_len,
        "selection": view.selection,
        "query_token": view.query_token,
        "colored_sentence": view.colored_sentence,
        "head_summary": view.head_summary,
        "row_bar": render_bar_figure(&view.row_bar),
        "heatmap": render_heatmap_figure(&view.heatmap),
        "head_grid": grid,
    })
}

fn error_response(err: AttnLensError) -> Response {
    let status = match &err {
        AttnLensError::View(_) | AttnLensError::Render(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "View request failed");
    } else {
        tracing::debug!(error = %err, "Rejected view request");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Start the gateway server on the configured address.
///
/// This is an async function that runs until cancelled.
pub async fn run(gw: SharedGateway) -> Result<(), std::io::Error> {
    let (host, port) = {
        let gw = gw.lock().await;
        (gw.config().host.clone(), gw.config().port)
    };
    let app = router(gw);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Attention viewer listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

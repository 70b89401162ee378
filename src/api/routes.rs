//! Debug route definitions.

use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::dashboard::{IndexPage, MonitorPage, PAGES};
use super::state::AppState;

pub fn debug_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/debug/monitor", get(monitor))
        .route("/debug/monitor/{command}", post(monitor_command))
        .route("/debug/config", get(config))
        .route("/metrics", get(metrics))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn render<T: Template>(page: T) -> Response {
    match page.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render debug page");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page").into_response()
        }
    }
}

async fn index() -> Response {
    render(IndexPage {
        version: env!("CARGO_PKG_VERSION"),
        pages: PAGES,
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

#[derive(Debug, Deserialize)]
struct FormatQuery {
    format: Option<String>,
}

fn wants_json(query: &FormatQuery, headers: &HeaderMap) -> bool {
    if let Some(format) = &query.format {
        return format.eq_ignore_ascii_case("json");
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

async fn monitor(
    State(state): State<AppState>,
    Query(query): Query<FormatQuery>,
    headers: HeaderMap,
) -> Response {
    let snapshot = state.view.snapshot();
    if wants_json(&query, &headers) {
        return Json(json!({ "data": snapshot, "meta": meta() })).into_response();
    }
    render(MonitorPage::from(&snapshot))
}

fn is_form_post(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

async fn monitor_command(
    State(state): State<AppState>,
    Path(command): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.view.execute(&command) {
        Ok(cmd) => {
            if is_form_post(&headers) {
                return Redirect::to("/debug/monitor").into_response();
            }
            Json(json!({
                "data": { "command": cmd.as_str(), "monitor": state.view.snapshot() },
                "meta": meta()
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string(), "meta": meta() })),
        )
            .into_response(),
    }
}

async fn config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": *state.config, "meta": meta() }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.sink.render_metrics() {
        Some(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics sink keeps no local metrics").into_response(),
    }
}

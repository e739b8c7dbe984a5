//! HTTP surface for on-demand snapshots.
//!
//! `POST /api/scrape` runs the scrape → append pipeline for the credentials
//! in the request body; `GET /` serves a small form that calls it.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mf_snapshot::models::{Credentials, SecurityAnswers, SheetTarget};
use mf_snapshot::pipeline::{run_once, PortfolioSource, SnapshotSink};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const FORM_HTML: &str = include_str!("form.html");

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn PortfolioSource>,
    pub sink: Arc<dyn SnapshotSink>,
}

impl AppState {
    pub fn new(source: Arc<dyn PortfolioSource>, sink: Arc<dyn SnapshotSink>) -> Self {
        Self { source, sink }
    }
}

/// Body of `POST /api/scrape`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    #[serde(default)]
    pub pan: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub security_questions: Option<SecurityAnswers>,
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    /// Absent or blank means "pick the tab automatically".
    #[serde(default)]
    pub sheet_name: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(form))
        .route("/api/scrape", post(scrape))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn form() -> Html<&'static str> {
    Html(FORM_HTML)
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({ "error": message.into(), "success": false });
    (status, Json(body)).into_response()
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

async fn scrape(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected scrape request body");
            return failure(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let (Some(pan), Some(password)) = (present(request.pan), present(request.password)) else {
        return failure(StatusCode::BAD_REQUEST, "Missing credentials");
    };

    let credentials = Credentials::new(
        pan,
        password,
        request.security_questions.unwrap_or_default(),
    );
    let target = present(request.spreadsheet_id)
        .map(|id| SheetTarget::new(id).with_tab(request.sheet_name));

    info!(
        spreadsheet = target.is_some(),
        tab = target.as_ref().and_then(|t| t.tab()).unwrap_or("(auto)"),
        "Handling scrape request"
    );

    match run_once(
        state.source.as_ref(),
        state.sink.as_ref(),
        &credentials,
        target.as_ref(),
    )
    .await
    {
        Ok(outcome) => {
            let body = json!({
                "success": true,
                "data": outcome.snapshot,
                "sheetResult": outcome.sheet,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            error!(error = %err, "Scrape request failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

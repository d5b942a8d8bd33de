use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};

use super::extract::Actor;
use super::AppState;
use crate::error::Result;
use crate::import::ImportReport;

/// Optional header naming where an uploaded document came from.
const SOURCE_HEADER: &str = "x-import-source";

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/import", post(import))
}

async fn import(
    State(state): State<AppState>,
    Actor(actor): Actor,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ImportReport>)> {
    let source = headers
        .get(SOURCE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let report = state
        .run(move |s| s.import_master_data(&body, source.as_deref(), &actor))
        .await?;
    let status = if report.already_imported {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(report)))
}

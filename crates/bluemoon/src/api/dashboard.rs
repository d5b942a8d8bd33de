//! Dashboard and audit log routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::extract::Params;
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{AuditEntry, AuditFilter, DashboardSummary, Period};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(summary))
        .route("/audit", get(audit))
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    period: Option<Period>,
    months: Option<u32>,
}

async fn summary(
    State(state): State<AppState>,
    Params(query): Params<DashboardQuery>,
) -> Result<Json<DashboardSummary>> {
    let period = query.period.unwrap_or_else(Period::current);
    let months = query
        .months
        .unwrap_or(state.config().dashboard.revenue_months);
    Ok(Json(
        state
            .run(move |s| s.dashboard_summary(period, months))
            .await?,
    ))
}

async fn audit(
    State(state): State<AppState>,
    Params(filter): Params<AuditFilter>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<AuditEntry>>> {
    let page = state.page(&page);
    Ok(Json(state.run(move |s| s.list_audit(&filter, page)).await?))
}

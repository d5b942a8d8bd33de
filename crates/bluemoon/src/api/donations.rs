use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::extract::{Actor, Body, Id, Params};
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{Campaign, CampaignSummary, Contribution, NewCampaign, NewContribution};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/campaigns", get(list).post(create))
        .route("/campaigns/{id}", get(summary))
        .route("/campaigns/{id}/close", post(close))
        .route(
            "/campaigns/{id}/contributions",
            get(contributions).post(contribute),
        )
}

async fn list(
    State(state): State<AppState>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Campaign>>> {
    let page = state.page(&page);
    Ok(Json(state.run(move |s| s.list_campaigns(page)).await?))
}

async fn create(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewCampaign>,
) -> Result<(StatusCode, Json<Campaign>)> {
    let campaign = state
        .run(move |s| s.create_campaign(input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn summary(State(state): State<AppState>, Id(id): Id) -> Result<Json<CampaignSummary>> {
    Ok(Json(state.run(move |s| s.campaign_summary(id)).await?))
}

async fn close(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
) -> Result<Json<Campaign>> {
    Ok(Json(
        state.run(move |s| s.close_campaign(id, &actor)).await?,
    ))
}

async fn contributions(
    State(state): State<AppState>,
    Id(id): Id,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Contribution>>> {
    let page = state.page(&page);
    Ok(Json(
        state
            .run(move |s| s.list_contributions(id, page))
            .await?,
    ))
}

async fn contribute(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
    Body(input): Body<NewContribution>,
) -> Result<(StatusCode, Json<Contribution>)> {
    let contribution = state
        .run(move |s| s.contribute(id, input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(contribution)))
}

//! Fee catalogue and invoice ledger routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::extract::{Actor, Body, Id, Params};
use super::{AppState, PageParams};
use crate::error::Result;
use crate::model::{
    Fee, GenerationReport, Invoice, InvoiceDetail, InvoiceFilter, NewFee, NewInvoice,
    NewPayment, Period,
};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/fees", get(list_fees).post(create_fee))
        .route(
            "/fees/{id}",
            get(show_fee).put(update_fee).delete(deactivate_fee),
        )
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/generate", post(generate))
        .route("/invoices/{id}", get(show_invoice).delete(delete_invoice))
        .route("/invoices/{id}/payments", post(record_payment))
}

#[derive(Debug, Default, Deserialize)]
struct FeeQuery {
    #[serde(default)]
    active_only: bool,
}

async fn list_fees(
    State(state): State<AppState>,
    Params(query): Params<FeeQuery>,
) -> Result<Json<Vec<Fee>>> {
    Ok(Json(
        state.run(move |s| s.list_fees(query.active_only)).await?,
    ))
}

async fn create_fee(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewFee>,
) -> Result<(StatusCode, Json<Fee>)> {
    let fee = state.run(move |s| s.create_fee(input, &actor)).await?;
    Ok((StatusCode::CREATED, Json(fee)))
}

async fn show_fee(State(state): State<AppState>, Id(id): Id) -> Result<Json<Fee>> {
    Ok(Json(state.run(move |s| s.get_fee(id)).await?))
}

async fn update_fee(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
    Body(input): Body<NewFee>,
) -> Result<Json<Fee>> {
    Ok(Json(
        state.run(move |s| s.update_fee(id, input, &actor)).await?,
    ))
}

async fn deactivate_fee(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
) -> Result<Json<Fee>> {
    Ok(Json(
        state.run(move |s| s.deactivate_fee(id, &actor)).await?,
    ))
}

async fn list_invoices(
    State(state): State<AppState>,
    Params(filter): Params<InvoiceFilter>,
    Params(page): Params<PageParams>,
) -> Result<Json<Vec<Invoice>>> {
    let page = state.page(&page);
    Ok(Json(
        state.run(move |s| s.list_invoices(&filter, page)).await?,
    ))
}

async fn create_invoice(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(input): Body<NewInvoice>,
) -> Result<(StatusCode, Json<Invoice>)> {
    let invoice = state
        .run(move |s| s.create_invoice(input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    fee_id: i64,
    period: Period,
}

async fn generate(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Body(request): Body<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerationReport>)> {
    let report = state
        .run(move |s| s.generate_invoices(request.fee_id, request.period, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn show_invoice(State(state): State<AppState>, Id(id): Id) -> Result<Json<InvoiceDetail>> {
    Ok(Json(state.run(move |s| s.get_invoice(id)).await?))
}

async fn delete_invoice(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
) -> Result<StatusCode> {
    state.run(move |s| s.delete_invoice(id, &actor)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn record_payment(
    State(state): State<AppState>,
    Id(id): Id,
    Actor(actor): Actor,
    Body(input): Body<NewPayment>,
) -> Result<(StatusCode, Json<InvoiceDetail>)> {
    let detail = state
        .run(move |s| s.record_payment(id, input, &actor))
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

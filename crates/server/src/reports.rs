use api_types::{MonthRef, envelope::Envelope};
use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use engine::{Dashboard, MonthKey, MonthReport, ReconciliationSummary, ReserveMonth};

use crate::{ServerError, server::ServerState, user};

pub async fn dashboard(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<MonthRef>, ServerError>,
) -> Result<Json<Envelope<Dashboard>>, ServerError> {
    let month = MonthKey::new(payload.year, payload.month)?;
    let dashboard = state.engine.dashboard(&user.username, month).await?;
    Ok(Json(Envelope::ok(dashboard)))
}

pub async fn twelve_months(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<MonthReport>>>, ServerError> {
    let report = state.engine.report_12_months(&user.username).await?;
    Ok(Json(Envelope::ok(report)))
}

pub async fn reconciliation(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<MonthRef>, ServerError>,
) -> Result<Json<Envelope<ReconciliationSummary>>, ServerError> {
    let month = MonthKey::new(payload.year, payload.month)?;
    let summary = state
        .engine
        .reconciliation_summary(&user.username, month)
        .await?;
    Ok(Json(Envelope::ok(summary)))
}

pub async fn reserve_timeline(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<ReserveMonth>>>, ServerError> {
    let timeline = state.engine.reserve_timeline(&user.username).await?;
    Ok(Json(Envelope::ok(timeline)))
}

pub async fn reserve_month(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<MonthRef>, ServerError>,
) -> Result<Json<Envelope<ReserveMonth>>, ServerError> {
    let month = MonthKey::new(payload.year, payload.month)?;
    let reserve = state
        .engine
        .reserve_for_month(&user.username, month)
        .await?;
    Ok(Json(Envelope::ok(reserve)))
}

pub async fn recalculate_reserves(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<ReserveMonth>>>, ServerError> {
    let timeline = state.engine.recalculate_reserves(&user.username).await?;
    Ok(Json(Envelope::ok(timeline)))
}

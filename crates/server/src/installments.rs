use api_types::{
    envelope::Envelope,
    installment::{
        CancelScope as ApiCancelScope, InstallmentCancel, InstallmentGroupGet, InstallmentPay,
        InstallmentsPay,
    },
};
use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use engine::{
    BulkPaid, CancelScope, InstallmentDetails, InstallmentsCanceled, MoneyCents, Transaction,
};

use crate::{ServerError, server::ServerState, user};

fn map_cancel_scope(scope: ApiCancelScope) -> CancelScope {
    match scope {
        ApiCancelScope::Single => CancelScope::Single,
        ApiCancelScope::Future => CancelScope::Future,
        ApiCancelScope::All => CancelScope::All,
    }
}

pub async fn pay(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<InstallmentPay>, ServerError>,
) -> Result<Json<Envelope<Transaction>>, ServerError> {
    let tx = state
        .engine
        .mark_installment_paid(
            &user.username,
            payload.id,
            payload.payment_date,
            payload.paid_amount_cents.map(MoneyCents::new),
        )
        .await?;
    Ok(Json(Envelope::ok(tx)))
}

pub async fn pay_many(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<InstallmentsPay>, ServerError>,
) -> Result<Json<Envelope<BulkPaid>>, ServerError> {
    let outcome = state
        .engine
        .mark_multiple_paid(&user.username, &payload.ids, payload.payment_date)
        .await?;
    Ok(Json(Envelope::ok(outcome)))
}

pub async fn cancel(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<InstallmentCancel>, ServerError>,
) -> Result<Json<Envelope<InstallmentsCanceled>>, ServerError> {
    let outcome = state
        .engine
        .cancel_installment(&user.username, payload.id, map_cancel_scope(payload.scope))
        .await?;
    Ok(Json(Envelope::ok(outcome)))
}

pub async fn group(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<InstallmentGroupGet>, ServerError>,
) -> Result<Json<Envelope<InstallmentDetails>>, ServerError> {
    let details = state
        .engine
        .installment_details(&user.username, payload.group_id)
        .await?;
    Ok(Json(Envelope::ok(details)))
}

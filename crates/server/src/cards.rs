//! Card and bill endpoints. Their answers carry a `meta` block, see
//! [`CardReply`].

use std::time::Instant;

use api_types::card::{
    BillGenerate, BillGet, BillPay, CardArchive, CardGet, CardList as CardListRequest, CardSave,
    CurrentBillPay, Deleted,
};
use api_types::MonthRef;
use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use engine::{
    Bill, BillPayment, BillSummary, Card, CardBillsForMonth, CardCmd, CardDetail, CardList,
    CardRemoval, CurrentBillPayment, MoneyCents, MonthKey,
};

use crate::{CardReply, ServerError, server::ServerState, user};

fn month(year: i32, month: u32) -> Result<MonthKey, ServerError> {
    Ok(MonthKey::new(year, month)?)
}

pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CardListRequest>, ServerError>,
) -> CardReply<CardList> {
    let started = Instant::now();
    let result = state
        .engine
        .list_cards(&user.username, payload.etag.as_deref())
        .await
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

pub async fn get(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CardGet>, ServerError>,
) -> CardReply<CardDetail> {
    let started = Instant::now();
    let result = state
        .engine
        .card_detail(&user.username, payload.card_id)
        .await
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

pub async fn save(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CardSave>, ServerError>,
) -> CardReply<Card> {
    let started = Instant::now();
    let mut cmd = CardCmd::new(payload.name, MoneyCents::new(payload.total_limit_cents));
    cmd.id = payload.id;
    cmd.version = payload.version;
    cmd.issuer = payload.issuer;
    cmd.network = payload.network;
    cmd.last4 = payload.last4;
    cmd.color = payload.color;
    cmd.closing_day = payload.closing_day;
    cmd.due_day = payload.due_day;

    let result = state
        .engine
        .save_card(&user.username, cmd)
        .await
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

pub async fn archive(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CardArchive>, ServerError>,
) -> CardReply<Card> {
    let started = Instant::now();
    let result = state
        .engine
        .archive_card(&user.username, payload.card_id, payload.active)
        .await
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

pub async fn delete(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CardGet>, ServerError>,
) -> CardReply<CardRemoval> {
    let started = Instant::now();
    let result = state
        .engine
        .delete_card_cascade(&user.username, payload.card_id)
        .await
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

pub async fn generate_bill(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<BillGenerate>, ServerError>,
) -> CardReply<Bill> {
    let started = Instant::now();
    let result = match month(payload.year, payload.month) {
        Ok(reference) => state
            .engine
            .generate_bill(&user.username, payload.card_id, reference)
            .await
            .map_err(ServerError::from),
        Err(err) => Err(err),
    };
    CardReply::new(started, result)
}

pub async fn bill(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<BillGet>, ServerError>,
) -> CardReply<BillSummary> {
    let started = Instant::now();
    let result = state
        .engine
        .bill(&user.username, payload.bill_id)
        .await
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

pub async fn pay_bill(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<BillPay>, ServerError>,
) -> CardReply<BillPayment> {
    let started = Instant::now();
    let result = state
        .engine
        .pay_bill(
            &user.username,
            payload.bill_id,
            payload.payment_date,
            payload.account_id,
        )
        .await
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

pub async fn pay_current(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CurrentBillPay>, ServerError>,
) -> CardReply<CurrentBillPayment> {
    let started = Instant::now();
    let result = match month(payload.year, payload.month) {
        Ok(reference) => state
            .engine
            .pay_current_bill_balance(
                &user.username,
                payload.card_id,
                payload.payment_date,
                payload.account_id,
                reference,
                payload.amount_cents.map(MoneyCents::new),
            )
            .await
            .map_err(ServerError::from),
        Err(err) => Err(err),
    };
    CardReply::new(started, result)
}

pub async fn delete_bill(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<BillGet>, ServerError>,
) -> CardReply<Deleted> {
    let started = Instant::now();
    let result = state
        .engine
        .delete_bill(&user.username, payload.bill_id)
        .await
        .map(|()| Deleted { deleted: 1 })
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

/// Drops the paid bill rows of a card. The settlement expenses stay.
pub async fn delete_paid_bills(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<CardGet>, ServerError>,
) -> CardReply<Deleted> {
    let started = Instant::now();
    let result = state
        .engine
        .delete_paid_bills_history(&user.username, payload.card_id)
        .await
        .map(|deleted| Deleted { deleted })
        .map_err(ServerError::from);
    CardReply::new(started, result)
}

pub async fn bills_for_month(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<MonthRef>, ServerError>,
) -> CardReply<Vec<CardBillsForMonth>> {
    let started = Instant::now();
    let result = match month(payload.year, payload.month) {
        Ok(reference) => state
            .engine
            .bills_for_month(&user.username, reference)
            .await
            .map_err(ServerError::from),
        Err(err) => Err(err),
    };
    CardReply::new(started, result)
}

//! Transactions API endpoints

use api_types::{
    envelope::Envelope,
    reconcile::{BulkReconcile, Reconcile},
    transaction::{
        BatchScope as ApiScope, TransactionDelete, TransactionDeleted, TransactionGet,
        TransactionKind as ApiKind, TransactionList, TransactionNew, TransactionUpdate,
    },
};
use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use engine::{
    BatchScope, BulkReconciled, CreatedInstallments, CreatedTransaction, MoneyCents, MonthKey,
    NewTransaction, Transaction, TransactionKind, TransactionListFilter, TransactionPage,
    TransactionPatch, Updated,
};
use serde::Serialize;

use crate::{ServerError, server::ServerState, user};

pub(crate) fn map_kind(kind: ApiKind) -> TransactionKind {
    match kind {
        ApiKind::Income => TransactionKind::Income,
        ApiKind::Expense => TransactionKind::Expense,
        ApiKind::Transfer => TransactionKind::Transfer,
    }
}

fn map_scope(scope: ApiScope) -> BatchScope {
    match scope {
        ApiScope::This => BatchScope::This,
        ApiScope::Following => BatchScope::Following,
        ApiScope::All => BatchScope::All,
    }
}

/// A single row or a whole installment plan, depending on the request.
#[derive(Serialize)]
#[serde(untagged)]
pub enum Created {
    Single(CreatedTransaction),
    Installments(CreatedInstallments),
}

fn new_transaction(payload: TransactionNew) -> NewTransaction {
    let mut new = NewTransaction::new(
        payload.date,
        map_kind(payload.kind),
        MoneyCents::new(payload.amount_cents),
        payload.description,
    );
    new.category_id = payload.category_id;
    new.payment_method = payload.payment_method;
    new.km = payload.km;
    new.notes = payload.notes;
    new.from_account_id = payload.from_account_id;
    new.to_account_id = payload.to_account_id;
    new.auto_debit = payload.auto_debit.unwrap_or(false);
    new.paid = payload.paid;
    new.card_id = payload.card_id;
    new.interest_rate = payload.interest_rate;
    new
}

pub async fn create(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<TransactionNew>, ServerError>,
) -> Result<Json<Envelope<Created>>, ServerError> {
    let installments = payload.installments;
    let new = new_transaction(payload);
    let created = match installments {
        Some(count) if count > 1 || count == engine::OPEN_ENDED_COUNT => Created::Installments(
            state
                .engine
                .create_installments(&user.username, new, count)
                .await?,
        ),
        _ => Created::Single(state.engine.create_transaction(&user.username, new).await?),
    };
    Ok(Json(Envelope::ok(created)))
}

pub async fn get(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<TransactionGet>, ServerError>,
) -> Result<Json<Envelope<Transaction>>, ServerError> {
    let tx = state.engine.transaction(&user.username, payload.id).await?;
    Ok(Json(Envelope::ok(tx)))
}

pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<TransactionList>, ServerError>,
) -> Result<Json<Envelope<TransactionPage>>, ServerError> {
    let mut filter = TransactionListFilter::new(MonthKey::new(payload.year, payload.month)?);
    filter.kind = payload.kind.map(map_kind);
    filter.category_id = payload.category_id;
    filter.search = payload.search;
    if let Some(page) = payload.page {
        filter.page = page;
    }
    if let Some(page_size) = payload.page_size {
        filter.page_size = page_size;
    }

    let page = state
        .engine
        .list_transactions(&user.username, &filter)
        .await?;
    Ok(Json(Envelope::ok(page)))
}

pub async fn update(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<TransactionUpdate>, ServerError>,
) -> Result<Json<Envelope<Updated>>, ServerError> {
    let card_id = if payload.unlink_card {
        if payload.card_id.is_some() {
            return Err(ServerError::Generic(
                "card_id and unlink_card are mutually exclusive".to_string(),
            ));
        }
        Some(None)
    } else {
        payload.card_id.map(Some)
    };
    let patch = TransactionPatch {
        date: payload.date,
        kind: payload.kind.map(map_kind),
        amount: payload.amount_cents.map(MoneyCents::new),
        category_id: payload.category_id,
        description: payload.description,
        payment_method: payload.payment_method,
        km: payload.km,
        notes: payload.notes,
        from_account_id: payload.from_account_id,
        to_account_id: payload.to_account_id,
        auto_debit: payload.auto_debit,
        paid: payload.paid,
        card_id,
    };

    let updated = state
        .engine
        .update_transaction(&user.username, payload.id, patch, map_scope(payload.scope))
        .await?;
    Ok(Json(Envelope::ok(updated)))
}

pub async fn delete(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<TransactionDelete>, ServerError>,
) -> Result<Json<Envelope<TransactionDeleted>>, ServerError> {
    let count = state
        .engine
        .delete_transaction(&user.username, payload.id, map_scope(payload.scope))
        .await?;
    let deleted = match payload.scope {
        ApiScope::This => TransactionDeleted::Deleted {
            deleted: count > 0,
        },
        ApiScope::Following | ApiScope::All => TransactionDeleted::Many { count },
    };
    Ok(Json(Envelope::ok(deleted)))
}

pub async fn reconcile(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<Reconcile>, ServerError>,
) -> Result<Json<Envelope<Transaction>>, ServerError> {
    let tx = state
        .engine
        .reconcile_transaction(&user.username, payload.id, payload.reconciliation_date)
        .await?;
    Ok(Json(Envelope::ok(tx)))
}

pub async fn bulk_reconcile(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<BulkReconcile>, ServerError>,
) -> Result<Json<Envelope<BulkReconciled>>, ServerError> {
    let outcome = state
        .engine
        .bulk_reconcile(&user.username, &payload.ids, payload.reconciliation_date)
        .await?;
    Ok(Json(Envelope::ok(outcome)))
}

#[derive(Serialize)]
pub struct AutoDebited {
    pub settled: usize,
}

pub async fn auto_debit(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<AutoDebited>>, ServerError> {
    let settled = state.engine.run_auto_debit(&user.username).await?;
    Ok(Json(Envelope::ok(AutoDebited { settled })))
}

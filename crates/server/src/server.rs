use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use std::{net::SocketAddr, sync::Arc};

use crate::{
    accounts, cards, categories, config, installments, reports, transactions, user,
};
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub db: DatabaseConnection,
}

async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(TypedHeader(auth_header)) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user: Option<user::Model> = user::Entity::find()
        .filter(user::Column::Username.eq(auth_header.username()))
        .filter(user::Column::Password.eq(auth_header.password()))
        .one(&state.db)
        .await
        .map_err(|err| {
            tracing::error!("user lookup failed: {err}");
            StatusCode::UNAUTHORIZED
        })?;

    let Some(user) = user else {
        tracing::debug!(username = auth_header.username(), "rejected credentials");
        return Err(StatusCode::UNAUTHORIZED);
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Every endpoint is a `POST` with a JSON body, behind Basic auth.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/transactions/new", post(transactions::create))
        .route("/transactions/get", post(transactions::get))
        .route("/transactions/list", post(transactions::list))
        .route("/transactions/update", post(transactions::update))
        .route("/transactions/delete", post(transactions::delete))
        .route("/transactions/reconcile", post(transactions::reconcile))
        .route(
            "/transactions/reconcileMany",
            post(transactions::bulk_reconcile),
        )
        .route("/transactions/autoDebit", post(transactions::auto_debit))
        .route("/installments/pay", post(installments::pay))
        .route("/installments/payMany", post(installments::pay_many))
        .route("/installments/cancel", post(installments::cancel))
        .route("/installments/group", post(installments::group))
        .route("/categories/list", post(categories::list))
        .route("/categories/new", post(categories::create))
        .route("/categories/update", post(categories::update))
        .route("/categories/delete", post(categories::delete))
        .route("/categories/reorder", post(categories::reorder))
        .route("/accounts/list", post(accounts::list))
        .route("/accounts/new", post(accounts::create))
        .route("/accounts/update", post(accounts::update))
        .route("/accounts/delete", post(accounts::delete))
        .route("/accounts/balance", post(accounts::balance))
        .route("/cards/list", post(cards::list))
        .route("/cards/get", post(cards::get))
        .route("/cards/save", post(cards::save))
        .route("/cards/archive", post(cards::archive))
        .route("/cards/delete", post(cards::delete))
        .route("/bills/generate", post(cards::generate_bill))
        .route("/bills/get", post(cards::bill))
        .route("/bills/pay", post(cards::pay_bill))
        .route("/bills/payCurrent", post(cards::pay_current))
        .route("/bills/delete", post(cards::delete_bill))
        .route("/bills/deletePaid", post(cards::delete_paid_bills))
        .route("/bills/month", post(cards::bills_for_month))
        .route("/reports/dashboard", post(reports::dashboard))
        .route("/reports/months", post(reports::twelve_months))
        .route("/reports/reconciliation", post(reports::reconciliation))
        .route("/reserves/timeline", post(reports::reserve_timeline))
        .route("/reserves/month", post(reports::reserve_month))
        .route("/reserves/recalculate", post(reports::recalculate_reserves))
        .route("/config/get", post(config::get))
        .route("/config/save", post(config::save))
        .route("/config/bootstrap", post(config::bootstrap))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .with_state(state)
}

pub async fn run(engine: impl Into<Arc<Engine>>, db: DatabaseConnection, addr: SocketAddr) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {addr}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(engine, db, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    engine: impl Into<Arc<Engine>>,
    db: DatabaseConnection,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let state = ServerState {
        engine: engine.into(),
        db,
    };

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    engine: impl Into<Arc<Engine>>,
    db: DatabaseConnection,
    listener: tokio::net::TcpListener,
) -> Result<SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;
    let engine: Arc<Engine> = engine.into();

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(engine, db, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}

use api_types::{
    account::{AccountBalance as ApiBalance, AccountGet, AccountList, AccountNew, AccountUpdate},
    envelope::Envelope,
};
use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use engine::{Account, AccountBalance, AccountCmd, AccountRemoval, MoneyCents};

use crate::{ServerError, server::ServerState, user};

fn command(
    name: String,
    account_type: String,
    institution: Option<String>,
    initial_balance_cents: i64,
    active: Option<bool>,
) -> AccountCmd {
    let mut cmd = AccountCmd::new(name, account_type)
        .initial_balance(MoneyCents::new(initial_balance_cents));
    cmd.institution = institution;
    cmd.active = active;
    cmd
}

pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<AccountList>, ServerError>,
) -> Result<Json<Envelope<Vec<AccountBalance>>>, ServerError> {
    let accounts = state
        .engine
        .list_accounts(&user.username, payload.include_inactive)
        .await?;
    Ok(Json(Envelope::ok(accounts)))
}

pub async fn create(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<AccountNew>, ServerError>,
) -> Result<Json<Envelope<Account>>, ServerError> {
    let cmd = command(
        payload.name,
        payload.account_type,
        payload.institution,
        payload.initial_balance_cents,
        payload.active,
    );
    let account = state.engine.create_account(&user.username, cmd).await?;
    Ok(Json(Envelope::ok(account)))
}

pub async fn update(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<AccountUpdate>, ServerError>,
) -> Result<Json<Envelope<Account>>, ServerError> {
    let cmd = command(
        payload.name,
        payload.account_type,
        payload.institution,
        payload.initial_balance_cents,
        payload.active,
    );
    let account = state
        .engine
        .update_account(&user.username, payload.id, cmd)
        .await?;
    Ok(Json(Envelope::ok(account)))
}

/// Removes the account, or deactivates it when the ledger still uses it.
pub async fn delete(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<AccountGet>, ServerError>,
) -> Result<Json<Envelope<AccountRemoval>>, ServerError> {
    let removal = state
        .engine
        .deactivate_account(&user.username, payload.id)
        .await?;
    Ok(Json(Envelope::ok(removal)))
}

pub async fn balance(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    WithRejection(Json(payload), _): WithRejection<Json<AccountGet>, ServerError>,
) -> Result<Json<Envelope<ApiBalance>>, ServerError> {
    let balance = state
        .engine
        .account_balance(&user.username, payload.id)
        .await?;
    Ok(Json(Envelope::ok(ApiBalance {
        id: payload.id,
        balance_cents: balance.cents(),
    })))
}

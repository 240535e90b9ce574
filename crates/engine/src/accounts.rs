//! The module contains `Account` struct and its persistence model.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine};

/// Name of the default spending account.
pub const WALLET_ACCOUNT_NAME: &str = "Carteira";
/// Name of the account the maintenance reserve is accumulated in.
pub const INVESTMENTS_ACCOUNT_NAME: &str = "Investimentos";

/// An account.
///
/// A representation of a wallet, a bank account or anything else where money
/// is kept. It is not a representation of a credit card. The balance is never
/// stored: it is derived from `initial_balance` plus the settled ledger rows
/// referencing the account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub account_type: String,
    pub institution: Option<String>,
    pub initial_balance: MoneyCents,
    pub active: bool,
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub account_type: String,
    pub institution: Option<String>,
    pub initial_balance_cents: i64,
    pub active: bool,
    pub sort_order: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::Set(account.id),
            user_id: ActiveValue::Set(account.user_id.clone()),
            name: ActiveValue::Set(account.name.clone()),
            account_type: ActiveValue::Set(account.account_type.clone()),
            institution: ActiveValue::Set(account.institution.clone()),
            initial_balance_cents: ActiveValue::Set(account.initial_balance.cents()),
            active: ActiveValue::Set(account.active),
            sort_order: ActiveValue::Set(account.order),
            created_at: ActiveValue::Set(account.created_at),
            updated_at: ActiveValue::Set(account.updated_at),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            name: model.name,
            account_type: model.account_type,
            institution: model.institution,
            initial_balance: MoneyCents::new(model.initial_balance_cents),
            active: model.active,
            order: model.sort_order,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

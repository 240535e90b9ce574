//! Materialized maintenance-reserve timeline, one row per month.
//!
//! The table is rebuilt from scratch by every recalculation and is never
//! edited by hand.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents, MonthKey, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveMonth {
    pub month: MonthKey,
    /// Net transfers into the investments account during the month.
    pub deposits: MoneyCents,
    /// Previous balance plus this month's deposits.
    pub accumulated: MoneyCents,
    /// Maintenance spending during the month.
    pub usage: MoneyCents,
    pub balance: MoneyCents,
}

impl ReserveMonth {
    pub fn empty(month: MonthKey) -> Self {
        Self {
            month,
            deposits: MoneyCents::ZERO,
            accumulated: MoneyCents::ZERO,
            usage: MoneyCents::ZERO,
            balance: MoneyCents::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reserves")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub month: String,
    pub deposits_cents: i64,
    pub accumulated_cents: i64,
    pub usage_cents: i64,
    pub balance_cents: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn from_month(user_id: &str, row: &ReserveMonth) -> Self {
        Self {
            user_id: ActiveValue::Set(user_id.to_string()),
            month: ActiveValue::Set(row.month.to_string()),
            deposits_cents: ActiveValue::Set(row.deposits.cents()),
            accumulated_cents: ActiveValue::Set(row.accumulated.cents()),
            usage_cents: ActiveValue::Set(row.usage.cents()),
            balance_cents: ActiveValue::Set(row.balance.cents()),
        }
    }
}

impl TryFrom<Model> for ReserveMonth {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            month: model.month.parse()?,
            deposits: MoneyCents::new(model.deposits_cents),
            accumulated: MoneyCents::new(model.accumulated_cents),
            usage: MoneyCents::new(model.usage_cents),
            balance: MoneyCents::new(model.balance_cents),
        })
    }
}

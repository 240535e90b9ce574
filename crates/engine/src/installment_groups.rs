//! Group-level configuration of installment and fixed-recurrence plans.
//!
//! Paid/canceled counters are maintained incrementally by the lifecycle
//! operations; detail views recompute them from the member rows.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine, TransactionKind};

/// Sentinel installment count of open-ended (fixed) recurrences.
pub const OPEN_ENDED_COUNT: i32 = -1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstallmentGroup {
    pub id: Uuid,
    pub user_id: String,
    pub kind: TransactionKind,
    pub frequency: String,
    pub due_day: u32,
    pub total_amount: MoneyCents,
    /// [`OPEN_ENDED_COUNT`] for fixed recurrences.
    pub installment_count: i32,
    pub paid_count: i32,
    pub canceled_count: i32,
    pub allow_individual_edit: bool,
    pub interest_enabled: bool,
    pub interest_rate: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstallmentGroup {
    pub fn is_open_ended(&self) -> bool {
        self.installment_count == OPEN_ENDED_COUNT
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "installment_groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub kind: String,
    pub frequency: String,
    pub due_day: i32,
    pub total_amount_cents: i64,
    pub installment_count: i32,
    pub paid_count: i32,
    pub canceled_count: i32,
    pub allow_individual_edit: bool,
    pub interest_enabled: bool,
    pub interest_rate: f64,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&InstallmentGroup> for ActiveModel {
    fn from(group: &InstallmentGroup) -> Self {
        Self {
            id: ActiveValue::Set(group.id),
            user_id: ActiveValue::Set(group.user_id.clone()),
            kind: ActiveValue::Set(group.kind.as_str().to_string()),
            frequency: ActiveValue::Set(group.frequency.clone()),
            due_day: ActiveValue::Set(group.due_day as i32),
            total_amount_cents: ActiveValue::Set(group.total_amount.cents()),
            installment_count: ActiveValue::Set(group.installment_count),
            paid_count: ActiveValue::Set(group.paid_count),
            canceled_count: ActiveValue::Set(group.canceled_count),
            allow_individual_edit: ActiveValue::Set(group.allow_individual_edit),
            interest_enabled: ActiveValue::Set(group.interest_enabled),
            interest_rate: ActiveValue::Set(group.interest_rate),
            notes: ActiveValue::Set(group.notes.clone()),
            created_at: ActiveValue::Set(group.created_at),
            updated_at: ActiveValue::Set(group.updated_at),
        }
    }
}

impl TryFrom<Model> for InstallmentGroup {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            frequency: model.frequency,
            due_day: u32::try_from(model.due_day).unwrap_or(1),
            total_amount: MoneyCents::new(model.total_amount_cents),
            installment_count: model.installment_count,
            paid_count: model.paid_count,
            canceled_count: model.canceled_count,
            allow_individual_edit: model.allow_individual_edit,
            interest_enabled: model.interest_enabled,
            interest_rate: model.interest_rate,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

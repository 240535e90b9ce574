//! Category registry.
//!
//! Categories with no owner are shared by every user and are read-only
//! through the API; owned categories are private to their owner.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, TransactionKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryScope {
    Expense,
    Income,
    Both,
}

impl CategoryScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "EXPENSE",
            Self::Income => "INCOME",
            Self::Both => "BOTH",
        }
    }

    pub fn applies_to(self, kind: TransactionKind) -> bool {
        match self {
            Self::Both => kind != TransactionKind::Transfer,
            Self::Expense => kind == TransactionKind::Expense,
            Self::Income => kind == TransactionKind::Income,
        }
    }
}

impl TryFrom<&str> for CategoryScope {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "EXPENSE" => Ok(Self::Expense),
            "INCOME" => Ok(Self::Income),
            "BOTH" => Ok(Self::Both),
            other => Err(EngineError::InvalidInput(format!(
                "invalid category type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub scope: CategoryScope,
    pub emoji: Option<String>,
    pub color: Option<String>,
    pub order: i32,
    pub active: bool,
    pub owner_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn is_shared(&self) -> bool {
        self.owner_user_id.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub scope: String,
    pub emoji: Option<String>,
    pub color: Option<String>,
    pub sort_order: i32,
    pub active: bool,
    pub owner_user_id: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Category> for ActiveModel {
    fn from(category: &Category) -> Self {
        Self {
            id: ActiveValue::Set(category.id),
            name: ActiveValue::Set(category.name.clone()),
            scope: ActiveValue::Set(category.scope.as_str().to_string()),
            emoji: ActiveValue::Set(category.emoji.clone()),
            color: ActiveValue::Set(category.color.clone()),
            sort_order: ActiveValue::Set(category.order),
            active: ActiveValue::Set(category.active),
            owner_user_id: ActiveValue::Set(category.owner_user_id.clone()),
            created_at: ActiveValue::Set(category.created_at),
            updated_at: ActiveValue::Set(category.updated_at),
        }
    }
}

impl TryFrom<Model> for Category {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            name: model.name,
            scope: CategoryScope::try_from(model.scope.as_str())?,
            emoji: model.emoji,
            color: model.color,
            order: model.sort_order,
            active: model.active,
            owner_user_id: model.owner_user_id.filter(|owner| !owner.is_empty()),
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

use chrono::Utc;
use sea_orm::{
    ActiveValue, Condition, ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder,
    TransactionTrait, prelude::*, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Category, CategoryScope, EngineError, ResultEngine, TransactionKind,
    cache::scoped_key,
    categories, transactions,
    util::{fold_name, is_hex_color},
};

use super::{Engine, normalize_optional_text, normalize_required_name, with_tx};

const MAX_EMOJI_CHARS: usize = 4;

/// Create or update payload of a category.
#[derive(Clone, Debug)]
pub struct CategoryCmd {
    pub name: String,
    pub scope: CategoryScope,
    pub emoji: Option<String>,
    pub color: Option<String>,
    pub active: Option<bool>,
}

impl CategoryCmd {
    #[must_use]
    pub fn new(name: impl Into<String>, scope: CategoryScope) -> Self {
        Self {
            name: name.into(),
            scope,
            emoji: None,
            color: None,
            active: None,
        }
    }

    #[must_use]
    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    #[must_use]
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    fn validate(&self) -> ResultEngine<(String, Option<String>, Option<String>)> {
        let name = normalize_required_name(&self.name, "category")?;
        let emoji = normalize_optional_text(self.emoji.as_deref());
        if emoji
            .as_deref()
            .is_some_and(|e| e.chars().count() > MAX_EMOJI_CHARS)
        {
            return Err(EngineError::InvalidInput(format!(
                "emoji must have at most {MAX_EMOJI_CHARS} characters"
            )));
        }
        let color = normalize_optional_text(self.color.as_deref());
        if color.as_deref().is_some_and(|c| !is_hex_color(c)) {
            return Err(EngineError::InvalidInput(
                "color must be #RRGGBB".to_string(),
            ));
        }
        Ok((name, emoji, color.map(|c| c.to_uppercase())))
    }
}

/// Outcome of [`Engine::delete_category`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryRemoval {
    Removed,
    /// Referenced by the ledger, so only deactivated.
    Deactivated,
}

impl CategoryRemoval {
    pub fn code(self) -> Option<&'static str> {
        match self {
            Self::Removed => None,
            Self::Deactivated => Some("HAS_TRANSACTIONS"),
        }
    }
}

fn visible_to(user_id: &str) -> Condition {
    Condition::any()
        .add(categories::Column::OwnerUserId.is_null())
        .add(categories::Column::OwnerUserId.eq(user_id))
}

/// Category `id` if it is shared or owned by `user_id`.
pub(super) async fn find_visible_category<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    id: Uuid,
) -> ResultEngine<Category> {
    let model = categories::Entity::find_by_id(id)
        .filter(visible_to(user_id))
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("category {id}")))?;
    Category::try_from(model)
}

/// Category used for bill settlement expenses: the credit card category if
/// there is one, then anything card-like, then "Outros", then the first
/// active expense category.
pub(super) async fn settlement_category<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> ResultEngine<Option<Category>> {
    let candidates: Vec<Category> = categories::Entity::find()
        .filter(visible_to(user_id))
        .filter(categories::Column::Active.eq(true))
        .order_by_asc(categories::Column::SortOrder)
        .all(db)
        .await?
        .into_iter()
        .map(Category::try_from)
        .collect::<ResultEngine<Vec<_>>>()?
        .into_iter()
        .filter(|c| c.scope.applies_to(TransactionKind::Expense))
        .collect();

    let folded: Vec<String> = candidates.iter().map(|c| fold_name(&c.name)).collect();
    let pick = folded
        .iter()
        .position(|name| name == "cartao de credito")
        .or_else(|| folded.iter().position(|name| name.contains("cart")))
        .or_else(|| folded.iter().position(|name| name == "outros"))
        .or(if candidates.is_empty() { None } else { Some(0) });
    Ok(pick.and_then(|index| candidates.into_iter().nth(index)))
}

async fn owned_category<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    id: Uuid,
) -> ResultEngine<categories::Model> {
    let model = categories::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("category {id}")))?;
    match model.owner_user_id.as_deref() {
        Some(owner) if owner == user_id => Ok(model),
        Some(_) => Err(EngineError::Forbidden(
            "category belongs to another user".to_string(),
        )),
        None => Err(EngineError::Forbidden(
            "shared categories are read-only".to_string(),
        )),
    }
}

impl Engine {
    /// Shared plus owned categories, by display order.
    pub async fn list_categories(
        &self,
        user_id: &str,
        include_inactive: bool,
    ) -> ResultEngine<Vec<Category>> {
        let key = scoped_key(user_id, include_inactive);
        if let Some(list) = self.caches.categories.get(&key) {
            return Ok(list);
        }
        let mut query = categories::Entity::find().filter(visible_to(user_id));
        if !include_inactive {
            query = query.filter(categories::Column::Active.eq(true));
        }
        let list: Vec<Category> = query
            .order_by_asc(categories::Column::SortOrder)
            .order_by_asc(categories::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Category::try_from)
            .collect::<ResultEngine<_>>()?;
        self.caches.categories.set(key, list.clone());
        Ok(list)
    }

    /// Creates a private category at the end of the display order.
    pub async fn create_category(&self, user_id: &str, cmd: CategoryCmd) -> ResultEngine<Category> {
        let (name, emoji, color) = cmd.validate()?;
        let category = with_tx!(self, |db_tx| {
            let last = categories::Entity::find()
                .filter(visible_to(user_id))
                .order_by_desc(categories::Column::SortOrder)
                .one(&db_tx)
                .await?
                .map_or(0, |model| model.sort_order);
            let now = Utc::now();
            let category = Category {
                id: Uuid::new_v4(),
                name,
                scope: cmd.scope,
                emoji,
                color,
                order: last + 1,
                active: cmd.active.unwrap_or(true),
                owner_user_id: Some(user_id.to_string()),
                created_at: now,
                updated_at: now,
            };
            categories::ActiveModel::from(&category)
                .insert(&db_tx)
                .await?;
            Ok::<_, EngineError>(category)
        })?;
        self.caches.categories.invalidate_scope(user_id);
        tracing::debug!(user_id, id = %category.id, "category created");
        Ok(category)
    }

    pub async fn update_category(
        &self,
        user_id: &str,
        id: Uuid,
        cmd: CategoryCmd,
    ) -> ResultEngine<Category> {
        let (name, emoji, color) = cmd.validate()?;
        let model = owned_category(&self.database, user_id, id).await?;
        let mut category = Category::try_from(model)?;
        category.name = name;
        category.scope = cmd.scope;
        category.emoji = emoji;
        category.color = color;
        if let Some(active) = cmd.active {
            category.active = active;
        }
        category.updated_at = Utc::now();
        categories::ActiveModel::from(&category)
            .update(&self.database)
            .await?;
        self.caches.categories.invalidate_scope(user_id);
        Ok(category)
    }

    /// Removes an owned category, or deactivates it when ledger rows still
    /// reference it.
    pub async fn delete_category(&self, user_id: &str, id: Uuid) -> ResultEngine<CategoryRemoval> {
        let removal = with_tx!(self, |db_tx| {
            owned_category(&db_tx, user_id, id).await?;
            let references = transactions::Entity::find()
                .filter(transactions::Column::CategoryId.eq(id))
                .count(&db_tx)
                .await?;
            if references > 0 {
                categories::Entity::update_many()
                    .col_expr(categories::Column::Active, Expr::value(false))
                    .col_expr(categories::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(categories::Column::Id.eq(id))
                    .exec(&db_tx)
                    .await?;
                Ok::<_, EngineError>(CategoryRemoval::Deactivated)
            } else {
                categories::Entity::delete_by_id(id).exec(&db_tx).await?;
                Ok(CategoryRemoval::Removed)
            }
        })?;
        self.caches.categories.invalidate_scope(user_id);
        Ok(removal)
    }

    /// Applies `(id, order)` pairs to the caller's own categories; other ids
    /// are ignored. Returns how many were updated.
    pub async fn reorder_categories(
        &self,
        user_id: &str,
        orders: &[(Uuid, i32)],
    ) -> ResultEngine<usize> {
        let updated = with_tx!(self, |db_tx| {
            let mut updated = 0;
            for (id, order) in orders {
                let model = categories::Entity::find_by_id(*id)
                    .filter(categories::Column::OwnerUserId.eq(user_id))
                    .one(&db_tx)
                    .await?;
                if let Some(model) = model {
                    let mut active: categories::ActiveModel = model.into();
                    active.sort_order = ActiveValue::Set(*order);
                    active.updated_at = ActiveValue::Set(Utc::now());
                    active.update(&db_tx).await?;
                    updated += 1;
                }
            }
            Ok::<_, EngineError>(updated)
        })?;
        self.caches.categories.invalidate_scope(user_id);
        Ok(updated)
    }
}

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, TransactionTrait, prelude::*,
    sea_query::OnConflict,
};
use uuid::Uuid;

use crate::{
    Account, Category, CategoryScope, ConfigKey, INVESTMENTS_ACCOUNT_NAME, LedgerConfig,
    MoneyCents, ResultEngine, WALLET_ACCOUNT_NAME, accounts, categories, config_entries,
};

use super::{Engine, with_tx};

struct DefaultCategory {
    name: &'static str,
    scope: CategoryScope,
    emoji: &'static str,
    color: &'static str,
}

const DEFAULT_CATEGORIES: [DefaultCategory; 11] = [
    DefaultCategory { name: "Combustível", scope: CategoryScope::Expense, emoji: "⛽", color: "#FF6B6B" },
    DefaultCategory { name: "Alimentação", scope: CategoryScope::Expense, emoji: "🍽️", color: "#FFD93D" },
    DefaultCategory { name: "Manutenção", scope: CategoryScope::Expense, emoji: "🧰", color: "#6BCB77" },
    DefaultCategory { name: "Pedágio", scope: CategoryScope::Expense, emoji: "🛣️", color: "#4D96FF" },
    DefaultCategory { name: "Estacionamento", scope: CategoryScope::Expense, emoji: "🅿️", color: "#845EC2" },
    DefaultCategory { name: "Seguro", scope: CategoryScope::Expense, emoji: "🛡️", color: "#00C9A7" },
    DefaultCategory { name: "Parcela do carro", scope: CategoryScope::Expense, emoji: "🚗", color: "#C34A36" },
    DefaultCategory { name: "Outros", scope: CategoryScope::Expense, emoji: "📌", color: "#A0A0A0" },
    DefaultCategory { name: "Ganhos", scope: CategoryScope::Income, emoji: "💰", color: "#2ECC71" },
    DefaultCategory { name: "Extras", scope: CategoryScope::Income, emoji: "🎁", color: "#9B59B6" },
    DefaultCategory { name: "Despesa Fixa", scope: CategoryScope::Expense, emoji: "📅", color: "#FF9F43" },
];

const MAINTENANCE_CATEGORY_NAME: &str = "Manutenção";

impl Engine {
    /// Config of `user_id`, read through the cache.
    pub(super) async fn config_in<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
    ) -> ResultEngine<LedgerConfig> {
        if let Some(config) = self.caches.config.get(user_id) {
            return Ok(config);
        }
        let rows = config_entries::Entity::find()
            .filter(config_entries::Column::UserId.eq(user_id))
            .all(db)
            .await?;
        let entries: HashMap<ConfigKey, String> = rows
            .into_iter()
            .filter_map(|row| {
                ConfigKey::try_from(row.key.as_str())
                    .ok()
                    .map(|key| (key, row.value))
            })
            .collect();
        let config = LedgerConfig::from_entries(&entries);
        self.caches.config.set(user_id.to_string(), config.clone());
        Ok(config)
    }

    pub async fn config(&self, user_id: &str) -> ResultEngine<LedgerConfig> {
        self.config_in(&self.database, user_id).await
    }

    /// Raw stored values of every known key (defaults for missing ones).
    pub async fn config_entries(&self, user_id: &str) -> ResultEngine<Vec<(ConfigKey, String)>> {
        let rows = config_entries::Entity::find()
            .filter(config_entries::Column::UserId.eq(user_id))
            .all(&self.database)
            .await?;
        let stored: HashMap<String, String> =
            rows.into_iter().map(|row| (row.key, row.value)).collect();
        Ok(ConfigKey::ALL
            .into_iter()
            .map(|key| {
                let value = stored
                    .get(key.as_str())
                    .cloned()
                    .unwrap_or_else(|| key.default_value().to_string());
                (key, value)
            })
            .collect())
    }

    /// Upserts the given entries. Changing a category key rebuilds the reserves.
    pub async fn save_config(
        &self,
        user_id: &str,
        entries: Vec<(ConfigKey, String)>,
    ) -> ResultEngine<LedgerConfig> {
        if let Some((_, value)) = entries
            .iter()
            .find(|(key, value)| *key == ConfigKey::Timezone && !value.trim().is_empty())
        {
            value.trim().parse::<chrono_tz::Tz>().map_err(|_| {
                crate::EngineError::InvalidInput(format!("invalid timezone: {value}"))
            })?;
        }
        for (key, value) in &entries {
            if matches!(
                key,
                ConfigKey::MonthlyMaintenanceReserve | ConfigKey::MaintenanceReserveGoal
            ) && !value.trim().is_empty()
            {
                value.parse::<MoneyCents>()?;
            }
        }

        let recalc = entries.iter().any(|(key, _)| key.affects_reserves());
        let today = self.today(user_id).await?;

        with_tx!(self, |db_tx| {
            for (key, value) in &entries {
                upsert_entry(&db_tx, user_id, *key, value.trim()).await?;
            }
            self.caches.config.invalidate(user_id);
            if recalc {
                self.rebuild_reserves(&db_tx, user_id, today).await?;
            }
            Ok::<_, crate::EngineError>(())
        })?;

        self.caches.config.invalidate(user_id);
        tracing::debug!(user_id, keys = entries.len(), "config saved");
        self.config(user_id).await
    }

    /// Seeds shared categories (once), default accounts and config keys.
    ///
    /// Safe to call repeatedly: only missing pieces are created.
    pub async fn bootstrap_user(&self, user_id: &str) -> ResultEngine<()> {
        let user_id = super::normalize_required_name(user_id, "user")?;
        let now = Utc::now();

        with_tx!(self, |db_tx| {
            let shared = categories::Entity::find()
                .filter(categories::Column::OwnerUserId.is_null())
                .all(&db_tx)
                .await?;
            let mut maintenance_id = shared
                .iter()
                .find(|c| c.name == MAINTENANCE_CATEGORY_NAME)
                .map(|c| c.id);
            if shared.is_empty() {
                for (index, seed) in DEFAULT_CATEGORIES.iter().enumerate() {
                    let category = Category {
                        id: Uuid::new_v4(),
                        name: seed.name.to_string(),
                        scope: seed.scope,
                        emoji: Some(seed.emoji.to_string()),
                        color: Some(seed.color.to_string()),
                        order: index as i32 + 1,
                        active: true,
                        owner_user_id: None,
                        created_at: now,
                        updated_at: now,
                    };
                    if seed.name == MAINTENANCE_CATEGORY_NAME {
                        maintenance_id = Some(category.id);
                    }
                    categories::ActiveModel::from(&category)
                        .insert(&db_tx)
                        .await?;
                }
                tracing::info!("seeded {} shared categories", DEFAULT_CATEGORIES.len());
            }

            let has_accounts = accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id.as_str()))
                .one(&db_tx)
                .await?
                .is_some();
            if !has_accounts {
                for (order, (name, account_type)) in [
                    (WALLET_ACCOUNT_NAME, "Dinheiro"),
                    (INVESTMENTS_ACCOUNT_NAME, "Investimentos"),
                ]
                .into_iter()
                .enumerate()
                {
                    let account = Account {
                        id: Uuid::new_v4(),
                        user_id: user_id.clone(),
                        name: name.to_string(),
                        account_type: account_type.to_string(),
                        institution: None,
                        initial_balance: MoneyCents::ZERO,
                        active: true,
                        order: order as i32 + 1,
                        created_at: now,
                        updated_at: now,
                    };
                    accounts::ActiveModel::from(&account).insert(&db_tx).await?;
                }
            }

            let existing: Vec<String> = config_entries::Entity::find()
                .filter(config_entries::Column::UserId.eq(user_id.as_str()))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|row| row.key)
                .collect();
            for key in ConfigKey::ALL {
                if existing.iter().any(|k| k == key.as_str()) {
                    continue;
                }
                let value = match (key, maintenance_id) {
                    (ConfigKey::MaintenanceCategoryId, Some(id)) => id.to_string(),
                    _ => key.default_value().to_string(),
                };
                upsert_entry(&db_tx, &user_id, key, &value).await?;
            }
            Ok::<_, crate::EngineError>(())
        })?;

        self.caches.config.invalidate(&user_id);
        self.caches.categories.clear();
        self.invalidate_account_caches(&user_id);
        tracing::info!(user_id, "user bootstrapped");
        Ok(())
    }

    /// Every user that owns at least one ledger object.
    pub async fn known_users(&self) -> ResultEngine<Vec<String>> {
        let mut users: Vec<String> = accounts::Entity::find()
            .all(&self.database)
            .await?
            .into_iter()
            .map(|a| a.user_id)
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }
}

async fn upsert_entry<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    key: ConfigKey,
    value: &str,
) -> ResultEngine<()> {
    let model = config_entries::ActiveModel {
        user_id: ActiveValue::Set(user_id.to_string()),
        key: ActiveValue::Set(key.as_str().to_string()),
        value: ActiveValue::Set(value.to_string()),
    };
    config_entries::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([config_entries::Column::UserId, config_entries::Column::Key])
                .update_column(config_entries::Column::Value)
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}

//! Per-user key/value settings of the ledger.

use std::collections::HashMap;

use chrono_tz::Tz;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents};

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Known configuration keys. Their string form is the persisted key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigKey {
    #[serde(rename = "RESERVA_MANUTENCAO_MENSAL")]
    MonthlyMaintenanceReserve,
    #[serde(rename = "MANUTENCAO_CATEGORY_ID")]
    MaintenanceCategoryId,
    #[serde(rename = "RESERVA_CATEGORY_ID")]
    ReserveCategoryId,
    #[serde(rename = "META_RESERVA_MANUTENCAO")]
    MaintenanceReserveGoal,
    #[serde(rename = "TIMEZONE")]
    Timezone,
    #[serde(rename = "MOEDA")]
    Currency,
    #[serde(rename = "THEME_DEFAULT")]
    Theme,
    #[serde(rename = "ALLOWLIST_EMAILS")]
    AllowlistEmails,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 8] = [
        Self::MonthlyMaintenanceReserve,
        Self::MaintenanceCategoryId,
        Self::ReserveCategoryId,
        Self::MaintenanceReserveGoal,
        Self::Timezone,
        Self::Currency,
        Self::Theme,
        Self::AllowlistEmails,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MonthlyMaintenanceReserve => "RESERVA_MANUTENCAO_MENSAL",
            Self::MaintenanceCategoryId => "MANUTENCAO_CATEGORY_ID",
            Self::ReserveCategoryId => "RESERVA_CATEGORY_ID",
            Self::MaintenanceReserveGoal => "META_RESERVA_MANUTENCAO",
            Self::Timezone => "TIMEZONE",
            Self::Currency => "MOEDA",
            Self::Theme => "THEME_DEFAULT",
            Self::AllowlistEmails => "ALLOWLIST_EMAILS",
        }
    }

    /// Value written on bootstrap when the key is missing.
    pub fn default_value(self) -> &'static str {
        match self {
            Self::MonthlyMaintenanceReserve | Self::MaintenanceReserveGoal => "500",
            Self::Timezone => "America/Sao_Paulo",
            Self::Currency => "BRL",
            Self::Theme => "dark",
            Self::MaintenanceCategoryId | Self::ReserveCategoryId | Self::AllowlistEmails => "",
        }
    }

    /// Changing these keys changes how the reserve timeline is computed.
    pub fn affects_reserves(self) -> bool {
        matches!(self, Self::MaintenanceCategoryId | Self::ReserveCategoryId)
    }
}

impl TryFrom<&str> for ConfigKey {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == value)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown config key: {value}")))
    }
}

/// Typed view over the stored entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub monthly_maintenance_reserve: MoneyCents,
    pub maintenance_category_id: Option<Uuid>,
    pub reserve_category_id: Option<Uuid>,
    pub maintenance_reserve_goal: MoneyCents,
    pub timezone: Tz,
    pub currency: String,
    pub theme: String,
    pub allowlist_emails: Vec<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::from_entries(&HashMap::new())
    }
}

impl LedgerConfig {
    /// Builds the typed view, falling back to defaults for missing or
    /// malformed values.
    pub fn from_entries(entries: &HashMap<ConfigKey, String>) -> Self {
        let raw = |key: ConfigKey| {
            entries
                .get(&key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| key.default_value())
        };
        let money = |key: ConfigKey| {
            raw(key)
                .parse::<MoneyCents>()
                .or_else(|_| key.default_value().parse::<MoneyCents>())
                .unwrap_or(MoneyCents::ZERO)
        };
        let id = |key: ConfigKey| Uuid::parse_str(raw(key)).ok();

        Self {
            monthly_maintenance_reserve: money(ConfigKey::MonthlyMaintenanceReserve),
            maintenance_category_id: id(ConfigKey::MaintenanceCategoryId),
            reserve_category_id: id(ConfigKey::ReserveCategoryId),
            maintenance_reserve_goal: money(ConfigKey::MaintenanceReserveGoal),
            timezone: raw(ConfigKey::Timezone).parse().unwrap_or(DEFAULT_TIMEZONE),
            currency: raw(ConfigKey::Currency).to_string(),
            theme: raw(ConfigKey::Theme).to_string(),
            allowlist_emails: raw(ConfigKey::AllowlistEmails)
                .split([',', ';'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "config_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_and_malformed_values() {
        let mut entries = HashMap::new();
        entries.insert(ConfigKey::Timezone, "Mars/Olympus".to_string());
        entries.insert(ConfigKey::MonthlyMaintenanceReserve, "abc".to_string());
        entries.insert(
            ConfigKey::AllowlistEmails,
            "A@x.com; b@y.com,,".to_string(),
        );
        let config = LedgerConfig::from_entries(&entries);
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.monthly_maintenance_reserve, MoneyCents::new(500_00));
        assert_eq!(config.currency, "BRL");
        assert_eq!(config.maintenance_category_id, None);
        assert_eq!(config.allowlist_emails, vec!["a@x.com", "b@y.com"]);
    }

    #[test]
    fn keys_round_trip_through_their_names() {
        for key in ConfigKey::ALL {
            assert_eq!(ConfigKey::try_from(key.as_str()).unwrap(), key);
        }
        assert!(ConfigKey::try_from("NOPE").is_err());
    }
}

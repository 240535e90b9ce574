//! Credit cards.
//!
//! `used_limit` is a running counter adjusted by deltas whenever a
//! card-linked ledger row is created, edited, canceled or deleted. It is not
//! recomputed on read.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, ResultEngine,
    bills::best_purchase_day,
    calendar::safe_date,
};

pub const DEFAULT_CARD_COLOR: &str = "#5B5FEF";
pub const DEFAULT_CLOSING_DAY: u32 = 1;
pub const DEFAULT_DUE_DAY: u32 = 10;

const USAGE_ALERT_PCT: i64 = 80;
const DUE_ALERT_DAYS: i64 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub issuer: Option<String>,
    pub network: String,
    pub last4: Option<String>,
    pub color: String,
    pub total_limit: MoneyCents,
    pub used_limit: MoneyCents,
    pub closing_day: u32,
    pub due_day: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// A card with the figures the card screens show.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub card: Card,
    pub available: MoneyCents,
    pub usage_pct: i64,
    pub next_closing: NaiveDate,
    pub next_due: NaiveDate,
    pub days_to_due: i64,
    pub best_purchase_day: u32,
    pub alert_usage: bool,
    pub alert_due: bool,
}

impl Card {
    pub fn available(&self) -> MoneyCents {
        (self.total_limit - self.used_limit).non_negative()
    }

    pub fn summarize(&self, today: NaiveDate) -> CardSummary {
        let usage_pct = if self.total_limit.is_positive() {
            let pct = (self.used_limit.cents() as f64 / self.total_limit.cents() as f64 * 100.0)
                .round() as i64;
            pct.min(100)
        } else {
            0
        };
        let next_closing = next_occurrence(self.closing_day, today);
        let next_due = next_occurrence(self.due_day, today);
        let days_to_due = (next_due - today).num_days();
        CardSummary {
            card: self.clone(),
            available: self.available(),
            usage_pct,
            next_closing,
            next_due,
            days_to_due,
            best_purchase_day: best_purchase_day(self.closing_day),
            alert_usage: usage_pct > USAGE_ALERT_PCT,
            alert_due: days_to_due <= DUE_ALERT_DAYS,
        }
    }
}

/// Next date (today included) falling on `day`, clamped to month length.
fn next_occurrence(day: u32, today: NaiveDate) -> NaiveDate {
    let candidate = safe_date(today.year(), today.month(), day);
    if candidate >= today {
        return candidate;
    }
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    safe_date(year, month, day)
}

/// Keeps only the digits of `raw`, at most the last four.
pub fn normalize_last4(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let start = digits.len().saturating_sub(4);
    Some(digits[start..].iter().collect())
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cards")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub issuer: Option<String>,
    pub network: String,
    pub last4: Option<String>,
    pub color: String,
    pub total_limit_cents: i64,
    pub used_limit_cents: i64,
    pub closing_day: i32,
    pub due_day: i32,
    pub active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bills::Entity")]
    Bills,
}

impl Related<super::bills::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bills.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Card> for ActiveModel {
    fn from(card: &Card) -> Self {
        Self {
            id: ActiveValue::Set(card.id),
            user_id: ActiveValue::Set(card.user_id.clone()),
            name: ActiveValue::Set(card.name.clone()),
            issuer: ActiveValue::Set(card.issuer.clone()),
            network: ActiveValue::Set(card.network.clone()),
            last4: ActiveValue::Set(card.last4.clone()),
            color: ActiveValue::Set(card.color.clone()),
            total_limit_cents: ActiveValue::Set(card.total_limit.cents()),
            used_limit_cents: ActiveValue::Set(card.used_limit.cents()),
            closing_day: ActiveValue::Set(card.closing_day as i32),
            due_day: ActiveValue::Set(card.due_day as i32),
            active: ActiveValue::Set(card.active),
            created_at: ActiveValue::Set(card.created_at),
            updated_at: ActiveValue::Set(card.updated_at),
            version: ActiveValue::Set(card.version),
        }
    }
}

impl TryFrom<Model> for Card {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let day = |value: i32, fallback: u32| {
            u32::try_from(value)
                .ok()
                .filter(|d| (1..=31).contains(d))
                .unwrap_or(fallback)
        };
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            name: model.name,
            issuer: model.issuer,
            network: model.network,
            last4: model.last4,
            color: model.color,
            total_limit: MoneyCents::new(model.total_limit_cents),
            used_limit: MoneyCents::new(model.used_limit_cents),
            closing_day: day(model.closing_day, DEFAULT_CLOSING_DAY),
            due_day: day(model.due_day, DEFAULT_DUE_DAY),
            active: model.active,
            created_at: model.created_at,
            updated_at: model.updated_at,
            version: model.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(total: i64, used: i64, closing_day: u32, due_day: u32) -> Card {
        Card {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            name: "Visa".to_string(),
            issuer: None,
            network: "visa".to_string(),
            last4: None,
            color: DEFAULT_CARD_COLOR.to_string(),
            total_limit: MoneyCents::new(total),
            used_limit: MoneyCents::new(used),
            closing_day,
            due_day,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn summary_flags_high_usage_and_close_due_date() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();
        let summary = card(1000_00, 850_00, 1, 10).summarize(today);
        assert_eq!(summary.available, MoneyCents::new(150_00));
        assert_eq!(summary.usage_pct, 85);
        assert!(summary.alert_usage);
        assert_eq!(summary.next_due, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert_eq!(summary.days_to_due, 3);
        assert!(summary.alert_due);
        assert_eq!(summary.next_closing, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }

    #[test]
    fn usage_is_capped_and_available_never_negative() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();
        let summary = card(100_00, 150_00, 1, 10).summarize(today);
        assert_eq!(summary.usage_pct, 100);
        assert_eq!(summary.available, MoneyCents::ZERO);
    }

    #[test]
    fn last4_keeps_trailing_digits() {
        assert_eq!(normalize_last4("1234 5678 9012 3456"), Some("3456".to_string()));
        assert_eq!(normalize_last4("**12"), Some("12".to_string()));
        assert_eq!(normalize_last4("abcd"), None);
    }
}

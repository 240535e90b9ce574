//! Credit-card statements and their period math.
//!
//! The stored `amount` of a bill is only the snapshot taken when the bill was
//! generated. What is owed is always recomputed from the ledger, see
//! [`BillValue`].

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, MonthKey, ResultEngine, calendar::safe_date};

/// Remaining balances at or below this count as settled.
pub const SETTLED_EPSILON: MoneyCents = MoneyCents::new(0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    #[default]
    Open,
    Partial,
    Paid,
}

impl BillStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Partial => "PARTIAL",
            Self::Paid => "PAID",
        }
    }

    /// Status derived from what is owed and what was paid.
    pub fn derive(remaining: MoneyCents, paid: MoneyCents) -> Self {
        if remaining <= SETTLED_EPSILON {
            Self::Paid
        } else if paid.is_positive() {
            Self::Partial
        } else {
            Self::Open
        }
    }
}

impl TryFrom<&str> for BillStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "OPEN" => Ok(Self::Open),
            "PARTIAL" => Ok(Self::Partial),
            "PAID" => Ok(Self::Paid),
            other => Err(EngineError::InvalidInput(format!(
                "invalid bill status: {other}"
            ))),
        }
    }
}

/// Statement window of a card for one reference month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillPeriod {
    pub reference: MonthKey,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl BillPeriod {
    /// Period `[closing(M-1) + 1 day, closing(M)]`, due on `due_day` of the
    /// following month (or of `M` itself when `due_day <= closing_day`).
    pub fn for_month(closing_day: u32, due_day: u32, reference: MonthKey) -> Self {
        let end = safe_date(reference.year(), reference.month(), closing_day);
        let previous = reference.prev();
        let start = safe_date(previous.year(), previous.month(), closing_day)
            .checked_add_days(Days::new(1))
            .unwrap_or(end);
        let due_month = if due_day <= closing_day {
            reference
        } else {
            reference.next()
        };
        let due_date = safe_date(due_month.year(), due_month.month(), due_day);
        Self {
            reference,
            start,
            end,
            closing_date: end,
            due_date,
        }
    }

    /// Reference month of the statement that is open on `date`.
    pub fn current_reference(closing_day: u32, date: NaiveDate) -> MonthKey {
        let month = MonthKey::of(date);
        if date.day() > closing_day {
            month.next()
        } else {
            month
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Best day to buy on a card: the day after closing, or the 1st when closing
/// falls at the end of the month.
pub fn best_purchase_day(closing_day: u32) -> u32 {
    if closing_day >= 28 { 1 } else { closing_day + 1 }
}

/// Live value of a bill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillValue {
    /// What the statement adds up to.
    pub total: MoneyCents,
    /// Sum of settlement transactions referencing the bill.
    pub paid: MoneyCents,
    /// `max(0, total - paid)`.
    pub remaining: MoneyCents,
    pub status: BillStatus,
}

impl BillValue {
    /// Resolves the value from the live ledger sum, falling back to the larger
    /// of snapshot and paid when no ledger rows fall in the period.
    pub fn resolve(live: MoneyCents, snapshot: MoneyCents, paid: MoneyCents) -> Self {
        let total = if live.is_positive() {
            live
        } else {
            snapshot.max(paid)
        };
        let remaining = (total - paid).non_negative();
        Self {
            total,
            paid,
            remaining,
            status: BillStatus::derive(remaining, paid),
        }
    }

    /// Value of a statement whose remaining balance is known directly, such
    /// as a card's used limit: the total is what is left plus what was paid.
    pub fn outstanding(remaining: MoneyCents, paid: MoneyCents) -> Self {
        let remaining = remaining.non_negative();
        Self {
            total: remaining + paid,
            paid,
            remaining,
            status: BillStatus::derive(remaining, paid),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub user_id: String,
    pub card_id: Uuid,
    pub period: BillPeriod,
    /// Snapshot taken at generation time; informational only.
    pub amount: MoneyCents,
    pub status: BillStatus,
    pub payment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bills")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub card_id: Uuid,
    pub reference_month: i32,
    pub reference_year: i32,
    pub period_start: Date,
    pub period_end: Date,
    pub closing_date: Date,
    pub due_date: Date,
    pub amount_cents: i64,
    pub status: String,
    pub payment_date: Option<Date>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cards::Entity",
        from = "Column::CardId",
        to = "super::cards::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Card,
}

impl Related<super::cards::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Card.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Bill> for ActiveModel {
    fn from(bill: &Bill) -> Self {
        Self {
            id: ActiveValue::Set(bill.id),
            user_id: ActiveValue::Set(bill.user_id.clone()),
            card_id: ActiveValue::Set(bill.card_id),
            reference_month: ActiveValue::Set(bill.period.reference.month() as i32),
            reference_year: ActiveValue::Set(bill.period.reference.year()),
            period_start: ActiveValue::Set(bill.period.start),
            period_end: ActiveValue::Set(bill.period.end),
            closing_date: ActiveValue::Set(bill.period.closing_date),
            due_date: ActiveValue::Set(bill.period.due_date),
            amount_cents: ActiveValue::Set(bill.amount.cents()),
            status: ActiveValue::Set(bill.status.as_str().to_string()),
            payment_date: ActiveValue::Set(bill.payment_date),
            created_at: ActiveValue::Set(bill.created_at),
            updated_at: ActiveValue::Set(bill.updated_at),
            version: ActiveValue::Set(bill.version),
        }
    }
}

impl TryFrom<Model> for Bill {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let month = u32::try_from(model.reference_month)
            .map_err(|_| EngineError::InvalidInput("invalid bill month".to_string()))?;
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            card_id: model.card_id,
            period: BillPeriod {
                reference: MonthKey::new(model.reference_year, month)?,
                start: model.period_start,
                end: model.period_end,
                closing_date: model.closing_date,
                due_date: model.due_date,
            },
            amount: MoneyCents::new(model.amount_cents),
            status: BillStatus::try_from(model.status.as_str())?,
            payment_date: model.payment_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
            version: model.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_spans_previous_closing_to_current_closing() {
        let period = BillPeriod::for_month(10, 20, MonthKey::new(2024, 3).unwrap());
        assert_eq!(period.start, date(2024, 2, 11));
        assert_eq!(period.end, date(2024, 3, 10));
        assert_eq!(period.closing_date, date(2024, 3, 10));
        assert_eq!(period.due_date, date(2024, 4, 20));
    }

    #[test]
    fn due_day_before_closing_stays_in_reference_month() {
        let period = BillPeriod::for_month(25, 5, MonthKey::new(2024, 1).unwrap());
        assert_eq!(period.start, date(2023, 12, 26));
        assert_eq!(period.end, date(2024, 1, 25));
        assert_eq!(period.due_date, date(2024, 1, 5));
    }

    #[test]
    fn period_clamps_short_months() {
        let period = BillPeriod::for_month(31, 10, MonthKey::new(2024, 3).unwrap());
        assert_eq!(period.start, date(2024, 3, 1));
        assert_eq!(period.end, date(2024, 3, 31));
    }

    #[test]
    fn current_reference_rolls_after_closing() {
        assert_eq!(
            BillPeriod::current_reference(10, date(2024, 12, 11)),
            MonthKey::new(2025, 1).unwrap()
        );
        assert_eq!(
            BillPeriod::current_reference(10, date(2024, 12, 10)),
            MonthKey::new(2024, 12).unwrap()
        );
    }

    #[test]
    fn best_purchase_day_wraps_at_month_end() {
        assert_eq!(best_purchase_day(10), 11);
        assert_eq!(best_purchase_day(28), 1);
    }

    #[test]
    fn value_falls_back_to_snapshot_and_derives_status() {
        let open = BillValue::resolve(MoneyCents::new(100_00), MoneyCents::ZERO, MoneyCents::ZERO);
        assert_eq!(open.status, BillStatus::Open);
        assert_eq!(open.remaining, MoneyCents::new(100_00));

        let partial =
            BillValue::resolve(MoneyCents::new(100_00), MoneyCents::ZERO, MoneyCents::new(40_00));
        assert_eq!(partial.status, BillStatus::Partial);
        assert_eq!(partial.remaining, MoneyCents::new(60_00));

        let from_usage = BillValue::outstanding(MoneyCents::new(70_00), MoneyCents::new(30_00));
        assert_eq!(from_usage.total, MoneyCents::new(100_00));
        assert_eq!(from_usage.remaining, MoneyCents::new(70_00));
        assert_eq!(from_usage.status, BillStatus::Partial);

        let fallback =
            BillValue::resolve(MoneyCents::ZERO, MoneyCents::new(80_00), MoneyCents::new(80_00));
        assert_eq!(fallback.total, MoneyCents::new(80_00));
        assert_eq!(fallback.status, BillStatus::Paid);
    }
}

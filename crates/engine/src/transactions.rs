//! Ledger rows.
//!
//! A `Transaction` is the atomic financial event. Balances are never stored:
//! they are derived by replaying settled transactions (see
//! [`Transaction::settles_balance`]).

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
            Self::Transfer => "TRANSFER",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "INCOME" => Ok(Self::Income),
            "EXPENSE" => Ok(Self::Expense),
            "TRANSFER" => Ok(Self::Transfer),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Canceled => "CANCELED",
        }
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(EngineError::InvalidInput(format!(
                "invalid payment status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    #[default]
    Pending,
    Reconciled,
}

impl ReconciliationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Reconciled => "RECONCILED",
        }
    }
}

impl TryFrom<&str> for ReconciliationStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "RECONCILED" => Ok(Self::Reconciled),
            other => Err(EngineError::InvalidInput(format!(
                "invalid reconciliation status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceType {
    #[default]
    Single,
    Installment,
    Fixed,
}

impl RecurrenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Installment => "INSTALLMENT",
            Self::Fixed => "FIXED",
        }
    }
}

impl TryFrom<&str> for RecurrenceType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "SINGLE" => Ok(Self::Single),
            "INSTALLMENT" => Ok(Self::Installment),
            "FIXED" => Ok(Self::Fixed),
            other => Err(EngineError::InvalidInput(format!(
                "invalid recurrence type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub category_id: Option<Uuid>,
    /// Category name captured at write time.
    pub category_name: Option<String>,
    pub description: String,
    pub amount: MoneyCents,
    pub payment_method: Option<String>,
    pub km: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub group_id: Option<Uuid>,
    pub installment_number: Option<i32>,
    pub installment_total: Option<i32>,
    pub recurrence: RecurrenceType,
    /// `None` for transfers and legacy rows; both count as settled.
    pub payment_status: Option<PaymentStatus>,
    pub due_date: Option<NaiveDate>,
    pub original_amount: Option<MoneyCents>,
    pub interest_amount: MoneyCents,
    pub discount_amount: MoneyCents,
    pub payment_date: Option<NaiveDate>,
    pub reconciliation: ReconciliationStatus,
    pub reconciliation_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub auto_debit: bool,
    /// Card this expense was charged on.
    pub card_id: Option<Uuid>,
    /// Bill this expense settles.
    pub bill_payment_id: Option<Uuid>,
}

impl Transaction {
    /// A purchase charged on a card (not the settlement of a bill).
    pub fn is_card_expense(&self) -> bool {
        is_card_expense(self.kind, self.card_id, self.bill_payment_id)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Paid)
    }

    pub fn is_canceled(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Canceled)
    }

    /// Whether the row moves account balances.
    pub fn settles_balance(&self) -> bool {
        matches!(self.payment_status, None | Some(PaymentStatus::Paid))
    }

    /// Contribution of this row to its card's used limit.
    pub fn card_usage(&self) -> Option<(Uuid, MoneyCents)> {
        card_usage(
            self.kind,
            self.card_id,
            self.bill_payment_id,
            self.payment_status,
            self.amount,
        )
    }

    /// Signed effect of this row on `account_id`, if settled.
    pub fn balance_effect(&self, account_id: Uuid) -> MoneyCents {
        if !self.settles_balance() {
            return MoneyCents::ZERO;
        }
        let mut effect = MoneyCents::ZERO;
        match self.kind {
            TransactionKind::Income => {
                if self.to_account_id == Some(account_id) {
                    effect += self.amount;
                }
            }
            TransactionKind::Expense => {
                if self.from_account_id == Some(account_id) {
                    effect -= self.amount;
                }
            }
            TransactionKind::Transfer => {
                if self.from_account_id == Some(account_id) {
                    effect -= self.amount;
                }
                if self.to_account_id == Some(account_id) {
                    effect += self.amount;
                }
            }
        }
        effect
    }
}

pub(crate) fn is_card_expense(
    kind: TransactionKind,
    card_id: Option<Uuid>,
    bill_payment_id: Option<Uuid>,
) -> bool {
    kind == TransactionKind::Expense && card_id.is_some() && bill_payment_id.is_none()
}

pub(crate) fn card_usage(
    kind: TransactionKind,
    card_id: Option<Uuid>,
    bill_payment_id: Option<Uuid>,
    status: Option<PaymentStatus>,
    amount: MoneyCents,
) -> Option<(Uuid, MoneyCents)> {
    if !is_card_expense(kind, card_id, bill_payment_id) || status == Some(PaymentStatus::Canceled)
    {
        return None;
    }
    card_id.map(|id| (id, amount))
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub date: Date,
    pub kind: String,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub description: String,
    pub amount_cents: i64,
    pub payment_method: Option<String>,
    pub km: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub group_id: Option<Uuid>,
    pub installment_number: Option<i32>,
    pub installment_total: Option<i32>,
    pub recurrence: String,
    pub payment_status: Option<String>,
    pub due_date: Option<Date>,
    pub original_amount_cents: Option<i64>,
    pub interest_cents: i64,
    pub discount_cents: i64,
    pub payment_date: Option<Date>,
    pub reconciliation: String,
    pub reconciliation_date: Option<Date>,
    pub notes: Option<String>,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub auto_debit: bool,
    pub card_id: Option<Uuid>,
    pub bill_payment_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id),
            user_id: ActiveValue::Set(tx.user_id.clone()),
            date: ActiveValue::Set(tx.date),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            category_id: ActiveValue::Set(tx.category_id),
            category_name: ActiveValue::Set(tx.category_name.clone()),
            description: ActiveValue::Set(tx.description.clone()),
            amount_cents: ActiveValue::Set(tx.amount.cents()),
            payment_method: ActiveValue::Set(tx.payment_method.clone()),
            km: ActiveValue::Set(tx.km),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
            group_id: ActiveValue::Set(tx.group_id),
            installment_number: ActiveValue::Set(tx.installment_number),
            installment_total: ActiveValue::Set(tx.installment_total),
            recurrence: ActiveValue::Set(tx.recurrence.as_str().to_string()),
            payment_status: ActiveValue::Set(tx.payment_status.map(|s| s.as_str().to_string())),
            due_date: ActiveValue::Set(tx.due_date),
            original_amount_cents: ActiveValue::Set(tx.original_amount.map(MoneyCents::cents)),
            interest_cents: ActiveValue::Set(tx.interest_amount.cents()),
            discount_cents: ActiveValue::Set(tx.discount_amount.cents()),
            payment_date: ActiveValue::Set(tx.payment_date),
            reconciliation: ActiveValue::Set(tx.reconciliation.as_str().to_string()),
            reconciliation_date: ActiveValue::Set(tx.reconciliation_date),
            notes: ActiveValue::Set(tx.notes.clone()),
            from_account_id: ActiveValue::Set(tx.from_account_id),
            to_account_id: ActiveValue::Set(tx.to_account_id),
            auto_debit: ActiveValue::Set(tx.auto_debit),
            card_id: ActiveValue::Set(tx.card_id),
            bill_payment_id: ActiveValue::Set(tx.bill_payment_id),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            date: model.date,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            category_id: model.category_id,
            category_name: model.category_name,
            description: model.description,
            amount: MoneyCents::new(model.amount_cents),
            payment_method: model.payment_method,
            km: model.km,
            created_at: model.created_at,
            updated_at: model.updated_at,
            group_id: model.group_id,
            installment_number: model.installment_number,
            installment_total: model.installment_total,
            recurrence: RecurrenceType::try_from(model.recurrence.as_str())?,
            payment_status: model
                .payment_status
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(PaymentStatus::try_from)
                .transpose()?,
            due_date: model.due_date,
            original_amount: model.original_amount_cents.map(MoneyCents::new),
            interest_amount: MoneyCents::new(model.interest_cents),
            discount_amount: MoneyCents::new(model.discount_cents),
            payment_date: model.payment_date,
            reconciliation: ReconciliationStatus::try_from(model.reconciliation.as_str())?,
            reconciliation_date: model.reconciliation_date,
            notes: model.notes,
            from_account_id: model.from_account_id,
            to_account_id: model.to_account_id,
            auto_debit: model.auto_debit,
            card_id: model.card_id,
            bill_payment_id: model.bill_payment_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_codes_are_upper_case() {
        assert_eq!(TransactionKind::Transfer.as_str(), "TRANSFER");
        assert_eq!(PaymentStatus::Canceled.as_str(), "CANCELED");
        assert_eq!(RecurrenceType::Installment.as_str(), "INSTALLMENT");
        assert_eq!(
            ReconciliationStatus::try_from("RECONCILED").unwrap(),
            ReconciliationStatus::Reconciled
        );
        assert!(TransactionKind::try_from("expense").is_err());
        assert!(PaymentStatus::try_from("paid").is_err());
    }
}

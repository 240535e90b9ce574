use std::collections::HashMap;

use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, PaymentStatus, ReconciliationStatus, ResultEngine, Transaction,
    TransactionKind, transactions,
};

mod create;
mod delete;
mod list;
mod reconcile;
mod update;

pub use list::{TransactionListFilter, TransactionListItem, TransactionPage};
pub use reconcile::{BulkReconciled, ReconciliationSummary, UnreconciledItem};

/// Payment method written on card expenses when the caller leaves it empty.
pub(super) const CARD_PAYMENT_METHOD: &str = "Crédito";

/// Input of a new ledger row (or of the first row of an installment plan).
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub amount: MoneyCents,
    pub category_id: Option<Uuid>,
    pub description: String,
    pub payment_method: Option<String>,
    pub km: Option<i64>,
    pub notes: Option<String>,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub auto_debit: bool,
    /// Explicit payment flag. Single rows default to `date <= today`,
    /// installment plans to a paid first installment.
    pub paid: Option<bool>,
    /// Card the expense is charged on.
    pub card_id: Option<Uuid>,
    /// Simple monthly interest in percent, finite installment plans only.
    pub interest_rate: Option<f64>,
}

impl NewTransaction {
    #[must_use]
    pub fn new(
        date: NaiveDate,
        kind: TransactionKind,
        amount: MoneyCents,
        description: impl Into<String>,
    ) -> Self {
        Self {
            date,
            kind,
            amount,
            category_id: None,
            description: description.into(),
            payment_method: None,
            km: None,
            notes: None,
            from_account_id: None,
            to_account_id: None,
            auto_debit: false,
            paid: None,
            card_id: None,
            interest_rate: None,
        }
    }

    #[must_use]
    pub fn category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn from_account(mut self, account_id: Uuid) -> Self {
        self.from_account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn to_account(mut self, account_id: Uuid) -> Self {
        self.to_account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn paid(mut self, paid: bool) -> Self {
        self.paid = Some(paid);
        self
    }

    #[must_use]
    pub fn card(mut self, card_id: Uuid) -> Self {
        self.card_id = Some(card_id);
        self
    }

    #[must_use]
    pub fn auto_debit(mut self, auto_debit: bool) -> Self {
        self.auto_debit = auto_debit;
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn interest_rate(mut self, rate: f64) -> Self {
        self.interest_rate = Some(rate);
        self
    }

    fn is_card_expense(&self) -> bool {
        crate::transactions::is_card_expense(self.kind, self.card_id, None)
    }
}

/// Partial update of a ledger row. `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct TransactionPatch {
    pub date: Option<NaiveDate>,
    pub kind: Option<TransactionKind>,
    pub amount: Option<MoneyCents>,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub km: Option<i64>,
    pub notes: Option<String>,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub auto_debit: Option<bool>,
    pub paid: Option<bool>,
    /// `Some(None)` unlinks the row from its card.
    pub card_id: Option<Option<Uuid>>,
}

/// Which members of an installment group a mutation applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchScope {
    #[default]
    This,
    Following,
    All,
}

/// Which members of an installment group a cancellation applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelScope {
    #[default]
    Single,
    Future,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTransaction {
    pub id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedInstallments {
    pub ids: Vec<Uuid>,
    /// `-1` for open-ended plans.
    pub installment_count: i32,
    pub group_id: Uuid,
    pub installment_amount: MoneyCents,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Updated {
    One { id: Uuid },
    Many { count: usize },
}

pub(super) async fn find_transaction<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    id: Uuid,
) -> ResultEngine<Transaction> {
    let model = transactions::Entity::find_by_id(id)
        .filter(transactions::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("transaction {id}")))?;
    Transaction::try_from(model)
}

pub(super) async fn group_members<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    group_id: Uuid,
) -> ResultEngine<Vec<Transaction>> {
    transactions::Entity::find()
        .filter(transactions::Column::UserId.eq(user_id))
        .filter(transactions::Column::GroupId.eq(group_id))
        .order_by_asc(transactions::Column::Date)
        .all(db)
        .await?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
}

/// Whether `member` follows (or is) `anchor` inside its group.
///
/// Numbered installments compare by number, open-ended ones by date.
pub(super) fn is_following(member: &Transaction, anchor: &Transaction) -> bool {
    match (member.installment_number, anchor.installment_number) {
        (Some(member_number), Some(anchor_number)) => member_number >= anchor_number,
        _ => member.date >= anchor.date,
    }
}

/// Rows selected by `scope` around `anchor`. Ungrouped rows always select
/// only themselves.
pub(super) async fn scoped_rows<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    anchor: &Transaction,
    scope: BatchScope,
) -> ResultEngine<Vec<Transaction>> {
    let group_id = match (anchor.group_id, scope) {
        (Some(group_id), BatchScope::Following | BatchScope::All) => group_id,
        _ => return Ok(vec![anchor.clone()]),
    };
    let members = group_members(db, user_id, group_id).await?;
    Ok(match scope {
        BatchScope::All => members,
        _ => members
            .into_iter()
            .filter(|member| is_following(member, anchor))
            .collect(),
    })
}

/// Net card usage changes keyed by card.
#[derive(Debug, Default)]
pub(super) struct UsageDeltas(HashMap<Uuid, MoneyCents>);

impl UsageDeltas {
    pub(super) fn add(&mut self, usage: Option<(Uuid, MoneyCents)>) {
        if let Some((card_id, amount)) = usage {
            *self.0.entry(card_id).or_default() += amount;
        }
    }

    pub(super) fn reverse(&mut self, usage: Option<(Uuid, MoneyCents)>) {
        self.add(usage.map(|(card_id, amount)| (card_id, -amount)));
    }

    pub(super) fn is_empty(&self) -> bool {
        self.0.values().all(|delta| delta.is_zero())
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = (Uuid, MoneyCents)> + '_ {
        self.0
            .iter()
            .filter(|(_, delta)| !delta.is_zero())
            .map(|(card_id, delta)| (*card_id, *delta))
    }
}

/// Marks `tx` settled on `date`, reconciled the same day.
pub(super) fn settle(tx: &mut Transaction, date: NaiveDate) {
    tx.payment_status = Some(PaymentStatus::Paid);
    tx.payment_date = Some(date);
    tx.reconciliation = ReconciliationStatus::Reconciled;
    tx.reconciliation_date = Some(date);
}

/// Back to the pending, unreconciled defaults.
pub(super) fn unsettle(tx: &mut Transaction) {
    tx.payment_status = Some(PaymentStatus::Pending);
    tx.payment_date = None;
    tx.reconciliation = ReconciliationStatus::Pending;
    tx.reconciliation_date = None;
}

/// Shape a card expense: pending, charged on the card instead of an account.
pub(super) fn shape_card_expense(tx: &mut Transaction) {
    unsettle(tx);
    tx.from_account_id = None;
    tx.auto_debit = false;
    if tx
        .payment_method
        .as_deref()
        .is_none_or(|method| method.trim().is_empty())
    {
        tx.payment_method = Some(CARD_PAYMENT_METHOD.to_string());
    }
}

/// Amount and account rules shared by create and update.
pub(super) fn validate_shape(tx: &Transaction) -> ResultEngine<()> {
    if tx.amount.is_negative() {
        return Err(EngineError::InvalidAmount(
            "amount must not be negative".to_string(),
        ));
    }
    if tx.amount.is_zero() && !tx.is_card_expense() {
        return Err(EngineError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }
    if tx.kind == TransactionKind::Transfer {
        match (tx.from_account_id, tx.to_account_id) {
            (Some(from), Some(to)) if from != to => {}
            (Some(_), Some(_)) => {
                return Err(EngineError::InvalidInput(
                    "transfer accounts must differ".to_string(),
                ));
            }
            _ => {
                return Err(EngineError::InvalidInput(
                    "transfer requires source and destination accounts".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::RecurrenceType;

    fn row(number: Option<i32>, day: u32) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            kind: TransactionKind::Expense,
            category_id: None,
            category_name: None,
            description: "x".to_string(),
            amount: MoneyCents::new(10_00),
            payment_method: None,
            km: None,
            created_at: now,
            updated_at: now,
            group_id: None,
            installment_number: number,
            installment_total: number.map(|_| 3),
            recurrence: RecurrenceType::Single,
            payment_status: Some(PaymentStatus::Pending),
            due_date: None,
            original_amount: None,
            interest_amount: MoneyCents::ZERO,
            discount_amount: MoneyCents::ZERO,
            payment_date: None,
            reconciliation: ReconciliationStatus::Pending,
            reconciliation_date: None,
            notes: None,
            from_account_id: None,
            to_account_id: None,
            auto_debit: false,
            card_id: None,
            bill_payment_id: None,
        }
    }

    #[test]
    fn following_compares_numbers_then_dates() {
        let anchor = row(Some(2), 10);
        assert!(is_following(&row(Some(2), 1), &anchor));
        assert!(is_following(&row(Some(3), 1), &anchor));
        assert!(!is_following(&row(Some(1), 20), &anchor));

        let open_anchor = row(None, 10);
        assert!(is_following(&row(None, 10), &open_anchor));
        assert!(!is_following(&row(None, 9), &open_anchor));
    }

    #[test]
    fn usage_deltas_net_per_card() {
        let card = Uuid::new_v4();
        let mut deltas = UsageDeltas::default();
        deltas.add(Some((card, MoneyCents::new(50_00))));
        deltas.reverse(Some((card, MoneyCents::new(50_00))));
        deltas.add(None);
        assert!(deltas.is_empty());
        assert_eq!(deltas.iter().count(), 0);
    }

    #[test]
    fn zero_amount_only_for_card_expenses() {
        let mut tx = row(None, 1);
        tx.amount = MoneyCents::ZERO;
        assert!(validate_shape(&tx).is_err());
        tx.card_id = Some(Uuid::new_v4());
        assert!(validate_shape(&tx).is_ok());
    }

    #[test]
    fn transfers_need_distinct_accounts() {
        let mut tx = row(None, 1);
        tx.kind = TransactionKind::Transfer;
        let account = Uuid::new_v4();
        tx.from_account_id = Some(account);
        assert!(validate_shape(&tx).is_err());
        tx.to_account_id = Some(account);
        assert!(validate_shape(&tx).is_err());
        tx.to_account_id = Some(Uuid::new_v4());
        assert!(validate_shape(&tx).is_ok());
    }

    #[test]
    fn card_shape_forces_pending_without_account() {
        let mut tx = row(None, 1);
        tx.card_id = Some(Uuid::new_v4());
        tx.from_account_id = Some(Uuid::new_v4());
        tx.auto_debit = true;
        let date = tx.date;
        settle(&mut tx, date);
        shape_card_expense(&mut tx);
        assert_eq!(tx.payment_status, Some(PaymentStatus::Pending));
        assert_eq!(tx.from_account_id, None);
        assert!(!tx.auto_debit);
        assert_eq!(tx.payment_method.as_deref(), Some(CARD_PAYMENT_METHOD));
    }
}

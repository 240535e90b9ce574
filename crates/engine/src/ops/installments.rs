use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::{ConnectionTrait, QueryFilter, TransactionTrait, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, InstallmentGroup, MoneyCents, PaymentStatus, ResultEngine, Transaction,
    installment_groups, transactions,
};

use super::{
    Engine,
    reserves::touches_reserve,
    transactions::{
        CancelScope, UsageDeltas, find_transaction, group_members, is_following, settle,
    },
    with_tx,
};

const INFERRED_FREQUENCY: &str = "MONTHLY";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkPaid {
    pub count: usize,
    pub skipped_card: Vec<Uuid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentsCanceled {
    pub canceled_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentItem {
    pub id: Uuid,
    pub number: Option<i32>,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub description: String,
    pub amount: MoneyCents,
    pub interest: MoneyCents,
    pub status: Option<PaymentStatus>,
    pub payment_date: Option<NaiveDate>,
}

impl From<&Transaction> for InstallmentItem {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            number: tx.installment_number,
            date: tx.date,
            due_date: tx.due_date,
            description: tx.description.clone(),
            amount: tx.amount,
            interest: tx.interest_amount,
            status: tx.payment_status,
            payment_date: tx.payment_date,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentStats {
    pub total: usize,
    pub paid: usize,
    pub pending: usize,
    pub canceled: usize,
    /// `round(paid / total * 100)`.
    pub progress: i64,
}

impl InstallmentStats {
    fn of(members: &[Transaction], configured: i32) -> Self {
        let total = usize::try_from(configured)
            .ok()
            .filter(|count| *count > 0)
            .unwrap_or(members.len());
        let paid = members.iter().filter(|tx| tx.is_paid()).count();
        let canceled = members.iter().filter(|tx| tx.is_canceled()).count();
        let progress = if total == 0 {
            0
        } else {
            (paid as f64 / total as f64 * 100.0).round() as i64
        };
        Self {
            total,
            paid,
            pending: members.len() - paid - canceled,
            canceled,
            progress,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstallmentDetails {
    pub group: InstallmentGroup,
    /// The group row was missing and `group` was rebuilt from the members.
    pub inferred: bool,
    /// Members by installment number, then date.
    pub items: Vec<InstallmentItem>,
    pub stats: InstallmentStats,
}

/// Adds `by` to one counter column of a group row.
async fn bump_group_counter<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    group_id: Uuid,
    column: installment_groups::Column,
    by: usize,
) -> ResultEngine<()> {
    if by == 0 {
        return Ok(());
    }
    installment_groups::Entity::update_many()
        .col_expr(column, Expr::col(column).add(by as i32))
        .col_expr(installment_groups::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(installment_groups::Column::Id.eq(group_id))
        .filter(installment_groups::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Group config rebuilt from its members when the row is gone.
fn infer_group(user_id: &str, group_id: Uuid, members: &[Transaction]) -> Option<InstallmentGroup> {
    let first = members.first()?;
    Some(InstallmentGroup {
        id: group_id,
        user_id: user_id.to_string(),
        kind: first.kind,
        frequency: INFERRED_FREQUENCY.to_string(),
        due_day: first.date.day(),
        total_amount: members.iter().map(|tx| tx.amount).sum(),
        installment_count: i32::try_from(members.len()).unwrap_or(i32::MAX),
        paid_count: members.iter().filter(|tx| tx.is_paid()).count() as i32,
        canceled_count: members.iter().filter(|tx| tx.is_canceled()).count() as i32,
        allow_individual_edit: true,
        interest_enabled: false,
        interest_rate: 0.0,
        notes: None,
        created_at: first.created_at,
        updated_at: first.updated_at,
    })
}

impl Engine {
    /// Settles one pending installment, optionally at a different amount.
    pub async fn mark_installment_paid(
        &self,
        user_id: &str,
        id: Uuid,
        payment_date: Option<NaiveDate>,
        paid_amount: Option<MoneyCents>,
    ) -> ResultEngine<Transaction> {
        let today = self.today(user_id).await?;
        let config = self.config(user_id).await?;
        let payment_date = payment_date.unwrap_or(today);
        if paid_amount.is_some_and(|amount| !amount.is_positive()) {
            return Err(EngineError::InvalidAmount(
                "paid amount must be greater than zero".to_string(),
            ));
        }

        let tx = with_tx!(self, |db_tx| {
            let mut tx = find_transaction(&db_tx, user_id, id).await?;
            if tx.is_card_expense() {
                return Err(EngineError::CardTransactionPayment);
            }
            if tx.is_paid() {
                return Err(EngineError::AlreadyPaid(format!("transaction {id}")));
            }
            settle(&mut tx, payment_date);
            if let Some(amount) = paid_amount {
                tx.amount = amount;
            }
            tx.updated_at = Utc::now();
            transactions::ActiveModel::from(&tx).update(&db_tx).await?;
            if let Some(group_id) = tx.group_id {
                bump_group_counter(
                    &db_tx,
                    user_id,
                    group_id,
                    installment_groups::Column::PaidCount,
                    1,
                )
                .await?;
            }
            if touches_reserve(&tx, &config) {
                self.rebuild_reserves(&db_tx, user_id, today).await?;
            }
            Ok::<_, EngineError>(tx)
        })?;

        self.invalidate_card_caches(user_id);
        self.invalidate_account_caches(user_id);
        tracing::debug!(user_id, %id, %payment_date, "installment paid");
        Ok(tx)
    }

    /// Settles every listed pending row. Card expenses are reported back,
    /// already paid rows and unknown ids are skipped.
    pub async fn mark_multiple_paid(
        &self,
        user_id: &str,
        ids: &[Uuid],
        payment_date: Option<NaiveDate>,
    ) -> ResultEngine<BulkPaid> {
        let today = self.today(user_id).await?;
        let payment_date = payment_date.unwrap_or(today);

        let result = with_tx!(self, |db_tx| {
            let rows: Vec<Transaction> = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(transactions::Column::Id.is_in(ids.to_vec()))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<_>>()?;

            let mut result = BulkPaid {
                count: 0,
                skipped_card: Vec::new(),
            };
            let mut per_group: HashMap<Uuid, usize> = HashMap::new();
            for mut tx in rows {
                if tx.is_card_expense() {
                    result.skipped_card.push(tx.id);
                    continue;
                }
                if tx.is_paid() {
                    continue;
                }
                settle(&mut tx, payment_date);
                tx.updated_at = Utc::now();
                transactions::ActiveModel::from(&tx).update(&db_tx).await?;
                if let Some(group_id) = tx.group_id {
                    *per_group.entry(group_id).or_default() += 1;
                }
                result.count += 1;
            }
            for (group_id, count) in per_group {
                bump_group_counter(
                    &db_tx,
                    user_id,
                    group_id,
                    installment_groups::Column::PaidCount,
                    count,
                )
                .await?;
            }
            self.rebuild_reserves(&db_tx, user_id, today).await?;
            Ok::<_, EngineError>(result)
        })?;

        if !result.skipped_card.is_empty() {
            tracing::warn!(
                user_id,
                skipped = result.skipped_card.len(),
                "card expenses skipped by bulk payment"
            );
        }
        self.invalidate_card_caches(user_id);
        self.invalidate_account_caches(user_id);
        Ok(result)
    }

    /// Cancels one row, or the pending rows of its group from it onwards
    /// (`Future`) or entirely (`All`). Paid and canceled rows are left alone.
    pub async fn cancel_installment(
        &self,
        user_id: &str,
        id: Uuid,
        scope: CancelScope,
    ) -> ResultEngine<InstallmentsCanceled> {
        let today = self.today(user_id).await?;
        let config = self.config(user_id).await?;

        let canceled = with_tx!(self, |db_tx| {
            let anchor = find_transaction(&db_tx, user_id, id).await?;
            let selected = match (anchor.group_id, scope) {
                (Some(group_id), CancelScope::Future) => group_members(&db_tx, user_id, group_id)
                    .await?
                    .into_iter()
                    .filter(|member| is_following(member, &anchor))
                    .collect(),
                (Some(group_id), CancelScope::All) => {
                    group_members(&db_tx, user_id, group_id).await?
                }
                _ => vec![anchor.clone()],
            };
            let targets: Vec<Transaction> = selected
                .into_iter()
                .filter(|tx| !tx.is_paid() && !tx.is_canceled())
                .collect();

            let mut deltas = UsageDeltas::default();
            for tx in &targets {
                deltas.reverse(tx.card_usage());
            }
            self.apply_card_usage(&db_tx, user_id, &deltas).await?;

            let now = Utc::now();
            for tx in &targets {
                let mut tx = tx.clone();
                tx.payment_status = Some(PaymentStatus::Canceled);
                tx.updated_at = now;
                transactions::ActiveModel::from(&tx).update(&db_tx).await?;
            }
            if let Some(group_id) = anchor.group_id {
                bump_group_counter(
                    &db_tx,
                    user_id,
                    group_id,
                    installment_groups::Column::CanceledCount,
                    targets.len(),
                )
                .await?;
            }
            if targets.iter().any(|tx| touches_reserve(tx, &config)) {
                self.rebuild_reserves(&db_tx, user_id, today).await?;
            }
            Ok::<_, EngineError>(targets.len())
        })?;

        self.invalidate_card_caches(user_id);
        tracing::debug!(user_id, %id, ?scope, canceled, "installments canceled");
        Ok(InstallmentsCanceled {
            canceled_count: canceled,
        })
    }

    /// Group config with its members and counts recomputed from the rows.
    pub async fn installment_details(
        &self,
        user_id: &str,
        group_id: Uuid,
    ) -> ResultEngine<InstallmentDetails> {
        let mut members = group_members(&self.database, user_id, group_id).await?;
        members.sort_by_key(|tx| (tx.installment_number, tx.date));
        let stored = installment_groups::Entity::find_by_id(group_id)
            .filter(installment_groups::Column::UserId.eq(user_id))
            .one(&self.database)
            .await?;

        let (group, inferred) = match stored {
            Some(model) => (InstallmentGroup::try_from(model)?, false),
            None => {
                let group = infer_group(user_id, group_id, &members)
                    .ok_or_else(|| EngineError::KeyNotFound(format!("group {group_id}")))?;
                tracing::warn!(user_id, %group_id, "group row missing, inferred from members");
                (group, true)
            }
        };
        let stats = InstallmentStats::of(&members, group.installment_count);
        Ok(InstallmentDetails {
            group,
            inferred,
            items: members.iter().map(InstallmentItem::from).collect(),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OPEN_ENDED_COUNT, ReconciliationStatus, RecurrenceType, TransactionKind};

    fn member(number: i32, status: PaymentStatus) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            date: NaiveDate::from_ymd_opt(2025, number as u32, 15).unwrap(),
            kind: TransactionKind::Expense,
            category_id: None,
            category_name: None,
            description: format!("Geladeira ({number}/3)"),
            amount: MoneyCents::new(100_00),
            payment_method: None,
            km: None,
            created_at: now,
            updated_at: now,
            group_id: None,
            installment_number: Some(number),
            installment_total: Some(3),
            recurrence: RecurrenceType::Installment,
            payment_status: Some(status),
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
    fn stats_round_progress() {
        let members = vec![
            member(1, PaymentStatus::Paid),
            member(2, PaymentStatus::Pending),
            member(3, PaymentStatus::Canceled),
        ];
        let stats = InstallmentStats::of(&members, 3);
        assert_eq!(stats.paid, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.canceled, 1);
        assert_eq!(stats.progress, 33);

        let open_ended = InstallmentStats::of(&members[..2], OPEN_ENDED_COUNT);
        assert_eq!(open_ended.total, 2);
        assert_eq!(open_ended.progress, 50);
    }

    #[test]
    fn inferred_group_sums_members() {
        let members = vec![member(1, PaymentStatus::Paid), member(2, PaymentStatus::Pending)];
        let group = infer_group("alice", Uuid::new_v4(), &members).unwrap();
        assert_eq!(group.total_amount, MoneyCents::new(200_00));
        assert_eq!(group.due_day, 15);
        assert_eq!(group.frequency, "MONTHLY");
        assert_eq!(group.paid_count, 1);
        assert!(infer_group("alice", Uuid::new_v4(), &[]).is_none());
    }
}

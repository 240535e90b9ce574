use chrono::{NaiveDate, Utc};
use sea_orm::{QueryFilter, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, MonthKey, ReconciliationStatus, ResultEngine, Transaction,
    TransactionKind, transactions,
};

use super::super::{Engine, with_tx};
use super::find_transaction;

const UNRECONCILED_LIST_LIMIT: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReconciled {
    pub reconciled: usize,
    pub total: usize,
    /// Card expenses, which are reconciled through their bill.
    pub skipped_card: Vec<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreconciledItem {
    pub id: Uuid,
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub description: String,
    pub amount: MoneyCents,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub income_reconciled: MoneyCents,
    pub income_pending: MoneyCents,
    pub expense_reconciled: MoneyCents,
    pub expense_pending: MoneyCents,
    pub reconciled_balance: MoneyCents,
    pub pending_balance: MoneyCents,
    /// Unreconciled rows dated before today.
    pub overdue_count: usize,
    /// Oldest overdue rows first.
    pub overdue: Vec<UnreconciledItem>,
}

impl ReconciliationSummary {
    fn from_rows(rows: &[Transaction], today: NaiveDate) -> Self {
        let mut summary = Self::default();
        let mut overdue: Vec<&Transaction> = Vec::new();
        for tx in rows
            .iter()
            .filter(|tx| !tx.is_canceled() && tx.kind != TransactionKind::Transfer)
        {
            let reconciled = tx.reconciliation == ReconciliationStatus::Reconciled;
            match (tx.kind, reconciled) {
                (TransactionKind::Income, true) => summary.income_reconciled += tx.amount,
                (TransactionKind::Income, false) => summary.income_pending += tx.amount,
                (_, true) => summary.expense_reconciled += tx.amount,
                (_, false) => summary.expense_pending += tx.amount,
            }
            if !reconciled && tx.date < today && !tx.is_card_expense() {
                overdue.push(tx);
            }
        }
        summary.reconciled_balance = summary.income_reconciled - summary.expense_reconciled;
        summary.pending_balance = summary.income_pending - summary.expense_pending;
        overdue.sort_by_key(|tx| (tx.date, tx.created_at));
        summary.overdue_count = overdue.len();
        summary.overdue = overdue
            .into_iter()
            .take(UNRECONCILED_LIST_LIMIT)
            .map(|tx| UnreconciledItem {
                id: tx.id,
                date: tx.date,
                kind: tx.kind,
                description: tx.description.clone(),
                amount: tx.amount,
            })
            .collect();
        summary
    }
}

fn mark_reconciled(tx: &mut Transaction, date: NaiveDate) {
    tx.reconciliation = ReconciliationStatus::Reconciled;
    tx.reconciliation_date = Some(date);
    tx.updated_at = Utc::now();
}

impl Engine {
    /// Confirms one row against the bank statement (`date` defaults to today).
    pub async fn reconcile_transaction(
        &self,
        user_id: &str,
        id: Uuid,
        date: Option<NaiveDate>,
    ) -> ResultEngine<Transaction> {
        let date = match date {
            Some(date) => date,
            None => self.today(user_id).await?,
        };
        let mut tx = find_transaction(&self.database, user_id, id).await?;
        if tx.is_card_expense() {
            return Err(EngineError::CardTransactionReconcile);
        }
        mark_reconciled(&mut tx, date);
        transactions::ActiveModel::from(&tx)
            .update(&self.database)
            .await?;
        Ok(tx)
    }

    /// Reconciles every listed row, skipping card expenses and unknown ids.
    pub async fn bulk_reconcile(
        &self,
        user_id: &str,
        ids: &[Uuid],
        date: Option<NaiveDate>,
    ) -> ResultEngine<BulkReconciled> {
        let date = match date {
            Some(date) => date,
            None => self.today(user_id).await?,
        };

        with_tx!(self, |db_tx| {
            let rows: Vec<Transaction> = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(transactions::Column::Id.is_in(ids.to_vec()))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<_>>()?;

            let mut result = BulkReconciled {
                reconciled: 0,
                total: ids.len(),
                skipped_card: Vec::new(),
            };
            for mut tx in rows {
                if tx.is_card_expense() {
                    result.skipped_card.push(tx.id);
                    continue;
                }
                mark_reconciled(&mut tx, date);
                transactions::ActiveModel::from(&tx).update(&db_tx).await?;
                result.reconciled += 1;
            }
            if !result.skipped_card.is_empty() {
                tracing::warn!(
                    user_id,
                    skipped = result.skipped_card.len(),
                    "card expenses skipped by bulk reconcile"
                );
            }
            Ok::<_, EngineError>(result)
        })
    }

    /// Reconciled vs pending totals of one month.
    pub async fn reconciliation_summary(
        &self,
        user_id: &str,
        month: MonthKey,
    ) -> ResultEngine<ReconciliationSummary> {
        let today = self.today(user_id).await?;
        let rows: Vec<Transaction> = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .filter(transactions::Column::Date.gte(month.first_day()))
            .filter(transactions::Column::Date.lte(month.last_day()))
            .all(&self.database)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<_>>()?;
        Ok(ReconciliationSummary::from_rows(&rows, today))
    }
}

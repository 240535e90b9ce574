use std::collections::BTreeSet;

use chrono::{TimeDelta, Utc};
use sea_orm::{QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Category, EngineError, PaymentStatus, ResultEngine, Transaction, TransactionKind,
    transactions,
};

use super::super::{
    Engine, accounts::require_account, cards::require_card, categories::find_visible_category,
    normalize_optional_text, with_tx,
};
use super::{
    BatchScope, TransactionPatch, UsageDeltas, Updated, find_transaction, scoped_rows, settle,
    shape_card_expense, unsettle, validate_shape,
};

impl Engine {
    /// Applies `patch` to the row `id` and, depending on `scope`, to the
    /// other members of its installment group.
    ///
    /// A date change is applied as a day shift measured on `id` and carried
    /// over to every selected member.
    pub async fn update_transaction(
        &self,
        user_id: &str,
        id: Uuid,
        patch: TransactionPatch,
        scope: BatchScope,
    ) -> ResultEngine<Updated> {
        let today = self.today(user_id).await?;

        let count = with_tx!(self, |db_tx| {
            let anchor = find_transaction(&db_tx, user_id, id).await?;
            let rows = scoped_rows(&db_tx, user_id, &anchor, scope).await?;

            let category = match patch.category_id {
                Some(category_id) => {
                    Some(find_visible_category(&db_tx, user_id, category_id).await?)
                }
                None => None,
            };
            if let Some(Some(card_id)) = patch.card_id {
                require_card(&db_tx, user_id, card_id).await?;
            }
            for account_id in [patch.from_account_id, patch.to_account_id]
                .into_iter()
                .flatten()
            {
                require_account(&db_tx, user_id, account_id).await?;
            }

            let day_delta = patch.date.map(|date| date - anchor.date);
            let mut deltas = UsageDeltas::default();
            for old in &rows {
                let new = apply_patch(old, &patch, day_delta, category.as_ref())?;
                deltas.reverse(old.card_usage());
                deltas.add(new.card_usage());
                transactions::ActiveModel::from(&new).update(&db_tx).await?;
            }

            self.apply_card_usage(&db_tx, user_id, &deltas).await?;
            self.rebuild_reserves(&db_tx, user_id, today).await?;
            Ok::<_, EngineError>(rows.len())
        })?;

        self.invalidate_card_caches(user_id);
        self.invalidate_account_caches(user_id);
        tracing::debug!(user_id, %id, ?scope, count, "transaction updated");
        Ok(match scope {
            BatchScope::This => Updated::One { id },
            _ => Updated::Many { count },
        })
    }

    /// Settles every due auto-debit row of `user_id` through the update path.
    pub async fn run_auto_debit(&self, user_id: &str) -> ResultEngine<usize> {
        let today = self.today(user_id).await?;
        let patch = TransactionPatch {
            paid: Some(true),
            ..TransactionPatch::default()
        };

        let count = with_tx!(self, |db_tx| {
            let due: Vec<Transaction> = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(transactions::Column::AutoDebit.eq(true))
                .filter(transactions::Column::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<_>>()?;

            let mut count = 0;
            for old in due
                .iter()
                .filter(|tx| tx.due_date.unwrap_or(tx.date) <= today && !tx.is_card_expense())
            {
                let new = apply_patch(old, &patch, None, None)?;
                transactions::ActiveModel::from(&new).update(&db_tx).await?;
                count += 1;
            }
            if count > 0 {
                self.rebuild_reserves(&db_tx, user_id, today).await?;
            }
            Ok::<_, EngineError>(count)
        })?;

        if count > 0 {
            self.invalidate_account_caches(user_id);
        }
        Ok(count)
    }

    /// Runs [`Engine::run_auto_debit`] for every user with pending auto-debit
    /// rows. A failing user is logged and skipped.
    pub async fn run_auto_debit_sweep(&self) -> ResultEngine<usize> {
        let users: BTreeSet<String> = transactions::Entity::find()
            .filter(transactions::Column::AutoDebit.eq(true))
            .filter(transactions::Column::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
            .all(&self.database)
            .await?
            .into_iter()
            .map(|model| model.user_id)
            .collect();

        let mut total = 0;
        for user_id in &users {
            match self.run_auto_debit(user_id).await {
                Ok(count) => total += count,
                Err(err) => tracing::error!(user_id, "auto-debit failed: {err}"),
            }
        }
        tracing::info!(users = users.len(), settled = total, "auto-debit sweep done");
        Ok(total)
    }
}

/// The row `old` becomes once `patch` is applied.
fn apply_patch(
    old: &Transaction,
    patch: &TransactionPatch,
    day_delta: Option<TimeDelta>,
    category: Option<&Category>,
) -> ResultEngine<Transaction> {
    let mut tx = old.clone();

    if let Some(delta) = day_delta {
        tx.date = old.date + delta;
        tx.due_date = old.due_date.map(|due| due + delta);
    }
    if let Some(kind) = patch.kind {
        tx.kind = kind;
    }
    if let Some(amount) = patch.amount {
        tx.amount = amount;
    }
    if let Some(category) = category {
        tx.category_id = Some(category.id);
        tx.category_name = Some(category.name.clone());
    }
    if let Some(description) = &patch.description {
        let description = description.trim();
        tx.description = match (old.installment_number, old.installment_total) {
            (Some(number), Some(total)) => format!("{description} ({number}/{total})"),
            _ => description.to_string(),
        };
    }
    if let Some(method) = &patch.payment_method {
        tx.payment_method = normalize_optional_text(Some(method));
    }
    if let Some(km) = patch.km {
        tx.km = Some(km);
    }
    if let Some(notes) = &patch.notes {
        tx.notes = normalize_optional_text(Some(notes));
    }
    if let Some(from) = patch.from_account_id {
        tx.from_account_id = Some(from);
    }
    if let Some(to) = patch.to_account_id {
        tx.to_account_id = Some(to);
    }
    if let Some(auto_debit) = patch.auto_debit {
        tx.auto_debit = auto_debit;
    }
    if let Some(card_id) = patch.card_id {
        if card_id.is_some() && tx.kind != TransactionKind::Expense {
            return Err(EngineError::InvalidInput(
                "only expenses can be charged on a card".to_string(),
            ));
        }
        tx.card_id = card_id;
    }

    match tx.kind {
        TransactionKind::Income => {
            tx.from_account_id = None;
            tx.card_id = None;
        }
        TransactionKind::Expense => tx.to_account_id = None,
        TransactionKind::Transfer => {
            tx.card_id = None;
        }
    }
    if tx.kind != TransactionKind::Transfer && tx.category_id.is_none() {
        return Err(EngineError::InvalidInput("category is required".to_string()));
    }

    let was_card = old.is_card_expense();
    let is_card = tx.is_card_expense();
    if patch.paid.is_some() && (was_card || is_card) {
        return Err(EngineError::CardTransactionPayment);
    }
    if was_card != is_card {
        unsettle(&mut tx);
    }
    if is_card {
        shape_card_expense(&mut tx);
    } else if let Some(paid) = patch.paid {
        if paid {
            let date = tx.payment_date.unwrap_or(tx.date);
            settle(&mut tx, date);
        } else {
            unsettle(&mut tx);
        }
    }

    validate_shape(&tx)?;
    tx.updated_at = Utc::now();
    Ok(tx)
}

use chrono::{Datelike, Utc};
use sea_orm::{ConnectionTrait, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, InstallmentGroup, MoneyCents, OPEN_ENDED_COUNT, ReconciliationStatus,
    RecurrenceType, ResultEngine, Transaction, TransactionKind, add_months_on_day,
    installment_groups, transactions,
};

use super::super::{
    Engine, accounts::require_account, cards::require_card, categories::find_visible_category,
    normalize_optional_text, reserves::touches_reserve, with_tx,
};
use super::{
    CreatedInstallments, CreatedTransaction, NewTransaction, UsageDeltas, settle,
    shape_card_expense, unsettle, validate_shape,
};

/// Rows generated up front for an open-ended recurrence.
const OPEN_ENDED_BATCH: u32 = 12;
const MONTHLY: &str = "MONTHLY";

impl Engine {
    /// Records a single ledger row.
    ///
    /// A card expense stays pending and is charged on the card's used limit.
    /// Any other row is paid when `paid` says so, or when it is not dated in
    /// the future.
    pub async fn create_transaction(
        &self,
        user_id: &str,
        new: NewTransaction,
    ) -> ResultEngine<CreatedTransaction> {
        let today = self.today(user_id).await?;
        let config = self.config(user_id).await?;

        let tx = with_tx!(self, |db_tx| {
            let mut tx = prepare_row(&db_tx, user_id, &new).await?;
            if !tx.is_card_expense() {
                if new.paid.unwrap_or(tx.date <= today) {
                    let date = tx.date;
                    settle(&mut tx, date);
                } else {
                    unsettle(&mut tx);
                }
            }
            transactions::ActiveModel::from(&tx).insert(&db_tx).await?;

            let mut deltas = UsageDeltas::default();
            deltas.add(tx.card_usage());
            self.apply_card_usage(&db_tx, user_id, &deltas).await?;

            if touches_reserve(&tx, &config) {
                self.rebuild_reserves(&db_tx, user_id, today).await?;
            }
            Ok::<_, EngineError>(tx)
        })?;

        if tx.card_id.is_some() {
            self.invalidate_card_caches(user_id);
        }
        self.invalidate_account_caches(user_id);
        tracing::debug!(user_id, id = %tx.id, kind = tx.kind.as_str(), "transaction created");
        Ok(CreatedTransaction { id: tx.id })
    }

    /// Expands one purchase into an installment plan (`count > 1`) or an
    /// open-ended monthly recurrence (`count == -1`).
    ///
    /// Finite plans split `amount` into `count` parts, the last one taking
    /// the remainder. Open-ended plans repeat the full amount for the first
    /// twelve months. Only the first row can start paid.
    pub async fn create_installments(
        &self,
        user_id: &str,
        new: NewTransaction,
        count: i32,
    ) -> ResultEngine<CreatedInstallments> {
        let open_ended = count == OPEN_ENDED_COUNT;
        if !open_ended && count < 2 {
            return Err(EngineError::InvalidInput(format!(
                "invalid installment count: {count}"
            )));
        }
        if open_ended && new.is_card_expense() {
            return Err(EngineError::CardOpenEndedRecurrence);
        }

        let today = self.today(user_id).await?;
        let config = self.config(user_id).await?;
        let rate = new.interest_rate.filter(|r| *r > 0.0 && !open_ended);

        let rows_count = if open_ended {
            OPEN_ENDED_BATCH
        } else {
            count as u32
        };
        let parts = if open_ended {
            vec![new.amount; rows_count as usize]
        } else {
            new.amount.split(rows_count)
        };
        let installment_amount = parts.first().copied().unwrap_or(MoneyCents::ZERO);

        let (group_id, ids) = with_tx!(self, |db_tx| {
            let base = prepare_row(&db_tx, user_id, &new).await?;
            let group_id = Uuid::new_v4();
            let due_day = base.date.day();
            let first_paid = !base.is_card_expense() && new.paid.unwrap_or(true);

            let mut rows = Vec::with_capacity(parts.len());
            for (index, part) in parts.iter().enumerate() {
                let offset = index as u32;
                let mut row = base.clone();
                row.id = Uuid::new_v4();
                row.date = add_months_on_day(base.date, offset, due_day);
                row.due_date = Some(row.date);
                row.group_id = Some(group_id);
                let interest = match rate {
                    Some(rate) if index > 0 => part.scaled(rate / 100.0 * f64::from(offset)),
                    _ => MoneyCents::ZERO,
                };
                row.original_amount = Some(*part);
                row.interest_amount = interest;
                row.amount = *part + interest;
                if open_ended {
                    row.recurrence = RecurrenceType::Fixed;
                } else {
                    row.recurrence = RecurrenceType::Installment;
                    row.installment_number = Some(index as i32 + 1);
                    row.installment_total = Some(count);
                    row.description = format!("{} ({}/{})", base.description, index + 1, count);
                }
                if row.is_card_expense() {
                    shape_card_expense(&mut row);
                } else if index == 0 && first_paid {
                    let date = row.date;
                    settle(&mut row, date);
                } else {
                    unsettle(&mut row);
                }
                rows.push(row);
            }

            let now = Utc::now();
            let group = InstallmentGroup {
                id: group_id,
                user_id: user_id.to_string(),
                kind: base.kind,
                frequency: MONTHLY.to_string(),
                due_day,
                total_amount: new.amount,
                installment_count: if open_ended { OPEN_ENDED_COUNT } else { count },
                paid_count: i32::from(first_paid),
                canceled_count: 0,
                allow_individual_edit: true,
                interest_enabled: rate.is_some(),
                interest_rate: rate.unwrap_or(0.0),
                notes: base.notes.clone(),
                created_at: now,
                updated_at: now,
            };
            installment_groups::ActiveModel::from(&group)
                .insert(&db_tx)
                .await?;

            let mut deltas = UsageDeltas::default();
            let mut recalc = false;
            for row in &rows {
                transactions::ActiveModel::from(row).insert(&db_tx).await?;
                deltas.add(row.card_usage());
                recalc |= touches_reserve(row, &config);
            }
            self.apply_card_usage(&db_tx, user_id, &deltas).await?;
            if recalc {
                self.rebuild_reserves(&db_tx, user_id, today).await?;
            }
            let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
            Ok::<_, EngineError>((group_id, ids))
        })?;

        self.invalidate_card_caches(user_id);
        self.invalidate_account_caches(user_id);
        tracing::debug!(user_id, %group_id, rows = ids.len(), "installment plan created");
        Ok(CreatedInstallments {
            ids,
            installment_count: if open_ended { OPEN_ENDED_COUNT } else { count },
            group_id,
            installment_amount,
        })
    }
}

/// Validates `new` and builds the pending row it describes.
///
/// Checks run in order: amount, transfer accounts, category, card.
async fn prepare_row<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    new: &NewTransaction,
) -> ResultEngine<Transaction> {
    let card_id = new
        .card_id
        .filter(|_| new.kind == TransactionKind::Expense);
    if new.card_id.is_some() && card_id.is_none() {
        return Err(EngineError::InvalidInput(
            "only expenses can be charged on a card".to_string(),
        ));
    }

    let now = Utc::now();
    let mut tx = Transaction {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        date: new.date,
        kind: new.kind,
        category_id: None,
        category_name: None,
        description: new.description.trim().to_string(),
        amount: new.amount,
        payment_method: normalize_optional_text(new.payment_method.as_deref()),
        km: new.km,
        created_at: now,
        updated_at: now,
        group_id: None,
        installment_number: None,
        installment_total: None,
        recurrence: RecurrenceType::Single,
        payment_status: None,
        due_date: Some(new.date),
        original_amount: Some(new.amount),
        interest_amount: MoneyCents::ZERO,
        discount_amount: MoneyCents::ZERO,
        payment_date: None,
        reconciliation: ReconciliationStatus::Pending,
        reconciliation_date: None,
        notes: normalize_optional_text(new.notes.as_deref()),
        from_account_id: new.from_account_id,
        to_account_id: new.to_account_id,
        auto_debit: new.auto_debit,
        card_id,
        bill_payment_id: None,
    };
    match tx.kind {
        TransactionKind::Income => tx.from_account_id = None,
        TransactionKind::Expense => tx.to_account_id = None,
        TransactionKind::Transfer => {}
    }
    validate_shape(&tx)?;

    if tx.kind != TransactionKind::Transfer && new.category_id.is_none() {
        return Err(EngineError::InvalidInput("category is required".to_string()));
    }
    if let Some(category_id) = new.category_id {
        let category = find_visible_category(db, user_id, category_id).await?;
        tx.category_id = Some(category.id);
        tx.category_name = Some(category.name);
    }
    if let Some(card_id) = tx.card_id {
        require_card(db, user_id, card_id).await?;
        shape_card_expense(&mut tx);
    }
    for account_id in [tx.from_account_id, tx.to_account_id].into_iter().flatten() {
        require_account(db, user_id, account_id).await?;
    }
    Ok(tx)
}

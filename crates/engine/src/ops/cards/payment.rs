use chrono::{NaiveDate, Utc};
use sea_orm::{ConnectionTrait, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Account, Bill, BillPeriod, BillStatus, Card, EngineError, MoneyCents, MonthKey,
    RecurrenceType, ResultEngine, Transaction, TransactionKind, bills, transactions,
};

use super::super::{
    Engine,
    accounts::require_account,
    categories::settlement_category,
    transactions::{UsageDeltas, settle},
    with_tx,
};
use super::{
    require_card,
    statements::{BillSummary, CardLedger, card_bills, find_bill, statement, statement_value},
};

const SETTLEMENT_PAYMENT_METHOD: &str = "Pagamento Fatura";

/// Outcome of [`Engine::pay_bill`]. `payment_tx_id` is `None` and
/// `bills_paid` empty when nothing was left to pay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillPayment {
    /// The target bill after the payment.
    pub bill: BillSummary,
    pub payment_tx_id: Option<Uuid>,
    pub total_paid: MoneyCents,
    /// Every bill the payment settled, oldest first.
    pub bills_paid: Vec<Uuid>,
}

/// Outcome of [`Engine::pay_current_bill_balance`]. Ids are `None` when the
/// statement had nothing left to pay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentBillPayment {
    pub bill_id: Option<Uuid>,
    pub payment_tx_id: Option<Uuid>,
    pub paid: MoneyCents,
    pub remaining: MoneyCents,
    pub status: BillStatus,
}

async fn payment_account<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    account_id: Uuid,
) -> ResultEngine<Account> {
    let account = require_account(db, user_id, account_id).await?;
    if !account.active {
        return Err(EngineError::InvalidInput(format!(
            "account \"{}\" is inactive",
            account.name
        )));
    }
    Ok(account)
}

/// Inserts the expense that settles `bill`: paid and reconciled, debited
/// from `account`, tagged with the card and the bill.
async fn insert_settlement<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    card: &Card,
    bill: &Bill,
    account: &Account,
    amount: MoneyCents,
    payment_date: NaiveDate,
) -> ResultEngine<Transaction> {
    let category = settlement_category(db, user_id)
        .await?
        .ok_or_else(|| EngineError::SettlementFailed("no expense category".to_string()))?;
    let reference = bill.period.reference;
    let now = Utc::now();
    let mut tx = Transaction {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        date: payment_date,
        kind: TransactionKind::Expense,
        category_id: Some(category.id),
        category_name: Some(category.name),
        description: format!(
            "Pagamento fatura - {} ({:02}/{})",
            card.name,
            reference.month(),
            reference.year()
        ),
        amount,
        payment_method: Some(SETTLEMENT_PAYMENT_METHOD.to_string()),
        km: None,
        created_at: now,
        updated_at: now,
        group_id: None,
        installment_number: None,
        installment_total: None,
        recurrence: RecurrenceType::Single,
        payment_status: None,
        due_date: Some(bill.period.due_date),
        original_amount: None,
        interest_amount: MoneyCents::ZERO,
        discount_amount: MoneyCents::ZERO,
        payment_date: None,
        reconciliation: Default::default(),
        reconciliation_date: None,
        notes: None,
        from_account_id: Some(account.id),
        to_account_id: None,
        auto_debit: false,
        card_id: Some(card.id),
        bill_payment_id: Some(bill.id),
    };
    settle(&mut tx, payment_date);
    transactions::ActiveModel::from(&tx).insert(db).await?;
    Ok(tx)
}

async fn store_bill_status<C: ConnectionTrait>(
    db: &C,
    bill: &Bill,
    status: BillStatus,
    payment_date: NaiveDate,
) -> ResultEngine<()> {
    let mut bill = bill.clone();
    bill.status = status;
    bill.payment_date = Some(payment_date);
    bill.version += 1;
    bill.updated_at = Utc::now();
    bills::ActiveModel::from(&bill).update(db).await?;
    Ok(())
}

impl Engine {
    /// Pays a bill together with every older bill of the same card that still
    /// has a balance, as one settlement expense tagged with the target bill.
    pub async fn pay_bill(
        &self,
        user_id: &str,
        bill_id: Uuid,
        payment_date: NaiveDate,
        account_id: Uuid,
    ) -> ResultEngine<BillPayment> {
        let today = self.today(user_id).await?;
        let _guard = self.lock_cards().await?;
        let payment = with_tx!(self, |db_tx| {
            let target = find_bill(&db_tx, user_id, bill_id).await?;
            let card = require_card(&db_tx, user_id, target.card_id).await?;
            let account = payment_account(&db_tx, user_id, account_id).await?;
            let ledger = CardLedger::load(&db_tx, user_id, card.id).await?;

            let outstanding: Vec<(Bill, MoneyCents)> = card_bills(&db_tx, user_id, card.id)
                .await?
                .into_iter()
                .filter(|bill| bill.period.reference <= target.period.reference)
                .map(|bill| {
                    let remaining = ledger.bill_value(&bill).remaining;
                    (bill, remaining)
                })
                .filter(|(_, remaining)| remaining.is_positive())
                .collect();
            let total: MoneyCents = outstanding.iter().map(|(_, remaining)| *remaining).sum();
            if !total.is_positive() {
                return Ok(BillPayment {
                    bill: BillSummary::of(&target, &ledger),
                    payment_tx_id: None,
                    total_paid: MoneyCents::ZERO,
                    bills_paid: Vec::new(),
                });
            }

            let settlement =
                insert_settlement(&db_tx, user_id, &card, &target, &account, total, payment_date)
                    .await?;
            let mut deltas = UsageDeltas::default();
            deltas.add(Some((card.id, -total)));
            self.apply_card_usage(&db_tx, user_id, &deltas).await?;

            for (bill, _) in &outstanding {
                store_bill_status(&db_tx, bill, BillStatus::Paid, payment_date).await?;
            }
            self.rebuild_reserves(&db_tx, user_id, today).await?;

            let stored = find_bill(&db_tx, user_id, bill_id).await?;
            let ledger = CardLedger::load(&db_tx, user_id, card.id).await?;
            Ok::<_, EngineError>(BillPayment {
                bill: BillSummary::of(&stored, &ledger),
                payment_tx_id: Some(settlement.id),
                total_paid: total,
                bills_paid: outstanding.iter().map(|(bill, _)| bill.id).collect(),
            })
        })?;

        self.invalidate_card_caches(user_id);
        self.invalidate_account_caches(user_id);
        tracing::info!(
            user_id,
            %bill_id,
            total = %payment.total_paid,
            bills = payment.bills_paid.len(),
            "bill paid"
        );
        Ok(payment)
    }

    /// Pays `amount` (default: everything left) of the statement of
    /// `reference`, creating its bill row first when needed.
    pub async fn pay_current_bill_balance(
        &self,
        user_id: &str,
        card_id: Uuid,
        payment_date: NaiveDate,
        account_id: Uuid,
        reference: MonthKey,
        amount: Option<MoneyCents>,
    ) -> ResultEngine<CurrentBillPayment> {
        let today = self.today(user_id).await?;
        let _guard = self.lock_cards().await?;
        let payment = with_tx!(self, |db_tx| {
            let card = require_card(&db_tx, user_id, card_id).await?;
            let account = payment_account(&db_tx, user_id, account_id).await?;
            let ledger = CardLedger::load(&db_tx, user_id, card.id).await?;
            let bills = card_bills(&db_tx, user_id, card.id).await?;
            let (stored, period) = statement(&card, &bills, reference);
            let open_today = reference == BillPeriod::current_reference(card.closing_day, today);
            let value = statement_value(&card, &ledger, stored, &period, open_today);

            if !value.remaining.is_positive() {
                return Ok(CurrentBillPayment {
                    bill_id: stored.map(|bill| bill.id),
                    payment_tx_id: None,
                    paid: value.paid,
                    remaining: MoneyCents::ZERO,
                    status: BillStatus::Paid,
                });
            }
            let amount = amount.unwrap_or(value.remaining);
            if !amount.is_positive() {
                return Err(EngineError::InvalidAmount(
                    "amount must be greater than zero".to_string(),
                ));
            }
            if amount > value.remaining {
                return Err(EngineError::InvalidAmount(format!(
                    "amount exceeds the outstanding {}",
                    value.remaining
                )));
            }

            let bill = match stored {
                Some(bill) => bill.clone(),
                None => {
                    let now = Utc::now();
                    let bill = Bill {
                        id: Uuid::new_v4(),
                        user_id: user_id.to_string(),
                        card_id,
                        period,
                        amount: value.total,
                        status: BillStatus::Open,
                        payment_date: None,
                        created_at: now,
                        updated_at: now,
                        version: 1,
                    };
                    bills::ActiveModel::from(&bill).insert(&db_tx).await?;
                    bill
                }
            };

            let settlement =
                insert_settlement(&db_tx, user_id, &card, &bill, &account, amount, payment_date)
                    .await?;
            let mut deltas = UsageDeltas::default();
            deltas.add(Some((card.id, -amount)));
            self.apply_card_usage(&db_tx, user_id, &deltas).await?;

            let paid = value.paid + amount;
            let remaining = (value.total - paid).non_negative();
            let status = BillStatus::derive(remaining, paid);
            store_bill_status(&db_tx, &bill, status, payment_date).await?;
            self.rebuild_reserves(&db_tx, user_id, today).await?;

            Ok::<_, EngineError>(CurrentBillPayment {
                bill_id: Some(bill.id),
                payment_tx_id: Some(settlement.id),
                paid,
                remaining,
                status,
            })
        })?;

        self.invalidate_card_caches(user_id);
        self.invalidate_account_caches(user_id);
        tracing::info!(
            user_id,
            %card_id,
            %reference,
            paid = %payment.paid,
            remaining = %payment.remaining,
            "statement payment registered"
        );
        Ok(payment)
    }
}

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Bill, BillPeriod, BillStatus, BillValue, Card, EngineError, MoneyCents, MonthKey,
    ResultEngine, Transaction, bills, transactions,
};

use super::super::{Engine, with_tx};
use super::{require_card, user_cards};

/// Valued view of one statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSummary {
    /// `None` for a statement that has no bill row yet.
    pub id: Option<Uuid>,
    pub card_id: Uuid,
    pub period: BillPeriod,
    pub snapshot: MoneyCents,
    pub value: BillValue,
    pub payment_date: Option<NaiveDate>,
    /// What is left on this statement and every older one of the card.
    pub accumulated_open: MoneyCents,
}

impl BillSummary {
    /// Summary of `bill` alone; `accumulated_open` only counts this bill.
    pub(super) fn of(bill: &Bill, ledger: &CardLedger) -> Self {
        let value = ledger.bill_value(bill);
        Self {
            id: Some(bill.id),
            card_id: bill.card_id,
            period: bill.period,
            snapshot: bill.amount,
            accumulated_open: value.remaining,
            value,
            payment_date: bill.payment_date,
        }
    }

    /// Summaries of `bills` (oldest first) with the running open balance.
    pub(super) fn running(bills: &[Bill], ledger: &CardLedger) -> Vec<Self> {
        let mut open = MoneyCents::ZERO;
        bills
            .iter()
            .map(|bill| {
                let mut summary = Self::of(bill, ledger);
                open += summary.value.remaining;
                summary.accumulated_open = open;
                summary
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardBillsForMonth {
    pub card_id: Uuid,
    pub card_name: String,
    pub bill_id: Option<Uuid>,
    pub period: BillPeriod,
    pub value: BillValue,
}

/// Card charges and bill settlements of one card, used to value its bills.
#[derive(Debug, Default)]
pub(crate) struct CardLedger {
    charges: Vec<(NaiveDate, MoneyCents)>,
    payments: HashMap<Uuid, MoneyCents>,
}

impl CardLedger {
    pub(crate) fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut ledger = Self::default();
        for tx in rows.into_iter().filter(|tx| !tx.is_canceled()) {
            match tx.bill_payment_id {
                Some(bill_id) => *ledger.payments.entry(bill_id).or_default() += tx.amount,
                None if tx.is_card_expense() => ledger.charges.push((tx.date, tx.amount)),
                None => {}
            }
        }
        ledger
    }

    pub(crate) async fn load<C: ConnectionTrait>(
        db: &C,
        user_id: &str,
        card_id: Uuid,
    ) -> ResultEngine<Self> {
        let rows: Vec<Transaction> = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .filter(transactions::Column::CardId.eq(card_id))
            .all(db)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<_>>()?;
        Ok(Self::from_rows(&rows))
    }

    /// Card expenses dated inside `period`.
    pub(crate) fn charged(&self, period: &BillPeriod) -> MoneyCents {
        self.charges
            .iter()
            .filter(|(date, _)| period.contains(*date))
            .map(|(_, amount)| *amount)
            .sum()
    }

    /// Settlement rows that name `bill_id` as their target.
    pub(crate) fn paid_for(&self, bill_id: Uuid) -> MoneyCents {
        self.payments.get(&bill_id).copied().unwrap_or_default()
    }

    /// Live value of a stored bill. A bill stored as paid stays settled: a
    /// cumulative payment only references the newest bill it covers.
    pub(crate) fn bill_value(&self, bill: &Bill) -> BillValue {
        let value = BillValue::resolve(
            self.charged(&bill.period),
            bill.amount,
            self.paid_for(bill.id),
        );
        settled_if_stored(value, bill.status)
    }
}

fn settled_if_stored(value: BillValue, stored: BillStatus) -> BillValue {
    if stored != BillStatus::Paid {
        return value;
    }
    BillValue {
        total: value.total,
        paid: value.total,
        remaining: MoneyCents::ZERO,
        status: BillStatus::Paid,
    }
}

/// Bills of one card, oldest reference month first.
pub(crate) async fn card_bills<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    card_id: Uuid,
) -> ResultEngine<Vec<Bill>> {
    bills::Entity::find()
        .filter(bills::Column::UserId.eq(user_id))
        .filter(bills::Column::CardId.eq(card_id))
        .order_by_asc(bills::Column::ReferenceYear)
        .order_by_asc(bills::Column::ReferenceMonth)
        .all(db)
        .await?
        .into_iter()
        .map(Bill::try_from)
        .collect()
}

pub(super) async fn find_bill<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    bill_id: Uuid,
) -> ResultEngine<Bill> {
    let model = bills::Entity::find_by_id(bill_id)
        .filter(bills::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("bill {bill_id}")))?;
    Bill::try_from(model)
}

/// Statement of `reference`: the stored bill when there is one, otherwise a
/// synthesized period with no row behind it.
pub(super) fn statement<'a>(
    card: &Card,
    bills: &'a [Bill],
    reference: MonthKey,
) -> (Option<&'a Bill>, BillPeriod) {
    let stored = bills.iter().find(|bill| bill.period.reference == reference);
    let period = stored.map_or_else(
        || BillPeriod::for_month(card.closing_day, card.due_day, reference),
        |bill| bill.period,
    );
    (stored, period)
}

/// Value of `reference`. For the statement open today with no ledger charges
/// the card's used limit is what is left to pay.
pub(super) fn statement_value(
    card: &Card,
    ledger: &CardLedger,
    stored: Option<&Bill>,
    period: &BillPeriod,
    open_today: bool,
) -> BillValue {
    let live = ledger.charged(period);
    let snapshot = stored.map(|bill| bill.amount).unwrap_or_default();
    let paid = stored
        .map(|bill| ledger.paid_for(bill.id))
        .unwrap_or_default();
    let value = if open_today && live.is_zero() && card.used_limit.is_positive() {
        tracing::warn!(
            card_id = %card.id,
            used = %card.used_limit,
            "no charges in the open statement, using the card's used limit"
        );
        // Payments already lowered the used limit.
        BillValue::outstanding(card.used_limit, paid)
    } else {
        BillValue::resolve(live, snapshot, paid)
    };
    match stored {
        Some(bill) => settled_if_stored(value, bill.status),
        None => value,
    }
}

pub(super) fn current_bill(
    card: &Card,
    ledger: &CardLedger,
    bills: &[Bill],
    today: NaiveDate,
) -> BillSummary {
    let reference = BillPeriod::current_reference(card.closing_day, today);
    let (stored, period) = statement(card, bills, reference);
    let value = statement_value(card, ledger, stored, &period, true);
    let older: MoneyCents = bills
        .iter()
        .filter(|bill| bill.period.reference < reference)
        .map(|bill| ledger.bill_value(bill).remaining)
        .sum();
    BillSummary {
        id: stored.map(|bill| bill.id),
        card_id: card.id,
        period,
        snapshot: stored.map(|bill| bill.amount).unwrap_or_default(),
        accumulated_open: older + value.remaining,
        value,
        payment_date: stored.and_then(|bill| bill.payment_date),
    }
}

impl Engine {
    /// Bill of `card_id` for `reference`, created with a snapshot of the live
    /// value when it does not exist yet.
    pub async fn generate_bill(
        &self,
        user_id: &str,
        card_id: Uuid,
        reference: MonthKey,
    ) -> ResultEngine<Bill> {
        let _guard = self.lock_cards().await?;
        let bill = with_tx!(self, |db_tx| {
            let card = require_card(&db_tx, user_id, card_id).await?;
            let existing = bills::Entity::find()
                .filter(bills::Column::UserId.eq(user_id))
                .filter(bills::Column::CardId.eq(card_id))
                .filter(bills::Column::ReferenceYear.eq(reference.year()))
                .filter(bills::Column::ReferenceMonth.eq(reference.month() as i32))
                .one(&db_tx)
                .await?;
            match existing {
                Some(model) => Bill::try_from(model),
                None => {
                    let ledger = CardLedger::load(&db_tx, user_id, card_id).await?;
                    let period = BillPeriod::for_month(card.closing_day, card.due_day, reference);
                    let now = Utc::now();
                    let bill = Bill {
                        id: Uuid::new_v4(),
                        user_id: user_id.to_string(),
                        card_id,
                        period,
                        amount: ledger.charged(&period),
                        status: BillStatus::Open,
                        payment_date: None,
                        created_at: now,
                        updated_at: now,
                        version: 1,
                    };
                    bills::ActiveModel::from(&bill).insert(&db_tx).await?;
                    tracing::info!(user_id, %card_id, %reference, amount = %bill.amount, "bill generated");
                    Ok(bill)
                }
            }
        })?;
        self.invalidate_card_caches(user_id);
        Ok(bill)
    }

    pub async fn bill(&self, user_id: &str, bill_id: Uuid) -> ResultEngine<BillSummary> {
        let bill = find_bill(&self.database, user_id, bill_id).await?;
        let ledger = CardLedger::load(&self.database, user_id, bill.card_id).await?;
        Ok(BillSummary::of(&bill, &ledger))
    }

    /// Deletes one bill row. Settlement rows keep their amounts.
    pub async fn delete_bill(&self, user_id: &str, bill_id: Uuid) -> ResultEngine<()> {
        let bill = find_bill(&self.database, user_id, bill_id).await?;
        bills::Entity::delete_by_id(bill.id)
            .exec(&self.database)
            .await?;
        self.invalidate_card_caches(user_id);
        Ok(())
    }

    /// Drops the paid bills of a card; returns how many went away.
    pub async fn delete_paid_bills_history(
        &self,
        user_id: &str,
        card_id: Uuid,
    ) -> ResultEngine<u64> {
        require_card(&self.database, user_id, card_id).await?;
        let deleted = bills::Entity::delete_many()
            .filter(bills::Column::UserId.eq(user_id))
            .filter(bills::Column::CardId.eq(card_id))
            .filter(bills::Column::Status.eq(BillStatus::Paid.as_str()))
            .exec(&self.database)
            .await?
            .rows_affected;
        self.invalidate_card_caches(user_id);
        tracing::info!(user_id, %card_id, deleted, "paid bill history removed");
        Ok(deleted)
    }

    /// Statement of every active card for `reference`.
    pub async fn bills_for_month(
        &self,
        user_id: &str,
        reference: MonthKey,
    ) -> ResultEngine<Vec<CardBillsForMonth>> {
        let mut result = Vec::new();
        for card in user_cards(&self.database, user_id)
            .await?
            .into_iter()
            .filter(|card| card.active)
        {
            let ledger = CardLedger::load(&self.database, user_id, card.id).await?;
            let bills = card_bills(&self.database, user_id, card.id).await?;
            let (stored, period) = statement(&card, &bills, reference);
            result.push(CardBillsForMonth {
                card_id: card.id,
                bill_id: stored.map(|bill| bill.id),
                value: statement_value(&card, &ledger, stored, &period, false),
                period,
                card_name: card.name,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bill(reference: MonthKey, snapshot: i64, status: BillStatus) -> Bill {
        let now = Utc::now();
        Bill {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            card_id: Uuid::new_v4(),
            period: BillPeriod::for_month(10, 20, reference),
            amount: MoneyCents::new(snapshot),
            status,
            payment_date: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn charges_are_counted_inside_the_period_only() {
        let march = MonthKey::new(2024, 3).unwrap();
        let stored = bill(march, 0, BillStatus::Open);
        let ledger = CardLedger {
            charges: vec![
                (date(2024, 2, 10), MoneyCents::new(5_00)),
                (date(2024, 2, 11), MoneyCents::new(10_00)),
                (date(2024, 3, 10), MoneyCents::new(20_00)),
                (date(2024, 3, 11), MoneyCents::new(40_00)),
            ],
            payments: HashMap::from([(stored.id, MoneyCents::new(12_00))]),
        };
        let value = ledger.bill_value(&stored);
        assert_eq!(value.total, MoneyCents::new(30_00));
        assert_eq!(value.paid, MoneyCents::new(12_00));
        assert_eq!(value.remaining, MoneyCents::new(18_00));
        assert_eq!(value.status, BillStatus::Partial);
    }

    #[test]
    fn stored_paid_bill_stays_settled() {
        let stored = bill(MonthKey::new(2024, 1).unwrap(), 0, BillStatus::Paid);
        let ledger = CardLedger {
            charges: vec![(date(2024, 1, 2), MoneyCents::new(100_00))],
            payments: HashMap::new(),
        };
        let value = ledger.bill_value(&stored);
        assert_eq!(value.status, BillStatus::Paid);
        assert_eq!(value.remaining, MoneyCents::ZERO);
        assert_eq!(value.paid, MoneyCents::new(100_00));
    }
}

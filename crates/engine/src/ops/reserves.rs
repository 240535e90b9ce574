use std::collections::BTreeMap;

use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    LedgerConfig, MoneyCents, MonthKey, ReserveMonth, ResultEngine, Transaction,
    TransactionKind, reserves, transactions, util::is_maintenance_name,
};

use super::{Engine, accounts::investments_account, with_tx};

/// Whether `tx` is maintenance spending: the configured category, or a
/// category whose name mentions "manutenção".
pub(super) fn is_maintenance(tx: &Transaction, config: &LedgerConfig) -> bool {
    tx.kind == TransactionKind::Expense
        && (config
            .maintenance_category_id
            .is_some_and(|id| tx.category_id == Some(id))
            || is_maintenance_name(tx.category_name.as_deref()))
}

/// Whether creating `tx` changes the reserve timeline.
pub(super) fn touches_reserve(tx: &Transaction, config: &LedgerConfig) -> bool {
    tx.kind == TransactionKind::Transfer || is_maintenance(tx, config)
}

/// Rolls the reserve forward month by month, from the first ledger month
/// through `until`.
///
/// Deposits are transfers into the investments account minus transfers out
/// of it. Usage is maintenance spending plus any expense paid from the
/// investments account.
pub(crate) fn reserve_timeline(
    rows: &[Transaction],
    investments: Option<Uuid>,
    config: &LedgerConfig,
    until: MonthKey,
) -> Vec<ReserveMonth> {
    let mut deposits: BTreeMap<MonthKey, MoneyCents> = BTreeMap::new();
    let mut usage: BTreeMap<MonthKey, MoneyCents> = BTreeMap::new();
    let mut first: Option<MonthKey> = None;

    for tx in rows.iter().filter(|tx| !tx.is_canceled()) {
        let month = MonthKey::of(tx.date);
        first = Some(first.map_or(month, |f| f.min(month)));
        match tx.kind {
            TransactionKind::Transfer => {
                let Some(investments) = investments else {
                    continue;
                };
                if tx.to_account_id == Some(investments) {
                    *deposits.entry(month).or_default() += tx.amount;
                }
                if tx.from_account_id == Some(investments) {
                    *deposits.entry(month).or_default() -= tx.amount;
                }
            }
            TransactionKind::Expense => {
                let from_investments =
                    investments.is_some_and(|id| tx.from_account_id == Some(id));
                if from_investments || is_maintenance(tx, config) {
                    *usage.entry(month).or_default() += tx.amount;
                }
            }
            TransactionKind::Income => {}
        }
    }

    let Some(first) = first else {
        return Vec::new();
    };
    let mut balance = MoneyCents::ZERO;
    first
        .through(until.max(first))
        .into_iter()
        .map(|month| {
            let month_deposits = deposits.get(&month).copied().unwrap_or_default();
            let month_usage = usage.get(&month).copied().unwrap_or_default();
            let accumulated = balance + month_deposits;
            balance = accumulated - month_usage;
            ReserveMonth {
                month,
                deposits: month_deposits,
                accumulated,
                usage: month_usage,
                balance,
            }
        })
        .collect()
}

impl Engine {
    /// Rebuilds the stored reserve table of `user_id` from the whole ledger.
    pub(super) async fn rebuild_reserves<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
        today: NaiveDate,
    ) -> ResultEngine<Vec<ReserveMonth>> {
        let config = self.config_in(db, user_id).await?;
        let investments = investments_account(db, user_id).await?.map(|a| a.id);
        let rows: Vec<Transaction> = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .all(db)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<_>>()?;

        let timeline = reserve_timeline(&rows, investments, &config, MonthKey::of(today));

        reserves::Entity::delete_many()
            .filter(reserves::Column::UserId.eq(user_id))
            .exec(db)
            .await?;
        if !timeline.is_empty() {
            reserves::Entity::insert_many(
                timeline
                    .iter()
                    .map(|row| reserves::ActiveModel::from_month(user_id, row)),
            )
            .exec(db)
            .await?;
        }
        tracing::debug!(user_id, months = timeline.len(), "reserves rebuilt");
        Ok(timeline)
    }

    /// Recomputes and stores the reserve timeline of `user_id`.
    pub async fn recalculate_reserves(&self, user_id: &str) -> ResultEngine<Vec<ReserveMonth>> {
        let today = self.today(user_id).await?;
        let timeline = with_tx!(self, |db_tx| {
            self.rebuild_reserves(&db_tx, user_id, today).await
        })?;
        tracing::info!(user_id, months = timeline.len(), "reserves recalculated");
        Ok(timeline)
    }

    /// Stored reserve timeline, oldest month first.
    pub async fn reserve_timeline(&self, user_id: &str) -> ResultEngine<Vec<ReserveMonth>> {
        reserves::Entity::find()
            .filter(reserves::Column::UserId.eq(user_id))
            .order_by_asc(reserves::Column::Month)
            .all(&self.database)
            .await?
            .into_iter()
            .map(ReserveMonth::try_from)
            .collect()
    }

    /// Stored snapshot of `month`, zeros when the month has none.
    pub async fn reserve_for_month(
        &self,
        user_id: &str,
        month: MonthKey,
    ) -> ResultEngine<ReserveMonth> {
        let model = reserves::Entity::find_by_id((user_id.to_string(), month.to_string()))
            .one(&self.database)
            .await?;
        match model {
            Some(model) => ReserveMonth::try_from(model),
            None => Ok(ReserveMonth::empty(month)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{PaymentStatus, ReconciliationStatus, RecurrenceType};

    fn row(
        kind: TransactionKind,
        date: (i32, u32, u32),
        cents: i64,
        from: Option<Uuid>,
        to: Option<Uuid>,
    ) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            kind,
            category_id: None,
            category_name: None,
            description: String::new(),
            amount: MoneyCents::new(cents),
            payment_method: None,
            km: None,
            created_at: now,
            updated_at: now,
            group_id: None,
            installment_number: None,
            installment_total: None,
            recurrence: RecurrenceType::Single,
            payment_status: None,
            due_date: None,
            original_amount: None,
            interest_amount: MoneyCents::ZERO,
            discount_amount: MoneyCents::ZERO,
            payment_date: None,
            reconciliation: ReconciliationStatus::Pending,
            reconciliation_date: None,
            notes: None,
            from_account_id: from,
            to_account_id: to,
            auto_debit: false,
            card_id: None,
            bill_payment_id: None,
        }
    }

    fn month(y: i32, m: u32) -> MonthKey {
        MonthKey::new(y, m).unwrap()
    }

    #[test]
    fn deposits_roll_forward() {
        let wallet = Some(Uuid::new_v4());
        let investments = Uuid::new_v4();
        let rows = vec![
            row(TransactionKind::Transfer, (2025, 1, 5), 100_00, wallet, Some(investments)),
            row(TransactionKind::Transfer, (2025, 2, 5), 100_00, wallet, Some(investments)),
            row(TransactionKind::Transfer, (2025, 3, 5), 50_00, Some(investments), wallet),
        ];
        let timeline = reserve_timeline(
            &rows,
            Some(investments),
            &LedgerConfig::default(),
            month(2025, 3),
        );
        let balances: Vec<i64> = timeline.iter().map(|r| r.balance.cents()).collect();
        assert_eq!(balances, vec![100_00, 200_00, 150_00]);
    }

    #[test]
    fn gap_months_and_maintenance_usage() {
        let investments = Uuid::new_v4();
        let mut repair = row(TransactionKind::Expense, (2025, 3, 1), 30_00, None, None);
        repair.category_name = Some("Manutenção".to_string());
        repair.payment_status = Some(PaymentStatus::Paid);
        let mut canceled = repair.clone();
        canceled.payment_status = Some(PaymentStatus::Canceled);
        let rows = vec![
            row(TransactionKind::Transfer, (2025, 1, 5), 100_00, None, Some(investments)),
            repair,
            canceled,
        ];
        let timeline = reserve_timeline(
            &rows,
            Some(investments),
            &LedgerConfig::default(),
            month(2025, 4),
        );
        assert_eq!(timeline.len(), 4);
        assert_eq!(timeline[1].deposits, MoneyCents::ZERO);
        assert_eq!(timeline[1].balance, MoneyCents::new(100_00));
        assert_eq!(timeline[2].usage, MoneyCents::new(30_00));
        assert_eq!(timeline[2].accumulated, MoneyCents::new(100_00));
        assert_eq!(timeline[3].balance, MoneyCents::new(70_00));
    }

    #[test]
    fn configured_category_counts_as_maintenance() {
        let category = Uuid::new_v4();
        let config = LedgerConfig {
            maintenance_category_id: Some(category),
            ..LedgerConfig::default()
        };
        let mut tx = row(TransactionKind::Expense, (2025, 1, 1), 10_00, None, None);
        tx.category_id = Some(category);
        tx.category_name = Some("Oficina".to_string());
        assert!(is_maintenance(&tx, &config));
        assert!(touches_reserve(&tx, &config));
        assert!(!is_maintenance(&tx, &LedgerConfig::default()));
    }
}

//! Read-only aggregates over one or more months of the ledger.

use std::collections::HashMap;

use sea_orm::{QueryFilter, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    LedgerConfig, MoneyCents, MonthKey, ReserveMonth, ResultEngine, Transaction, TransactionKind,
    transactions, util::fold_name,
};

use super::{
    Engine,
    accounts::{investments_account, replay_balance, wallet_account},
    cards::CardKpis,
    reserves::is_maintenance,
    with_tx,
};

const UNCATEGORIZED: &str = "Sem categoria";
const FUEL_CATEGORY: &str = "combustivel";
const FOOD_CATEGORY: &str = "alimentacao";
const FIXED_CATEGORIES: [&str; 2] = ["despesa fixa", "despesas fixas"];
const REPORT_MONTHS: u32 = 12;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub name: String,
    pub total: MoneyCents,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub month: MonthKey,
    pub income: MoneyCents,
    pub expense: MoneyCents,
    /// Wallet to investments transfers of the month.
    pub transfers_to_reserve: MoneyCents,
    /// `income - expense - transfers_to_reserve`.
    pub profit: MoneyCents,
    /// Expense by category, largest first.
    pub by_category: Vec<CategoryTotal>,
    pub fuel: MoneyCents,
    pub food: MoneyCents,
    pub fixed: MoneyCents,
    pub maintenance: MoneyCents,
    pub reserve: ReserveMonth,
    pub cards: CardKpis,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthReport {
    pub month: MonthKey,
    pub income: MoneyCents,
    pub expense: MoneyCents,
    pub profit: MoneyCents,
    pub fuel: MoneyCents,
    pub maintenance: MoneyCents,
    /// Investments account balance at the end of the month.
    pub reserve_balance: MoneyCents,
}

/// Income and expense of one month. Canceled rows and bill settlements are
/// left out, the latter being already counted as card expenses.
#[derive(Debug, Default)]
struct MonthTotals {
    income: MoneyCents,
    expense: MoneyCents,
    fuel: MoneyCents,
    food: MoneyCents,
    fixed: MoneyCents,
    maintenance: MoneyCents,
    by_category: HashMap<String, MoneyCents>,
}

impl MonthTotals {
    fn of<'a>(rows: impl IntoIterator<Item = &'a Transaction>, config: &LedgerConfig) -> Self {
        let mut totals = Self::default();
        for tx in rows
            .into_iter()
            .filter(|tx| !tx.is_canceled() && tx.bill_payment_id.is_none())
        {
            match tx.kind {
                TransactionKind::Income => totals.income += tx.amount,
                TransactionKind::Expense => {
                    totals.expense += tx.amount;
                    let name = tx
                        .category_name
                        .as_deref()
                        .filter(|name| !name.trim().is_empty())
                        .unwrap_or(UNCATEGORIZED);
                    *totals.by_category.entry(name.to_string()).or_default() += tx.amount;
                    let folded = fold_name(name);
                    if folded == FUEL_CATEGORY {
                        totals.fuel += tx.amount;
                    } else if folded == FOOD_CATEGORY {
                        totals.food += tx.amount;
                    } else if FIXED_CATEGORIES.contains(&folded.as_str()) {
                        totals.fixed += tx.amount;
                    }
                    if is_maintenance(tx, config) {
                        totals.maintenance += tx.amount;
                    }
                }
                TransactionKind::Transfer => {}
            }
        }
        totals
    }

    fn sorted_categories(&self) -> Vec<CategoryTotal> {
        let mut list: Vec<CategoryTotal> = self
            .by_category
            .iter()
            .map(|(name, total)| CategoryTotal {
                name: name.clone(),
                total: *total,
            })
            .collect();
        list.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
        list
    }
}

fn transfers_between(
    rows: &[Transaction],
    from: Option<Uuid>,
    to: Option<Uuid>,
) -> MoneyCents {
    let (Some(from), Some(to)) = (from, to) else {
        return MoneyCents::ZERO;
    };
    rows.iter()
        .filter(|tx| {
            tx.kind == TransactionKind::Transfer
                && !tx.is_canceled()
                && tx.from_account_id == Some(from)
                && tx.to_account_id == Some(to)
        })
        .map(|tx| tx.amount)
        .sum()
}

impl Engine {
    async fn month_rows(&self, user_id: &str, month: MonthKey) -> ResultEngine<Vec<Transaction>> {
        transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .filter(transactions::Column::Date.gte(month.first_day()))
            .filter(transactions::Column::Date.lte(month.last_day()))
            .all(&self.database)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    /// Month overview. Recalculates the reserve before reading it.
    pub async fn dashboard(&self, user_id: &str, month: MonthKey) -> ResultEngine<Dashboard> {
        let today = self.today(user_id).await?;
        let config = self.config(user_id).await?;
        let timeline = with_tx!(self, |db_tx| {
            self.rebuild_reserves(&db_tx, user_id, today).await
        })?;
        let reserve = timeline
            .into_iter()
            .find(|row| row.month == month)
            .unwrap_or_else(|| ReserveMonth::empty(month));

        let rows = self.month_rows(user_id, month).await?;
        let totals = MonthTotals::of(&rows, &config);
        let wallet = wallet_account(&self.database, user_id).await?.map(|a| a.id);
        let investments = investments_account(&self.database, user_id)
            .await?
            .map(|a| a.id);
        let transfers_to_reserve = transfers_between(&rows, wallet, investments);
        let cards = self.card_kpis(&self.database, user_id).await?;

        tracing::debug!(user_id, %month, rows = rows.len(), "dashboard computed");
        Ok(Dashboard {
            month,
            income: totals.income,
            expense: totals.expense,
            transfers_to_reserve,
            profit: totals.income - totals.expense - transfers_to_reserve,
            by_category: totals.sorted_categories(),
            fuel: totals.fuel,
            food: totals.food,
            fixed: totals.fixed,
            maintenance: totals.maintenance,
            reserve,
            cards,
        })
    }

    /// Trailing twelve months, oldest first, ending with the current one.
    pub async fn report_12_months(&self, user_id: &str) -> ResultEngine<Vec<MonthReport>> {
        let today = self.today(user_id).await?;
        let config = self.config(user_id).await?;
        let last = MonthKey::of(today);
        let first = (1..REPORT_MONTHS).fold(last, |month, _| month.prev());

        let rows: Vec<Transaction> = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .filter(transactions::Column::Date.lte(last.last_day()))
            .all(&self.database)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<_>>()?;
        let investments = investments_account(&self.database, user_id).await?;

        let report = first
            .through(last)
            .into_iter()
            .map(|month| {
                let totals = MonthTotals::of(
                    rows.iter().filter(|tx| month.contains(tx.date)),
                    &config,
                );
                let reserve_balance = investments.as_ref().map_or(MoneyCents::ZERO, |account| {
                    replay_balance(
                        account,
                        rows.iter().filter(|tx| tx.date <= month.last_day()),
                    )
                });
                MonthReport {
                    month,
                    income: totals.income,
                    expense: totals.expense,
                    profit: totals.income - totals.expense,
                    fuel: totals.fuel,
                    maintenance: totals.maintenance,
                    reserve_balance,
                }
            })
            .collect();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::{PaymentStatus, ReconciliationStatus, RecurrenceType};

    fn row(kind: TransactionKind, category: Option<&str>, cents: i64) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            kind,
            category_id: None,
            category_name: category.map(str::to_string),
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
            payment_status: Some(PaymentStatus::Paid),
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
    fn totals_group_categories_and_skip_settlements() {
        let mut settlement = row(TransactionKind::Expense, Some("Outros"), 500_00);
        settlement.bill_payment_id = Some(Uuid::new_v4());
        let mut canceled = row(TransactionKind::Expense, Some("Combustível"), 70_00);
        canceled.payment_status = Some(PaymentStatus::Canceled);
        let rows = vec![
            row(TransactionKind::Income, Some("Ganhos"), 1000_00),
            row(TransactionKind::Expense, Some("Combustível"), 200_00),
            row(TransactionKind::Expense, Some("Alimentação"), 50_00),
            row(TransactionKind::Expense, Some("Manutenção"), 80_00),
            row(TransactionKind::Expense, Some("Despesa Fixa"), 30_00),
            row(TransactionKind::Expense, Some("Despesas Fixas"), 20_00),
            row(TransactionKind::Expense, None, 10_00),
            settlement,
            canceled,
        ];
        let totals = MonthTotals::of(&rows, &LedgerConfig::default());
        assert_eq!(totals.income, MoneyCents::new(1000_00));
        assert_eq!(totals.expense, MoneyCents::new(390_00));
        assert_eq!(totals.fixed, MoneyCents::new(50_00));
        assert_eq!(totals.fuel, MoneyCents::new(200_00));
        assert_eq!(totals.food, MoneyCents::new(50_00));
        assert_eq!(totals.maintenance, MoneyCents::new(80_00));

        let names: Vec<String> = totals
            .sorted_categories()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "Combustível",
                "Manutenção",
                "Alimentação",
                "Despesa Fixa",
                "Despesas Fixas",
                UNCATEGORIZED
            ]
        );
    }

    #[test]
    fn transfers_need_both_accounts() {
        let wallet = Uuid::new_v4();
        let investments = Uuid::new_v4();
        let mut transfer = row(TransactionKind::Transfer, None, 300_00);
        transfer.from_account_id = Some(wallet);
        transfer.to_account_id = Some(investments);
        let rows = vec![transfer];
        assert_eq!(
            transfers_between(&rows, Some(wallet), Some(investments)),
            MoneyCents::new(300_00)
        );
        assert_eq!(transfers_between(&rows, None, Some(investments)), MoneyCents::ZERO);
    }
}

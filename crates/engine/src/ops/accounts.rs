use chrono::Utc;
use sea_orm::{
    ActiveValue, Condition, ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder,
    TransactionTrait, prelude::*, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Account, EngineError, INVESTMENTS_ACCOUNT_NAME, MoneyCents, ResultEngine, Transaction,
    WALLET_ACCOUNT_NAME, accounts, cache::scoped_key, transactions, util::fold_name,
};

use super::{Engine, normalize_optional_text, normalize_required_name, with_tx};

/// Legacy name fragment of the investments account.
const LEGACY_RESERVE_FRAGMENT: &str = "reserva";

#[derive(Clone, Debug)]
pub struct AccountCmd {
    pub name: String,
    pub account_type: String,
    pub institution: Option<String>,
    pub initial_balance: MoneyCents,
    pub active: Option<bool>,
}

impl AccountCmd {
    #[must_use]
    pub fn new(name: impl Into<String>, account_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_type: account_type.into(),
            institution: None,
            initial_balance: MoneyCents::ZERO,
            active: None,
        }
    }

    #[must_use]
    pub fn initial_balance(mut self, balance: MoneyCents) -> Self {
        self.initial_balance = balance;
        self
    }

    #[must_use]
    pub fn institution(mut self, institution: impl Into<String>) -> Self {
        self.institution = Some(institution.into());
        self
    }
}

/// An account with its derived balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account: Account,
    pub balance: MoneyCents,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRemoval {
    Removed,
    /// Still referenced by the ledger, so only deactivated.
    Deactivated,
}

/// `initial + Σ settled credits − Σ settled debits` over `rows`.
pub(super) fn replay_balance<'a>(
    account: &Account,
    rows: impl IntoIterator<Item = &'a Transaction>,
) -> MoneyCents {
    rows.into_iter()
        .fold(account.initial_balance, |balance, tx| {
            balance + tx.balance_effect(account.id)
        })
}

pub(super) async fn require_account<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    id: Uuid,
) -> ResultEngine<Account> {
    let model = accounts::Entity::find_by_id(id)
        .filter(accounts::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("account {id}")))?;
    Account::try_from(model)
}

async fn user_accounts<C: ConnectionTrait>(db: &C, user_id: &str) -> ResultEngine<Vec<Account>> {
    accounts::Entity::find()
        .filter(accounts::Column::UserId.eq(user_id))
        .order_by_asc(accounts::Column::SortOrder)
        .all(db)
        .await?
        .into_iter()
        .map(Account::try_from)
        .collect()
}

/// The investments account: exact name first, then any account whose name
/// mentions "reserva".
pub(super) async fn investments_account<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> ResultEngine<Option<Account>> {
    let accounts = user_accounts(db, user_id).await?;
    let exact = accounts
        .iter()
        .position(|a| a.name == INVESTMENTS_ACCOUNT_NAME);
    let legacy = || {
        accounts
            .iter()
            .position(|a| fold_name(&a.name).contains(LEGACY_RESERVE_FRAGMENT))
    };
    Ok(exact.or_else(legacy).and_then(|i| accounts.into_iter().nth(i)))
}

pub(super) async fn wallet_account<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> ResultEngine<Option<Account>> {
    Ok(user_accounts(db, user_id)
        .await?
        .into_iter()
        .find(|a| a.name == WALLET_ACCOUNT_NAME))
}

async fn ensure_unique_name<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    name: &str,
    except: Option<Uuid>,
) -> ResultEngine<()> {
    let mut query = accounts::Entity::find()
        .filter(accounts::Column::UserId.eq(user_id))
        .filter(accounts::Column::Active.eq(true))
        .filter(Expr::cust("LOWER(name)").eq(name.to_lowercase()));
    if let Some(id) = except {
        query = query.filter(accounts::Column::Id.ne(id));
    }
    if query.one(db).await?.is_some() {
        return Err(EngineError::ExistingKey(name.to_string()));
    }
    Ok(())
}

async fn account_rows<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    account_id: Option<Uuid>,
) -> ResultEngine<Vec<Transaction>> {
    let mut query = transactions::Entity::find().filter(transactions::Column::UserId.eq(user_id));
    if let Some(id) = account_id {
        query = query.filter(
            Condition::any()
                .add(transactions::Column::FromAccountId.eq(id))
                .add(transactions::Column::ToAccountId.eq(id)),
        );
    }
    query
        .all(db)
        .await?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
}

impl Engine {
    /// Accounts of `user_id` with their replayed balances.
    pub async fn list_accounts(
        &self,
        user_id: &str,
        include_inactive: bool,
    ) -> ResultEngine<Vec<AccountBalance>> {
        let key = scoped_key(user_id, include_inactive);
        if let Some(list) = self.caches.accounts.get(&key) {
            return Ok(list);
        }
        let rows = account_rows(&self.database, user_id, None).await?;
        let list: Vec<AccountBalance> = user_accounts(&self.database, user_id)
            .await?
            .into_iter()
            .filter(|account| include_inactive || account.active)
            .map(|account| AccountBalance {
                balance: replay_balance(&account, &rows),
                account,
            })
            .collect();
        self.caches.accounts.set(key, list.clone());
        Ok(list)
    }

    pub async fn account_balance(&self, user_id: &str, id: Uuid) -> ResultEngine<MoneyCents> {
        let account = require_account(&self.database, user_id, id).await?;
        let rows = account_rows(&self.database, user_id, Some(id)).await?;
        Ok(replay_balance(&account, &rows))
    }

    pub async fn create_account(&self, user_id: &str, cmd: AccountCmd) -> ResultEngine<Account> {
        let name = normalize_required_name(&cmd.name, "account")?;
        let account = with_tx!(self, |db_tx| {
            ensure_unique_name(&db_tx, user_id, &name, None).await?;
            let order = user_accounts(&db_tx, user_id)
                .await?
                .iter()
                .map(|a| a.order)
                .max()
                .unwrap_or(0)
                + 1;
            let now = Utc::now();
            let account = Account {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                name,
                account_type: cmd.account_type.trim().to_string(),
                institution: normalize_optional_text(cmd.institution.as_deref()),
                initial_balance: cmd.initial_balance,
                active: cmd.active.unwrap_or(true),
                order,
                created_at: now,
                updated_at: now,
            };
            accounts::ActiveModel::from(&account).insert(&db_tx).await?;
            Ok::<_, EngineError>(account)
        })?;
        self.invalidate_account_caches(user_id);
        tracing::debug!(user_id, id = %account.id, "account created");
        Ok(account)
    }

    pub async fn update_account(
        &self,
        user_id: &str,
        id: Uuid,
        cmd: AccountCmd,
    ) -> ResultEngine<Account> {
        let name = normalize_required_name(&cmd.name, "account")?;
        let account = with_tx!(self, |db_tx| {
            let mut account = require_account(&db_tx, user_id, id).await?;
            ensure_unique_name(&db_tx, user_id, &name, Some(id)).await?;
            account.name = name;
            account.account_type = cmd.account_type.trim().to_string();
            account.institution = normalize_optional_text(cmd.institution.as_deref());
            account.initial_balance = cmd.initial_balance;
            if let Some(active) = cmd.active {
                account.active = active;
            }
            account.updated_at = Utc::now();
            accounts::ActiveModel::from(&account).update(&db_tx).await?;
            Ok::<_, EngineError>(account)
        })?;
        self.invalidate_account_caches(user_id);
        Ok(account)
    }

    /// Deletes an unreferenced account, otherwise marks it inactive.
    pub async fn deactivate_account(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> ResultEngine<AccountRemoval> {
        let removal = with_tx!(self, |db_tx| {
            require_account(&db_tx, user_id, id).await?;
            let references = transactions::Entity::find()
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(
                    Condition::any()
                        .add(transactions::Column::FromAccountId.eq(id))
                        .add(transactions::Column::ToAccountId.eq(id)),
                )
                .count(&db_tx)
                .await?;
            if references == 0 {
                accounts::Entity::delete_by_id(id).exec(&db_tx).await?;
                Ok::<_, EngineError>(AccountRemoval::Removed)
            } else {
                let model = accounts::ActiveModel {
                    id: ActiveValue::Unchanged(id),
                    active: ActiveValue::Set(false),
                    updated_at: ActiveValue::Set(Utc::now()),
                    ..Default::default()
                };
                model.update(&db_tx).await?;
                Ok(AccountRemoval::Deactivated)
            }
        })?;
        self.invalidate_account_caches(user_id);
        Ok(removal)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{PaymentStatus, ReconciliationStatus, RecurrenceType, TransactionKind};

    fn tx(kind: TransactionKind, cents: i64, from: Option<Uuid>, to: Option<Uuid>) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
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
            payment_status: Some(PaymentStatus::Paid),
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

    #[test]
    fn balance_counts_only_settled_rows() {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            name: "Carteira".to_string(),
            account_type: "Dinheiro".to_string(),
            institution: None,
            initial_balance: MoneyCents::new(100_00),
            active: true,
            order: 1,
            created_at: now,
            updated_at: now,
        };
        let other = Uuid::new_v4();
        let mut pending = tx(TransactionKind::Expense, 99_00, Some(account.id), None);
        pending.payment_status = Some(PaymentStatus::Pending);
        let mut legacy = tx(TransactionKind::Transfer, 5_00, Some(other), Some(account.id));
        legacy.payment_status = None;
        let rows = vec![
            tx(TransactionKind::Income, 50_00, None, Some(account.id)),
            tx(TransactionKind::Expense, 20_00, Some(account.id), None),
            tx(TransactionKind::Transfer, 10_00, Some(account.id), Some(other)),
            pending,
            legacy,
        ];
        assert_eq!(replay_balance(&account, &rows), MoneyCents::new(125_00));
    }
}

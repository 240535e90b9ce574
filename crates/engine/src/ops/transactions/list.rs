use std::collections::HashMap;

use sea_orm::{QueryFilter, QueryOrder, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MonthKey, ResultEngine, Transaction, TransactionKind, cards, transactions,
    util::fold_name,
};

use super::super::Engine;

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 500;

/// Filters of [`Engine::list_transactions`]. Pages are 1-based.
#[derive(Clone, Debug)]
pub struct TransactionListFilter {
    pub month: MonthKey,
    pub kind: Option<TransactionKind>,
    pub category_id: Option<Uuid>,
    /// Case and accent insensitive match on description, notes and category.
    pub search: Option<String>,
    pub page: u64,
    pub page_size: u64,
}

impl TransactionListFilter {
    pub fn new(month: MonthKey) -> Self {
        Self {
            month,
            kind: None,
            category_id: None,
            search: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionListItem {
    pub transaction: Transaction,
    pub card_name: Option<String>,
    pub is_paid: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub items: Vec<TransactionListItem>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

fn matches_search(tx: &Transaction, needle: &str) -> bool {
    [
        Some(tx.description.as_str()),
        tx.notes.as_deref(),
        tx.category_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| fold_name(field).contains(needle))
}

impl Engine {
    /// Lists one month of the ledger, newest first.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionListFilter,
    ) -> ResultEngine<TransactionPage> {
        if filter.page == 0 {
            return Err(EngineError::InvalidInput("page starts at 1".to_string()));
        }
        if filter.page_size == 0 || filter.page_size > MAX_PAGE_SIZE {
            return Err(EngineError::InvalidInput(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        let skip = (filter.page - 1)
            .checked_mul(filter.page_size)
            .and_then(|skip| usize::try_from(skip).ok())
            .ok_or_else(|| {
                EngineError::InvalidInput(format!("page {} is out of range", filter.page))
            })?;

        let mut query = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .filter(transactions::Column::Date.gte(filter.month.first_day()))
            .filter(transactions::Column::Date.lte(filter.month.last_day()));
        if let Some(kind) = filter.kind {
            query = query.filter(transactions::Column::Kind.eq(kind.as_str()));
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(transactions::Column::CategoryId.eq(category_id));
        }
        let rows: Vec<Transaction> = query
            .order_by_desc(transactions::Column::Date)
            .order_by_desc(transactions::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<_>>()?;

        let needle = filter
            .search
            .as_deref()
            .map(fold_name)
            .filter(|needle| !needle.is_empty());
        let rows: Vec<Transaction> = match needle {
            Some(needle) => rows
                .into_iter()
                .filter(|tx| matches_search(tx, &needle))
                .collect(),
            None => rows,
        };

        let card_names: HashMap<Uuid, String> = cards::Entity::find()
            .filter(cards::Column::UserId.eq(user_id))
            .all(&self.database)
            .await?
            .into_iter()
            .map(|card| (card.id, card.name))
            .collect();

        let total = rows.len() as u64;
        let total_pages = total.div_ceil(filter.page_size);
        let items = rows
            .into_iter()
            .skip(skip)
            .take(filter.page_size as usize)
            .map(|tx| TransactionListItem {
                card_name: tx.card_id.and_then(|id| card_names.get(&id).cloned()),
                is_paid: tx.settles_balance(),
                transaction: tx,
            })
            .collect();

        Ok(TransactionPage {
            items,
            page: filter.page,
            page_size: filter.page_size,
            total,
            total_pages,
        })
    }

    /// One ledger row.
    pub async fn transaction(&self, user_id: &str, id: Uuid) -> ResultEngine<Transaction> {
        super::find_transaction(&self.database, user_id, id).await
    }
}

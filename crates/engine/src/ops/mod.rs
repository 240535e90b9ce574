use std::time::Duration;

use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    EngineError, LedgerConfig, ResultEngine,
    cache::{DEFAULT_CACHE_TTL, TtlCache},
};

mod accounts;
mod cards;
mod categories;
mod config;
mod installments;
mod reports;
mod reserves;
mod transactions;

pub use accounts::{AccountBalance, AccountCmd, AccountRemoval};
pub use cards::{
    BillPayment, BillSummary, CardBillsForMonth, CardCmd, CardDetail, CardKpis, CardList,
    CardRemoval, CurrentBillPayment,
};
pub use categories::{CategoryCmd, CategoryRemoval};
pub use installments::{
    BulkPaid, InstallmentDetails, InstallmentItem, InstallmentStats, InstallmentsCanceled,
};
pub use reports::{CategoryTotal, Dashboard, MonthReport};
pub use transactions::{
    BatchScope, BulkReconciled, CancelScope, CreatedInstallments, CreatedTransaction,
    NewTransaction, ReconciliationSummary, TransactionListFilter, TransactionListItem,
    TransactionPage, TransactionPatch, Updated, UnreconciledItem,
};

/// Default wait for the card lock before reporting [`EngineError::LockTimeout`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(8000);

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
struct Caches {
    categories: TtlCache<Vec<crate::Category>>,
    accounts: TtlCache<Vec<AccountBalance>>,
    config: TtlCache<LedgerConfig>,
    cards: TtlCache<CardList>,
    card_details: TtlCache<CardDetail>,
}

impl Caches {
    fn new(ttl: Duration) -> Self {
        Self {
            categories: TtlCache::new(ttl),
            accounts: TtlCache::new(ttl),
            config: TtlCache::new(ttl),
            cards: TtlCache::new(ttl),
            card_details: TtlCache::new(ttl),
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    caches: Caches,
    card_lock: Mutex<()>,
    lock_timeout: Duration,
    today: Option<NaiveDate>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Today's date in the user's configured timezone.
    pub async fn today(&self, user_id: &str) -> ResultEngine<NaiveDate> {
        if let Some(today) = self.today {
            return Ok(today);
        }
        let config = self.config_in(&self.database, user_id).await?;
        Ok(Utc::now().with_timezone(&config.timezone).date_naive())
    }

    /// Serializes card mutations; waits at most the configured lock timeout.
    async fn lock_cards(&self) -> ResultEngine<MutexGuard<'_, ()>> {
        tokio::time::timeout(self.lock_timeout, self.card_lock.lock())
            .await
            .map_err(|_| {
                tracing::warn!("card lock not acquired within {:?}", self.lock_timeout);
                EngineError::LockTimeout
            })
    }

    fn invalidate_card_caches(&self, user_id: &str) {
        self.caches.cards.invalidate_scope(user_id);
        self.caches.card_details.invalidate_scope(user_id);
    }

    fn invalidate_account_caches(&self, user_id: &str) {
        self.caches.accounts.invalidate_scope(user_id);
    }

    /// Drop every cached aggregate of every user.
    pub fn clear_caches(&self) {
        self.caches.categories.clear();
        self.caches.accounts.clear();
        self.caches.config.clear();
        self.caches.cards.clear();
        self.caches.card_details.clear();
    }
}

fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// The builder for `Engine`
pub struct EngineBuilder {
    database: DatabaseConnection,
    cache_ttl: Duration,
    lock_timeout: Duration,
    today: Option<NaiveDate>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            today: None,
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Time-to-live of cached aggregates. Zero disables caching.
    pub fn cache_ttl(mut self, ttl: Duration) -> EngineBuilder {
        self.cache_ttl = ttl;
        self
    }

    /// Maximum wait for the card lock.
    pub fn lock_timeout(mut self, timeout: Duration) -> EngineBuilder {
        self.lock_timeout = timeout;
        self
    }

    /// Pin "today" to a fixed date instead of the wall clock.
    pub fn today(mut self, today: NaiveDate) -> EngineBuilder {
        self.today = Some(today);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            caches: Caches::new(self.cache_ttl),
            card_lock: Mutex::new(()),
            lock_timeout: self.lock_timeout,
            today: self.today,
        })
    }
}

//! Ledger engine: transactions, installments, credit cards, bills and the
//! maintenance reserve, persisted through sea-orm.
//!
//! Every operation takes the caller's `user_id` explicitly and is scoped to
//! it. Balances, bill values and the reserve timeline are derived from the
//! ledger rows; see the individual modules for the rules.

pub use accounts::{Account, INVESTMENTS_ACCOUNT_NAME, WALLET_ACCOUNT_NAME};
pub use bills::{Bill, BillPeriod, BillStatus, BillValue, best_purchase_day};
pub use cache::DEFAULT_CACHE_TTL;
pub use calendar::{MonthKey, add_months_on_day, parse_date, safe_date};
pub use cards::{Card, CardSummary};
pub use categories::{Category, CategoryScope};
pub use config_entries::{ConfigKey, LedgerConfig};
pub use error::EngineError;
pub use installment_groups::{InstallmentGroup, OPEN_ENDED_COUNT};
pub use money::MoneyCents;
pub use ops::*;
pub use reserves::ReserveMonth;
pub use transactions::{
    PaymentStatus, ReconciliationStatus, RecurrenceType, Transaction, TransactionKind,
};

mod accounts;
mod bills;
mod cache;
mod calendar;
mod cards;
mod categories;
mod config_entries;
mod error;
mod installment_groups;
mod money;
mod ops;
mod reserves;
mod transactions;
mod util;

type ResultEngine<T> = Result<T, EngineError>;

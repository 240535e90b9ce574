use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Year and month of a report or statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthRef {
    pub year: i32,
    /// 1-based.
    pub month: u32,
}

pub mod envelope {
    use super::*;

    /// `{ok: true, data}` of the ledger endpoints.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct Envelope<T> {
        pub ok: bool,
        pub data: T,
    }

    impl<T> Envelope<T> {
        pub fn ok(data: T) -> Self {
            Self { ok: true, data }
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorBody {
        pub message: String,
        pub code: String,
    }

    /// `{ok: false, error: {message, code}}`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorEnvelope {
        pub ok: bool,
        pub error: ErrorBody,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct Meta {
        /// RFC3339 UTC.
        pub server_time: String,
        pub latency_ms: u64,
    }

    /// `{ok: true, data, meta}` of the card endpoints.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardEnvelope<T> {
        pub ok: bool,
        pub data: T,
        pub meta: Meta,
    }

    /// Version numbers of a rejected card edit.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ConflictDetails {
        pub expected_version: i64,
        pub current_version: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardErrorBody {
        pub code: String,
        pub message: String,
        pub details: Option<ConflictDetails>,
    }

    /// `{ok: false, error: {code, message, details}, meta}`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardErrorEnvelope {
        pub ok: bool,
        pub error: CardErrorBody,
        pub meta: Meta,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum TransactionKind {
        Income,
        Expense,
        Transfer,
    }

    /// Which members of an installment group an update or delete touches.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum BatchScope {
        #[default]
        This,
        Following,
        All,
    }

    /// A single row, or an installment plan when `installments` is `> 1` or
    /// `-1` (open-ended).
    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionNew {
        pub date: NaiveDate,
        pub kind: TransactionKind,
        pub amount_cents: i64,
        pub description: String,
        pub category_id: Option<Uuid>,
        pub payment_method: Option<String>,
        pub km: Option<i64>,
        pub notes: Option<String>,
        pub from_account_id: Option<Uuid>,
        pub to_account_id: Option<Uuid>,
        pub auto_debit: Option<bool>,
        pub paid: Option<bool>,
        pub card_id: Option<Uuid>,
        pub installments: Option<i32>,
        /// Monthly simple interest in percent.
        pub interest_rate: Option<f64>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionUpdate {
        pub id: Uuid,
        #[serde(default)]
        pub scope: BatchScope,
        pub date: Option<NaiveDate>,
        pub kind: Option<TransactionKind>,
        pub amount_cents: Option<i64>,
        pub description: Option<String>,
        pub category_id: Option<Uuid>,
        pub payment_method: Option<String>,
        pub km: Option<i64>,
        pub notes: Option<String>,
        pub from_account_id: Option<Uuid>,
        pub to_account_id: Option<Uuid>,
        pub auto_debit: Option<bool>,
        pub paid: Option<bool>,
        pub card_id: Option<Uuid>,
        /// Detach the row from its card.
        #[serde(default)]
        pub unlink_card: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionDelete {
        pub id: Uuid,
        #[serde(default)]
        pub scope: BatchScope,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum TransactionDeleted {
        Deleted { deleted: bool },
        Many { count: usize },
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionGet {
        pub id: Uuid,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionList {
        pub year: i32,
        pub month: u32,
        pub kind: Option<TransactionKind>,
        pub category_id: Option<Uuid>,
        pub search: Option<String>,
        pub page: Option<u64>,
        pub page_size: Option<u64>,
    }
}

pub mod installment {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum CancelScope {
        #[default]
        Single,
        Future,
        All,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct InstallmentPay {
        pub id: Uuid,
        pub payment_date: Option<NaiveDate>,
        pub paid_amount_cents: Option<i64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct InstallmentsPay {
        pub ids: Vec<Uuid>,
        pub payment_date: Option<NaiveDate>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct InstallmentCancel {
        pub id: Uuid,
        #[serde(default)]
        pub scope: CancelScope,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct InstallmentGroupGet {
        pub group_id: Uuid,
    }
}

pub mod reconcile {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Reconcile {
        pub id: Uuid,
        pub reconciliation_date: Option<NaiveDate>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BulkReconcile {
        pub ids: Vec<Uuid>,
        pub reconciliation_date: Option<NaiveDate>,
    }
}

pub mod category {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum CategoryScope {
        Expense,
        Income,
        Both,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct CategoryList {
        #[serde(default)]
        pub include_inactive: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryNew {
        pub name: String,
        pub scope: CategoryScope,
        pub emoji: Option<String>,
        pub color: Option<String>,
        pub active: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryUpdate {
        pub id: Uuid,
        pub name: String,
        pub scope: CategoryScope,
        pub emoji: Option<String>,
        pub color: Option<String>,
        pub active: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryDelete {
        pub id: Uuid,
    }

    /// `removed = false` means the category was only deactivated; `code`
    /// then says why.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryDeleted {
        pub removed: bool,
        pub code: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryOrder {
        pub id: Uuid,
        pub order: i32,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryReorder {
        pub orders: Vec<CategoryOrder>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoriesReordered {
        pub updated: usize,
    }
}

pub mod account {
    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct AccountList {
        #[serde(default)]
        pub include_inactive: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountNew {
        pub name: String,
        pub account_type: String,
        pub institution: Option<String>,
        #[serde(default)]
        pub initial_balance_cents: i64,
        pub active: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountUpdate {
        pub id: Uuid,
        pub name: String,
        pub account_type: String,
        pub institution: Option<String>,
        #[serde(default)]
        pub initial_balance_cents: i64,
        pub active: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountGet {
        pub id: Uuid,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountBalance {
        pub id: Uuid,
        pub balance_cents: i64,
    }
}

pub mod card {
    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct CardList {
        pub etag: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardGet {
        pub card_id: Uuid,
    }

    /// Creates a card when `id` is empty. Edits should carry the `version`
    /// they were based on.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardSave {
        pub id: Option<Uuid>,
        pub name: String,
        pub issuer: Option<String>,
        pub network: Option<String>,
        pub last4: Option<String>,
        pub color: Option<String>,
        pub total_limit_cents: i64,
        pub closing_day: Option<u32>,
        pub due_day: Option<u32>,
        pub version: Option<i64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CardArchive {
        pub card_id: Uuid,
        pub active: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BillGenerate {
        pub card_id: Uuid,
        pub year: i32,
        pub month: u32,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BillGet {
        pub bill_id: Uuid,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BillPay {
        pub bill_id: Uuid,
        pub payment_date: NaiveDate,
        pub account_id: Uuid,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CurrentBillPay {
        pub card_id: Uuid,
        pub payment_date: NaiveDate,
        pub account_id: Uuid,
        pub year: i32,
        pub month: u32,
        pub amount_cents: Option<i64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Deleted {
        pub deleted: u64,
    }
}

pub mod config {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ConfigEntry {
        pub key: String,
        pub value: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ConfigSave {
        pub entries: Vec<ConfigEntry>,
    }
}

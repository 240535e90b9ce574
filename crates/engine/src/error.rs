//! The module contains the error the engine can throw.
//!
//! Every variant maps to a stable wire code through [`EngineError::code`],
//! which the server copies into its response envelopes:
//!
//! - [`KeyNotFound`] thrown when a referenced row does not exist (`NOT_FOUND`).
//! - [`InvalidAmount`] / [`InvalidInput`] thrown on caller-fixable input (`VALIDATION`).
//! - [`VersionConflict`] thrown when a card edit carries a stale version (`CONFLICT`).
//! - [`LockTimeout`] thrown when the card lock could not be acquired (`LOCK_TIMEOUT`).
//!
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`InvalidInput`]: EngineError::InvalidInput
//!  [`VersionConflict`]: EngineError::VersionConflict
//!  [`LockTimeout`]: EngineError::LockTimeout
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Version conflict: expected {expected}, current {current}")]
    VersionConflict { expected: i64, current: i64 },
    #[error("Server busy, try again")]
    LockTimeout,
    #[error("card expenses must be settled through a bill payment")]
    CardTransactionPayment,
    #[error("card expenses cannot be open-ended recurring")]
    CardOpenEndedRecurrence,
    #[error("card expenses are reconciled through the bill")]
    CardTransactionReconcile,
    #[error("\"{0}\" is already paid")]
    AlreadyPaid(String),
    #[error("unable to create settlement transaction: {0}")]
    SettlementFailed(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeyNotFound(_) => "NOT_FOUND",
            Self::ExistingKey(_) | Self::InvalidAmount(_) | Self::InvalidInput(_) => "VALIDATION",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::VersionConflict { .. } => "CONFLICT",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::CardTransactionPayment => "CARD_TX_PAY_BLOCKED",
            Self::CardOpenEndedRecurrence => "CARD_INFINITE_BLOCKED",
            Self::CardTransactionReconcile => "CARD_TX_RECONCILE_BLOCKED",
            Self::AlreadyPaid(_) => "ALREADY_PAID",
            Self::SettlementFailed(_) => "TX_CREATE_FAILED",
            Self::Database(_) => "UNKNOWN",
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (
                Self::VersionConflict {
                    expected: a,
                    current: b,
                },
                Self::VersionConflict {
                    expected: c,
                    current: d,
                },
            ) => a == c && b == d,
            (Self::LockTimeout, Self::LockTimeout) => true,
            (Self::CardTransactionPayment, Self::CardTransactionPayment) => true,
            (Self::CardOpenEndedRecurrence, Self::CardOpenEndedRecurrence) => true,
            (Self::CardTransactionReconcile, Self::CardTransactionReconcile) => true,
            (Self::AlreadyPaid(a), Self::AlreadyPaid(b)) => a == b,
            (Self::SettlementFailed(a), Self::SettlementFailed(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

use std::time::Instant;

use api_types::envelope::{
    CardEnvelope, CardErrorBody, CardErrorEnvelope, ConflictDetails, ErrorBody, ErrorEnvelope,
    Meta,
};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use engine::EngineError;
use serde::Serialize;

pub use server::{ServerState, router, run, run_with_listener, spawn_with_listener};

mod accounts;
mod cards;
mod categories;
mod config;
mod installments;
mod reports;
mod server;
mod transactions;
mod user;

pub use user::Model as User;

pub enum ServerError {
    Engine(EngineError),
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ExistingKey(_)
        | EngineError::VersionConflict { .. }
        | EngineError::AlreadyPaid(_) => StatusCode::CONFLICT,
        EngineError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Database(_) | EngineError::SettlementFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        EngineError::InvalidAmount(_)
        | EngineError::InvalidInput(_)
        | EngineError::CardTransactionPayment
        | EngineError::CardOpenEndedRecurrence
        | EngineError::CardTransactionReconcile => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn message_for_engine_error(err: &EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Engine(err) => status_for_engine_error(err),
            ServerError::Generic(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ServerError::Engine(err) => err.code(),
            ServerError::Generic(_) => "VALIDATION",
        }
    }

    fn message(&self) -> String {
        match self {
            ServerError::Engine(err) => message_for_engine_error(err),
            ServerError::Generic(message) => message.clone(),
        }
    }

    fn details(&self) -> Option<ConflictDetails> {
        match self {
            ServerError::Engine(EngineError::VersionConflict { expected, current }) => {
                Some(ConflictDetails {
                    expected_version: *expected,
                    current_version: *current,
                })
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            ok: false,
            error: ErrorBody {
                message: self.message(),
                code: self.code().to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<JsonRejection> for ServerError {
    fn from(value: JsonRejection) -> Self {
        tracing::debug!(status = %value.status(), "rejected request body: {value}");
        Self::Generic(value.body_text())
    }
}

/// Response of the card endpoints: the usual envelope plus a `meta` block
/// with the server time and the handler latency.
pub struct CardReply<T> {
    started: Instant,
    result: Result<T, ServerError>,
}

impl<T> CardReply<T> {
    pub fn new(started: Instant, result: Result<T, ServerError>) -> Self {
        Self { started, result }
    }
}

fn meta(started: Instant) -> Meta {
    Meta {
        server_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

impl<T: Serialize> IntoResponse for CardReply<T> {
    fn into_response(self) -> Response {
        let meta = meta(self.started);
        match self.result {
            Ok(data) => Json(CardEnvelope {
                ok: true,
                data,
                meta,
            })
            .into_response(),
            Err(err) => {
                let body = CardErrorEnvelope {
                    ok: false,
                    error: CardErrorBody {
                        code: err.code().to_string(),
                        message: err.message(),
                        details: err.details(),
                    },
                    meta,
                };
                (err.status(), Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_forbidden_maps_to_403() {
        let res = ServerError::from(EngineError::Forbidden("forbidden".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn engine_not_found_maps_to_404() {
        let res = ServerError::from(EngineError::KeyNotFound("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn engine_conflict_maps_to_409() {
        let res = ServerError::from(EngineError::VersionConflict {
            expected: 1,
            current: 2,
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn engine_validation_maps_to_422() {
        let res = ServerError::from(EngineError::InvalidAmount("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn card_blockers_map_to_422() {
        let res = ServerError::from(EngineError::CardTransactionPayment).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn lock_timeout_maps_to_503() {
        let res = ServerError::from(EngineError::LockTimeout).into_response();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn conflict_details_only_for_version_conflicts() {
        let err = ServerError::from(EngineError::VersionConflict {
            expected: 3,
            current: 5,
        });
        assert_eq!(
            err.details(),
            Some(ConflictDetails {
                expected_version: 3,
                current_version: 5
            })
        );
        assert_eq!(err.code(), "CONFLICT");
        assert!(ServerError::from(EngineError::LockTimeout).details().is_none());
    }

    #[test]
    fn database_errors_hide_the_cause() {
        let err = ServerError::from(EngineError::Database(sea_orm::DbErr::Custom(
            "disk full".to_string(),
        )));
        assert_eq!(err.message(), "internal server error");
        assert_eq!(err.code(), "UNKNOWN");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

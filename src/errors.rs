// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Typed failures raised by the posting, installment, goal and FX engines.

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FinanceError>;

#[derive(Debug, Error)]
pub enum FinanceError {
    /// Shape, currency, missing field or kind/category pairing problems.
    #[error("invalid {field}: {code}")]
    Validation { field: String, code: String },

    #[error(
        "insufficient funds in account {account_id}: available {available}, requested {requested}"
    )]
    InsufficientFunds {
        account_id: i64,
        available: i64,
        requested: i64,
    },

    #[error(
        "credit limit exceeded on account {account_id}: limit {limit}, current debt {current_debt}, requested {requested}"
    )]
    CreditLimitExceeded {
        account_id: i64,
        limit: i64,
        current_debt: i64,
        requested: i64,
    },

    #[error("invariant violated: {which}")]
    InvariantViolation { which: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("no exchange rate available for {pair} on {on_date}")]
    NoRateAvailable { pair: String, on_date: NaiveDate },

    /// The record exists but belongs to another owner.
    #[error("{entity} {id} belongs to another user")]
    PermissionDenied { entity: &'static str, id: i64 },

    #[error("invalid setting '{key}': {reason}")]
    Config { key: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl FinanceError {
    pub fn validation(field: impl Into<String>, code: impl Into<String>) -> Self {
        FinanceError::Validation {
            field: field.into(),
            code: code.into(),
        }
    }

    pub fn invariant(which: impl Into<String>) -> Self {
        FinanceError::InvariantViolation {
            which: which.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        FinanceError::Conflict {
            reason: reason.into(),
        }
    }

    /// Short machine-readable name of the error kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            FinanceError::Validation { .. } => "validation_error",
            FinanceError::InsufficientFunds { .. } => "insufficient_funds",
            FinanceError::CreditLimitExceeded { .. } => "credit_limit_exceeded",
            FinanceError::InvariantViolation { .. } => "invariant_violation",
            FinanceError::NotFound { .. } => "not_found",
            FinanceError::Conflict { .. } => "conflict",
            FinanceError::NoRateAvailable { .. } => "no_rate_available",
            FinanceError::PermissionDenied { .. } => "permission_denied",
            FinanceError::Config { .. } => "config_error",
            FinanceError::Database(_) => "database_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_payload() {
        let err = FinanceError::CreditLimitExceeded {
            account_id: 7,
            limit: 100_000,
            current_debt: 90_000,
            requested: 20_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("limit 100000"));
        assert!(msg.contains("requested 20000"));
        assert_eq!(err.kind(), "credit_limit_exceeded");
    }

    #[test]
    fn validation_helper_builds_field_reference() {
        match FinanceError::validation("category_id", "required") {
            FinanceError::Validation { field, code } => {
                assert_eq!(field, "category_id");
                assert_eq!(code, "required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

//! Controller error type.
//!
//! Display strings are the operator-facing messages; the daemon and CLI print
//! them verbatim.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// Request rejected before any I/O.
    #[error("{0}")]
    Validation(String),

    #[error("Order number already exists")]
    DuplicateOrder { order_number: String },

    /// One-time product whose external reference is already in the guard ledger.
    #[error("Order already processed (One Time).")]
    AlreadyProcessed { external_ref: String },

    #[error("Order not found")]
    NotFound { order_id: i64 },

    #[error("Order already fulfilled")]
    AlreadyFulfilled { order_id: i64 },

    #[error("No remaining quantity to fulfill")]
    NoRemainingQuantity { order_id: i64 },

    #[error("CSV export only available for fulfilled orders")]
    NotFulfilled { order_id: i64 },

    /// Storage failure. The enclosing transaction (if any) was rolled back.
    #[error("{0:#}")]
    Persistence(#[from] anyhow::Error),
}

/// Coarse error classes used by the request layers for status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    DuplicateOrder,
    AlreadyProcessed,
    NotFound,
    InvalidStateTransition,
    NotFulfilled,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::DuplicateOrder => "duplicate_order",
            ErrorKind::AlreadyProcessed => "already_processed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::NotFulfilled => "not_fulfilled",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::Validation(_) => ErrorKind::Validation,
            OrderError::DuplicateOrder { .. } => ErrorKind::DuplicateOrder,
            OrderError::AlreadyProcessed { .. } => ErrorKind::AlreadyProcessed,
            OrderError::NotFound { .. } => ErrorKind::NotFound,
            OrderError::AlreadyFulfilled { .. } | OrderError::NoRemainingQuantity { .. } => {
                ErrorKind::InvalidStateTransition
            }
            OrderError::NotFulfilled { .. } => ErrorKind::NotFulfilled,
            OrderError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        OrderError::Persistence(anyhow::Error::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_errors_share_a_kind() {
        assert_eq!(
            OrderError::AlreadyFulfilled { order_id: 1 }.kind(),
            ErrorKind::InvalidStateTransition
        );
        assert_eq!(
            OrderError::NoRemainingQuantity { order_id: 1 }.kind(),
            ErrorKind::InvalidStateTransition
        );
    }

    #[test]
    fn persistence_message_carries_the_context_chain() {
        let err = OrderError::from(anyhow::anyhow!("connection reset").context("Failed to create order"));
        assert_eq!(err.to_string(), "Failed to create order: connection reset");
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}

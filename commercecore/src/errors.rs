//! Error types for `CommerceCore`.
//!
//! The error design follows these principles:
//!
//! - **Rich error information**: include context to help diagnose issues
//! - **Type safety**: different error types for different subsystems
//! - **Actionable**: callers can determine how to handle each error
//! - **Composable**: errors convert between layers
//!
//! # Error Categories
//!
//! - **`CoreError`**: workflow-level failures (the caller-facing taxonomy)
//! - **`StoreError`**: storage and persistence layer failures
//! - **`ValidationError`**: input validation failures, rejected before any
//!   transaction opens
//!
//! Only `CoreError::ConcurrencyConflict` is safe to retry: the operation was
//! not applied. Every other kind is terminal for that request.

use crate::document::{CollectionName, DocumentId, DocumentKey};
use crate::model::OrderStatus;
use crate::types::{ProductId, Revision};
use thiserror::Error;

/// Errors that can occur during workflow execution.
///
/// Each variant maps to a distinct, stable error code (see [`CoreError::code`])
/// so callers can distinguish "retry" from "fix input and resubmit" from
/// "resource missing".
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The input was rejected before any transaction opened.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced entity is absent.
    #[error("Not found: {collection}/{id}")]
    NotFound {
        /// Collection the lookup ran against
        collection: CollectionName,
        /// The missing document id
        id: DocumentId,
    },

    /// A stock precondition was violated. Stock is never clamped.
    #[error(
        "Insufficient stock for product '{product_id}': requested {requested}, available {available}"
    )]
    InsufficientStock {
        /// The product whose stock was insufficient
        product_id: ProductId,
        /// Units the operation needed
        requested: u64,
        /// Units actually on hand
        available: u64,
    },

    /// An order status change that the transition table disallows.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// The order's current status
        from: OrderStatus,
        /// The attempted status
        to: OrderStatus,
    },

    /// A uniqueness constraint was violated (SKU, one review per user per
    /// product).
    #[error("Duplicate value for constraint '{constraint}': {value}")]
    Duplicate {
        /// Name of the violated constraint
        constraint: String,
        /// The offending value
        value: String,
    },

    /// Optimistic concurrency control detected a racing writer. The
    /// transaction was aborted without applying anything; the operation may
    /// be retried.
    #[error("Concurrency conflict on documents: {keys:?}")]
    ConcurrencyConflict {
        /// The documents whose revisions moved underneath the transaction
        keys: Vec<DocumentKey>,
    },

    /// An error occurred in the document store.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Convenience constructor for a missing document.
    pub fn not_found(collection: CollectionName, id: DocumentId) -> Self {
        Self::NotFound { collection, id }
    }

    /// The stable, user-visible code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::Store(_) => "STORE_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the caller may safely retry the operation.
    ///
    /// True only for [`CoreError::ConcurrencyConflict`]: the transaction
    /// aborted without applying anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A revision precondition failed when committing writes.
    #[error(
        "Revision conflict on document '{key}': expected {expected}, but current is {current}"
    )]
    RevisionConflict {
        /// The document with the revision conflict
        key: DocumentKey,
        /// The revision that was expected
        expected: Revision,
        /// The actual current revision
        current: Revision,
    },

    /// A unique index rejected a write.
    #[error("Duplicate key in '{collection}' on ({fields}): {value}")]
    DuplicateKey {
        /// The collection carrying the index
        collection: CollectionName,
        /// Comma-joined indexed field names
        fields: String,
        /// The duplicated value tuple, rendered
        value: String,
    },

    /// Serialization of a document body failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A commit could not complete within the store's deadline. The
    /// transaction aborted with no observable effects.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The store is temporarily unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Clone for StoreError {
    fn clone(&self) -> Self {
        match self {
            Self::RevisionConflict {
                key,
                expected,
                current,
            } => Self::RevisionConflict {
                key: key.clone(),
                expected: *expected,
                current: *current,
            },
            Self::DuplicateKey {
                collection,
                fields,
                value,
            } => Self::DuplicateKey {
                collection: collection.clone(),
                fields: fields.clone(),
                value: value.clone(),
            },
            Self::Serialization(msg) => Self::Serialization(msg.clone()),
            Self::Timeout(duration) => Self::Timeout(*duration),
            Self::Unavailable(msg) => Self::Unavailable(msg.clone()),
            Self::Io(err) => Self::Io(std::io::Error::new(err.kind(), err.to_string())),
            Self::Internal(msg) => Self::Internal(msg.clone()),
        }
    }
}

/// Errors that can occur during validation of smart constructor inputs.
///
/// These arise at system boundaries where unstructured data is parsed into
/// domain types; once parsed, those types guarantee validity throughout.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// The input was empty when a non-empty value was required.
    #[error("Value cannot be empty")]
    Empty,

    /// The input exceeded the maximum allowed length.
    #[error("Value exceeds maximum length of {max} characters (was {actual})")]
    TooLong {
        /// Maximum allowed length
        max: usize,
        /// Actual length provided
        actual: usize,
    },

    /// The input contained invalid characters or format.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The input value was out of the allowed range.
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// A custom validation rule failed.
    #[error("Validation failed: {0}")]
    Custom(String),
}

/// Type alias for workflow results.
pub type CoreResult<T> = Result<T, CoreError>;

/// Type alias for document store results.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RevisionConflict { key, .. } => {
                Self::ConcurrencyConflict { keys: vec![key] }
            }
            StoreError::DuplicateKey {
                collection,
                fields,
                value,
            } => Self::Duplicate {
                constraint: format!("{collection}.{fields}"),
                value,
            },
            other => Self::Store(other),
        }
    }
}

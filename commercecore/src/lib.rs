//! `CommerceCore` - the transactional core of an e-commerce platform.
//!
//! Product inventory, order records, and review-driven rating aggregates
//! are kept mutually consistent under concurrent writes. Cross-entity
//! invariants - stock never negative, order totals frozen at purchase time,
//! product rating equal to the true mean of its reviews - hold after every
//! committed transaction, even when operations race against the same
//! product or order.
//!
//! # Architecture
//!
//! - [`store::DocumentStore`] is the port a backend implements: revisioned
//!   reads plus one atomic multi-document commit with per-document revision
//!   preconditions and unique-index enforcement.
//! - [`transaction::Transaction`] binds reads and staged writes into a
//!   single atomic unit with read-modify-write preconditions; losing an
//!   optimistic race surfaces as the retryable
//!   [`errors::CoreError::ConcurrencyConflict`].
//! - [`orders::OrderService`], [`reviews::ReviewService`], and
//!   [`inventory::InventoryService`] are the three workflows. They are
//!   constructed explicitly with a store handle and collaborator handles -
//!   no global state.
//! - [`audit::AuditLog`] and [`auth::AuthContext`] are the narrow seams to
//!   the outside; audit failures never fail a core operation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod auth;
pub mod config;
pub mod document;
pub mod errors;
pub mod inventory;
pub mod model;
pub mod orders;
pub mod query;
pub mod repository;
pub mod retry;
pub mod reviews;
pub mod store;
pub mod transaction;
pub mod types;

pub use audit::{AuditEntry, AuditKind, AuditLog, NullAuditLog, RecordingAuditLog, TracingAuditLog};
pub use auth::{AuthContext, StaticAuthContext};
pub use config::CoreConfig;
pub use document::{
    CollectionName, DocumentId, DocumentKey, DocumentWrite, ExpectedRevision, UniqueIndex,
    VersionedDocument, WriteOp,
};
pub use errors::{CoreError, CoreResult, StoreError, StoreResult, ValidationError};
pub use inventory::InventoryService;
pub use model::{
    commerce_indexes, NewOrderItem, NewProduct, Order, OrderItem, OrderPatch, OrderStatus,
    PaymentStatus, Product, Review, ReviewPatch,
};
pub use orders::OrderService;
pub use query::{Filter, FindOptions, PageRequest, SortOrder};
pub use repository::{Entity, Repository};
pub use retry::{execute_with_retry, RetryConfig};
pub use reviews::ReviewService;
pub use store::DocumentStore;
pub use transaction::Transaction;
pub use types::{
    Money, OrderId, ProductId, ProductName, Quantity, Revision, ReviewComment, ReviewId,
    ReviewRating, Sku, StockLevel, Timestamp, UserId,
};

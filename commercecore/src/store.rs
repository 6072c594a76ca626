//! Document store abstraction for the transactional data access layer.
//!
//! The [`DocumentStore`] trait is the port interface different backends
//! implement. It is backend-independent and built around a single atomic
//! multi-document [`commit`](DocumentStore::commit): every cross-entity
//! mutation in the system funnels through that one operation, which is what
//! makes the workflow invariants enforceable.

use crate::document::{CollectionName, DocumentKey, DocumentWrite, VersionedDocument};
use crate::errors::StoreResult;
use crate::query::{Filter, FindOptions};
use crate::types::Revision;
use async_trait::async_trait;
use std::collections::HashMap;

/// The core document store trait that all backends must satisfy.
///
/// Reads return each document together with its current [`Revision`]; writes
/// carry an expected revision. A backend validates every expectation (and
/// every unique index) before applying anything, and applies all-or-nothing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads documents by key.
    ///
    /// Returns one entry per requested key, in request order; `None` where
    /// the document does not exist.
    async fn fetch(&self, keys: &[DocumentKey]) -> StoreResult<Vec<Option<VersionedDocument>>>;

    /// Reads documents from a collection matching a filter.
    ///
    /// Results are sorted per `options.sort`, falling back to document id
    /// order, then windowed by `options.skip`/`options.limit`.
    async fn query(
        &self,
        collection: &CollectionName,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<VersionedDocument>>;

    /// Counts documents in a collection matching a filter.
    async fn count(&self, collection: &CollectionName, filter: &Filter) -> StoreResult<u64>;

    /// Applies a set of writes atomically.
    ///
    /// Every write's expected revision and every configured unique index is
    /// validated first; only when all checks pass is anything applied. On
    /// success, returns the new revision of each written (non-deleted)
    /// document.
    ///
    /// # Errors
    ///
    /// * `StoreError::RevisionConflict` - an expected revision did not match
    /// * `StoreError::DuplicateKey` - a unique index rejected a write
    /// * `StoreError::Unavailable` / `StoreError::Timeout` - backend trouble;
    ///   nothing was applied
    async fn commit(
        &self,
        writes: Vec<DocumentWrite>,
    ) -> StoreResult<HashMap<DocumentKey, Revision>>;
}

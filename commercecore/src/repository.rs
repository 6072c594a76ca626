//! Typed repository over a single entity collection.
//!
//! A [`Repository`] gives standalone find/create/update/delete/count access
//! for one entity type. Standalone writes are single-write commits through
//! the store's atomic commit path; anything spanning multiple entities must
//! go through a [`Transaction`](crate::transaction::Transaction) instead.

use crate::document::{
    DocumentId, DocumentKey, DocumentWrite, ExpectedRevision, VersionedDocument,
};
use crate::errors::{CoreError, CoreResult, StoreError};
use crate::query::{Filter, FindOptions};
use crate::store::DocumentStore;
use crate::types::Revision;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// A record type stored as documents in one collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The collection this entity's documents live in.
    fn collection() -> crate::document::CollectionName;

    /// The document id of this record.
    fn document_id(&self) -> DocumentId;

    /// The fully qualified key of this record.
    fn document_key(&self) -> DocumentKey {
        DocumentKey::new(Self::collection(), self.document_id())
    }
}

/// Serializes an entity into a document body.
pub(crate) fn encode<T: Entity>(entity: &T) -> CoreResult<Value> {
    serde_json::to_value(entity)
        .map_err(|err| CoreError::Store(StoreError::Serialization(err.to_string())))
}

/// Deserializes a document body into an entity.
pub(crate) fn decode<T: Entity>(document: VersionedDocument) -> CoreResult<T> {
    serde_json::from_value(document.body)
        .map_err(|err| CoreError::Store(StoreError::Serialization(err.to_string())))
}

/// Builds the key for an entity type and document id.
pub(crate) fn key_for<T: Entity>(id: &DocumentId) -> DocumentKey {
    DocumentKey::new(T::collection(), id.clone())
}

/// Uniform typed access to a single entity collection.
///
/// Holds a shared store handle; cheap to clone. Constructed explicitly and
/// injected wherever it is needed - there are no global instances.
pub struct Repository<T: Entity> {
    store: Arc<dyn DocumentStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    /// Creates a repository over the given store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Finds entities matching a filter, sorted and windowed per options.
    pub async fn find(&self, filter: &Filter, options: &FindOptions) -> CoreResult<Vec<T>> {
        let documents = self
            .store
            .query(&T::collection(), filter, options)
            .await
            .map_err(CoreError::from)?;
        documents.into_iter().map(decode).collect()
    }

    /// Finds the first entity matching a filter.
    pub async fn find_one(&self, filter: &Filter) -> CoreResult<Option<T>> {
        let options = FindOptions::new().with_limit(1);
        let mut found = self.find(filter, &options).await?;
        Ok(found.pop())
    }

    /// Finds an entity by document id.
    pub async fn find_by_id(&self, id: &DocumentId) -> CoreResult<Option<T>> {
        let mut documents = self
            .store
            .fetch(&[key_for::<T>(id)])
            .await
            .map_err(CoreError::from)?;
        match documents.pop().flatten() {
            Some(document) => Ok(Some(decode(document)?)),
            None => Ok(None),
        }
    }

    /// Counts entities matching a filter.
    pub async fn count(&self, filter: &Filter) -> CoreResult<u64> {
        self.store
            .count(&T::collection(), filter)
            .await
            .map_err(CoreError::from)
    }

    /// Whether any entity matches a filter.
    pub async fn exists(&self, filter: &Filter) -> CoreResult<bool> {
        Ok(self.count(filter).await? > 0)
    }

    /// Creates a new entity. Fails with `ConcurrencyConflict` if a document
    /// with the same id already exists.
    pub async fn create(&self, entity: &T) -> CoreResult<Revision> {
        self.put(entity, ExpectedRevision::New).await
    }

    /// Writes an entity with the given revision precondition.
    pub async fn put(&self, entity: &T, expected: ExpectedRevision) -> CoreResult<Revision> {
        let key = entity.document_key();
        let body = encode(entity)?;
        let mut revisions = self
            .store
            .commit(vec![DocumentWrite::put(key.clone(), expected, body)])
            .await
            .map_err(CoreError::from)?;
        revisions
            .remove(&key)
            .ok_or_else(|| CoreError::Internal(format!("commit returned no revision for {key}")))
    }

    /// Deletes an entity with the given revision precondition.
    pub async fn remove(&self, id: &DocumentId, expected: ExpectedRevision) -> CoreResult<()> {
        self.store
            .commit(vec![DocumentWrite::delete(key_for::<T>(id), expected)])
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }
}

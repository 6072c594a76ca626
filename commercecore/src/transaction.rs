//! Optimistic transactions over the document store.
//!
//! A [`Transaction`] is the session handle binding a sequence of reads and
//! staged writes to one atomic commit. Reads record the revision of every
//! document they return; staged updates and deletes carry that revision as
//! their precondition, so a racing writer makes the commit fail with a
//! retryable `ConcurrencyConflict` instead of silently losing the race.
//!
//! Rules enforced here:
//!
//! - `update`/`delete` require a prior `fetch` of the same document in the
//!   same transaction (read-modify-write with precondition).
//! - Reads see committed state, plus this transaction's own staged writes.
//! - Nothing is applied until [`Transaction::commit`]; dropping the
//!   transaction aborts it with no observable effects.
//!
//! Transactions do not nest. A function performing a transactional sub-step
//! takes `&mut Transaction` instead of opening its own.

use crate::document::{DocumentId, DocumentKey, DocumentWrite, ExpectedRevision, WriteOp};
use crate::errors::{CoreError, CoreResult, StoreError};
use crate::query::{Filter, FindOptions};
use crate::repository::{decode, encode, key_for, Entity};
use crate::store::DocumentStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A single atomic unit of reads and writes against the store.
pub struct Transaction {
    store: Arc<dyn DocumentStore>,
    observed: HashMap<DocumentKey, ExpectedRevision>,
    staged: Vec<DocumentWrite>,
    staged_index: HashMap<DocumentKey, usize>,
}

impl Transaction {
    /// Begins a new transaction against the store.
    pub fn begin(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            observed: HashMap::new(),
            staged: Vec::new(),
            staged_index: HashMap::new(),
        }
    }

    /// Reads an entity by id, recording its revision as the precondition for
    /// a later write. Sees this transaction's own staged writes.
    pub async fn fetch<T: Entity>(&mut self, id: &DocumentId) -> CoreResult<Option<T>> {
        let key = key_for::<T>(id);
        if let Some(&position) = self.staged_index.get(&key) {
            return match &self.staged[position].op {
                WriteOp::Put(body) => {
                    let entity = serde_json::from_value(body.clone()).map_err(|err| {
                        CoreError::Store(StoreError::Serialization(err.to_string()))
                    })?;
                    Ok(Some(entity))
                }
                WriteOp::Delete => Ok(None),
            };
        }

        let mut documents = self
            .store
            .fetch(std::slice::from_ref(&key))
            .await
            .map_err(CoreError::from)?;
        match documents.pop().flatten() {
            Some(document) => {
                self.observed
                    .insert(key, ExpectedRevision::Exact(document.revision));
                Ok(Some(decode(document)?))
            }
            None => {
                self.observed.insert(key, ExpectedRevision::New);
                Ok(None)
            }
        }
    }

    /// Reads an entity by id, failing with `NotFound` when absent.
    pub async fn fetch_required<T: Entity>(&mut self, id: &DocumentId) -> CoreResult<T> {
        self.fetch(id)
            .await?
            .ok_or_else(|| CoreError::not_found(T::collection(), id.clone()))
    }

    /// Finds the first committed entity matching a filter, recording its
    /// revision so it can be updated or deleted in this transaction.
    pub async fn find_one<T: Entity>(&mut self, filter: &Filter) -> CoreResult<Option<T>> {
        let options = FindOptions::new().with_limit(1);
        let mut documents = self
            .store
            .query(&T::collection(), filter, &options)
            .await
            .map_err(CoreError::from)?;
        match documents.pop() {
            Some(document) => {
                self.observed
                    .entry(document.key.clone())
                    .or_insert(ExpectedRevision::Exact(document.revision));
                Ok(Some(decode(document)?))
            }
            None => Ok(None),
        }
    }

    /// Stages the creation of a new entity.
    pub fn insert<T: Entity>(&mut self, entity: &T) -> CoreResult<()> {
        let key = entity.document_key();
        if self.staged_index.contains_key(&key) {
            return Err(CoreError::Internal(format!(
                "conflicting staged write for {key}"
            )));
        }
        let body = encode(entity)?;
        self.stage(DocumentWrite::put(key, ExpectedRevision::New, body));
        Ok(())
    }

    /// Stages an update of an entity previously fetched in this transaction.
    ///
    /// The write carries the revision observed at fetch time; a concurrent
    /// writer makes the commit fail rather than be overwritten.
    pub fn update<T: Entity>(&mut self, entity: &T) -> CoreResult<()> {
        let key = entity.document_key();
        let body = encode(entity)?;

        if let Some(&position) = self.staged_index.get(&key) {
            return match &mut self.staged[position].op {
                WriteOp::Put(existing) => {
                    *existing = body;
                    Ok(())
                }
                WriteOp::Delete => Err(CoreError::Internal(format!(
                    "update after staged delete for {key}"
                ))),
            };
        }

        match self.observed.get(&key) {
            Some(ExpectedRevision::Exact(revision)) => {
                let expected = ExpectedRevision::Exact(*revision);
                self.stage(DocumentWrite::put(key, expected, body));
                Ok(())
            }
            Some(_) => Err(CoreError::Internal(format!(
                "update of document not present at read time: {key}"
            ))),
            None => Err(CoreError::Internal(format!(
                "update without prior fetch in this transaction: {key}"
            ))),
        }
    }

    /// Stages the deletion of an entity previously fetched in this
    /// transaction.
    pub fn delete<T: Entity>(&mut self, id: &DocumentId) -> CoreResult<()> {
        let key = key_for::<T>(id);
        if self.staged_index.contains_key(&key) {
            return Err(CoreError::Internal(format!(
                "conflicting staged write for {key}"
            )));
        }
        match self.observed.get(&key) {
            Some(ExpectedRevision::Exact(revision)) => {
                let expected = ExpectedRevision::Exact(*revision);
                self.stage(DocumentWrite::delete(key, expected));
                Ok(())
            }
            Some(_) => Err(CoreError::Internal(format!(
                "delete of document not present at read time: {key}"
            ))),
            None => Err(CoreError::Internal(format!(
                "delete without prior fetch in this transaction: {key}"
            ))),
        }
    }

    /// Number of staged writes.
    pub fn staged_writes(&self) -> usize {
        self.staged.len()
    }

    /// Whether the transaction has nothing to commit.
    pub fn is_read_only(&self) -> bool {
        self.staged.is_empty()
    }

    /// Commits all staged writes atomically.
    ///
    /// A read-only transaction commits trivially. Any failure leaves the
    /// store untouched; `RevisionConflict` surfaces as the retryable
    /// `ConcurrencyConflict`.
    pub async fn commit(self) -> CoreResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        debug!(writes = self.staged.len(), "committing transaction");
        self.store
            .commit(self.staged)
            .await
            .map_err(CoreError::from)?;
        Ok(())
    }

    fn stage(&mut self, write: DocumentWrite) {
        self.staged_index
            .insert(write.key.clone(), self.staged.len());
        self.staged.push(write);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CollectionName, VersionedDocument};
    use crate::errors::StoreResult;
    use crate::types::Revision;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        value: u64,
    }

    impl Entity for Widget {
        fn collection() -> CollectionName {
            CollectionName::try_new("widgets").unwrap()
        }

        fn document_id(&self) -> DocumentId {
            DocumentId::try_new(self.id.clone()).unwrap()
        }
    }

    /// Minimal store for exercising transaction mechanics. No indexes.
    #[derive(Default)]
    struct FakeStore {
        documents: Mutex<HashMap<DocumentKey, (Revision, Value)>>,
    }

    #[async_trait]
    impl DocumentStore for FakeStore {
        async fn fetch(
            &self,
            keys: &[DocumentKey],
        ) -> StoreResult<Vec<Option<VersionedDocument>>> {
            let documents = self.documents.lock().unwrap();
            Ok(keys
                .iter()
                .map(|key| {
                    documents.get(key).map(|(revision, body)| {
                        VersionedDocument::new(key.clone(), *revision, body.clone())
                    })
                })
                .collect())
        }

        async fn query(
            &self,
            collection: &CollectionName,
            filter: &Filter,
            options: &FindOptions,
        ) -> StoreResult<Vec<VersionedDocument>> {
            let documents = self.documents.lock().unwrap();
            let mut found: Vec<_> = documents
                .iter()
                .filter(|(key, _)| &key.collection == collection)
                .filter(|(_, (_, body))| filter.matches(body))
                .map(|(key, (revision, body))| {
                    VersionedDocument::new(key.clone(), *revision, body.clone())
                })
                .collect();
            found.sort_by(|a, b| a.key.id.cmp(&b.key.id));
            if let Some(limit) = options.limit {
                found.truncate(limit);
            }
            Ok(found)
        }

        async fn count(&self, collection: &CollectionName, filter: &Filter) -> StoreResult<u64> {
            let found = self
                .query(collection, filter, &FindOptions::new())
                .await?;
            Ok(found.len() as u64)
        }

        async fn commit(
            &self,
            writes: Vec<DocumentWrite>,
        ) -> StoreResult<HashMap<DocumentKey, Revision>> {
            let mut documents = self.documents.lock().unwrap();

            for write in &writes {
                let current = documents.get(&write.key).map(|(revision, _)| *revision);
                match write.expected {
                    ExpectedRevision::New => {
                        if let Some(current) = current {
                            return Err(StoreError::RevisionConflict {
                                key: write.key.clone(),
                                expected: Revision::initial(),
                                current,
                            });
                        }
                    }
                    ExpectedRevision::Exact(expected) => {
                        let current = current.unwrap_or_else(Revision::initial);
                        if current != expected {
                            return Err(StoreError::RevisionConflict {
                                key: write.key.clone(),
                                expected,
                                current,
                            });
                        }
                    }
                    ExpectedRevision::Any => {}
                }
            }

            let mut revisions = HashMap::new();
            for write in writes {
                match write.op {
                    WriteOp::Put(body) => {
                        let next = documents
                            .get(&write.key)
                            .map_or_else(Revision::initial, |(revision, _)| *revision)
                            .next();
                        documents.insert(write.key.clone(), (next, body));
                        revisions.insert(write.key, next);
                    }
                    WriteOp::Delete => {
                        documents.remove(&write.key);
                    }
                }
            }
            Ok(revisions)
        }
    }

    fn widget(id: &str, value: u64) -> Widget {
        Widget {
            id: id.to_string(),
            value,
        }
    }

    async fn seed(store: &FakeStore, entity: &Widget) {
        let body = serde_json::to_value(entity).unwrap();
        store
            .commit(vec![DocumentWrite::put(
                entity.document_key(),
                ExpectedRevision::New,
                body,
            )])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fetch_then_update_commits_with_observed_revision() {
        let store = Arc::new(FakeStore::default());
        seed(&store, &widget("w1", 1)).await;

        let mut txn = Transaction::begin(store.clone() as Arc<dyn DocumentStore>);
        let mut found: Widget = txn
            .fetch_required(&DocumentId::try_new("w1").unwrap())
            .await
            .unwrap();
        found.value = 2;
        txn.update(&found).unwrap();
        txn.commit().await.unwrap();

        let documents = store.documents.lock().unwrap();
        let (revision, body) = &documents[&found.document_key()];
        assert_eq!(u64::from(*revision), 2);
        assert_eq!(body["value"], 2);
    }

    #[tokio::test]
    async fn update_without_prior_fetch_is_rejected() {
        let store = Arc::new(FakeStore::default());
        seed(&store, &widget("w1", 1)).await;

        let mut txn = Transaction::begin(store as Arc<dyn DocumentStore>);
        let err = txn.update(&widget("w1", 2)).unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
    }

    #[tokio::test]
    async fn reads_see_own_staged_writes() {
        let store = Arc::new(FakeStore::default());
        let mut txn = Transaction::begin(store as Arc<dyn DocumentStore>);

        txn.insert(&widget("w1", 7)).unwrap();
        let found: Option<Widget> = txn.fetch(&DocumentId::try_new("w1").unwrap()).await.unwrap();
        assert_eq!(found, Some(widget("w1", 7)));
    }

    #[tokio::test]
    async fn dropping_a_transaction_applies_nothing() {
        let store = Arc::new(FakeStore::default());
        {
            let mut txn = Transaction::begin(store.clone() as Arc<dyn DocumentStore>);
            txn.insert(&widget("w1", 7)).unwrap();
            // No commit.
        }
        assert!(store.documents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn racing_writer_causes_concurrency_conflict() {
        let store = Arc::new(FakeStore::default());
        seed(&store, &widget("w1", 1)).await;

        let mut txn = Transaction::begin(store.clone() as Arc<dyn DocumentStore>);
        let mut found: Widget = txn
            .fetch_required(&DocumentId::try_new("w1").unwrap())
            .await
            .unwrap();

        // Another writer commits in between.
        let mut racing = Transaction::begin(store.clone() as Arc<dyn DocumentStore>);
        let mut other: Widget = racing
            .fetch_required(&DocumentId::try_new("w1").unwrap())
            .await
            .unwrap();
        other.value = 99;
        racing.update(&other).unwrap();
        racing.commit().await.unwrap();

        found.value = 2;
        txn.update(&found).unwrap();
        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, CoreError::ConcurrencyConflict { .. }));

        // The losing transaction left no trace.
        let documents = store.documents.lock().unwrap();
        assert_eq!(documents[&other.document_key()].1["value"], 99);
    }

    #[tokio::test]
    async fn delete_requires_prior_fetch() {
        let store = Arc::new(FakeStore::default());
        seed(&store, &widget("w1", 1)).await;

        let mut txn = Transaction::begin(store.clone() as Arc<dyn DocumentStore>);
        let err = txn
            .delete::<Widget>(&DocumentId::try_new("w1").unwrap())
            .unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));

        let _: Widget = txn
            .fetch_required(&DocumentId::try_new("w1").unwrap())
            .await
            .unwrap();
        txn.delete::<Widget>(&DocumentId::try_new("w1").unwrap())
            .unwrap();
        txn.commit().await.unwrap();
        assert!(store.documents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_then_update_stays_one_write() {
        let store = Arc::new(FakeStore::default());
        let mut txn = Transaction::begin(store.clone() as Arc<dyn DocumentStore>);

        txn.insert(&widget("w1", 1)).unwrap();
        txn.update(&widget("w1", 5)).unwrap();
        assert_eq!(txn.staged_writes(), 1);
        txn.commit().await.unwrap();

        let documents = store.documents.lock().unwrap();
        let (revision, body) = documents.values().next().unwrap();
        assert_eq!(u64::from(*revision), 1);
        assert_eq!(body["value"], 5);
    }

    #[tokio::test]
    async fn read_only_transaction_commits_trivially() {
        let store = Arc::new(FakeStore::default());
        seed(&store, &widget("w1", 1)).await;

        let mut txn = Transaction::begin(store as Arc<dyn DocumentStore>);
        let _: Option<Widget> = txn.fetch(&DocumentId::try_new("w1").unwrap()).await.unwrap();
        assert!(txn.is_read_only());
        txn.commit().await.unwrap();
    }
}

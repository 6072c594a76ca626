//! In-memory backend for the `CommerceCore` document store
//!
//! This crate provides an in-memory implementation of the `DocumentStore`
//! trait from the commercecore crate, useful for testing and development
//! scenarios where persistence is not required. Commits are validated in
//! full - every revision precondition and every unique index - before
//! anything is applied, so a failed commit leaves the store untouched.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use commercecore::document::{
    CollectionName, DocumentId, DocumentKey, DocumentWrite, ExpectedRevision, UniqueIndex,
    VersionedDocument, WriteOp,
};
use commercecore::errors::{StoreError, StoreResult};
use commercecore::query::{Filter, FindOptions, SortOrder};
use commercecore::store::DocumentStore;
use commercecore::types::Revision;
use serde_json::Value;

#[derive(Debug, Clone)]
struct StoredDocument {
    revision: Revision,
    body: Value,
}

type Collections = HashMap<CollectionName, HashMap<DocumentId, StoredDocument>>;

/// Thread-safe in-memory document store.
#[derive(Clone)]
pub struct MemoryStore {
    // Maps collection names to their documents
    collections: Arc<RwLock<Collections>>,
    // Unique indexes validated on every commit
    indexes: Arc<Vec<UniqueIndex>>,
}

impl MemoryStore {
    /// Create a new empty store with no unique indexes.
    pub fn new() -> Self {
        Self::with_indexes(Vec::new())
    }

    /// Create a new empty store enforcing the given unique indexes.
    pub fn with_indexes(indexes: Vec<UniqueIndex>) -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            indexes: Arc::new(indexes),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn index_tuple(index: &UniqueIndex, body: &Value) -> Vec<Value> {
    index
        .fields
        .iter()
        .map(|field| body.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn render_tuple(tuple: &[Value]) -> String {
    tuple
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn value_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => value_rank(a).cmp(&value_rank(b)),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(&self, keys: &[DocumentKey]) -> StoreResult<Vec<Option<VersionedDocument>>> {
        let collections = self.collections.read().expect("RwLock poisoned");

        Ok(keys
            .iter()
            .map(|key| {
                collections
                    .get(&key.collection)
                    .and_then(|documents| documents.get(&key.id))
                    .map(|stored| {
                        VersionedDocument::new(key.clone(), stored.revision, stored.body.clone())
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
        let collections = self.collections.read().expect("RwLock poisoned");

        let mut found: Vec<VersionedDocument> = collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|(_, stored)| filter.matches(&stored.body))
                    .map(|(id, stored)| {
                        VersionedDocument::new(
                            DocumentKey::new(collection.clone(), id.clone()),
                            stored.revision,
                            stored.body.clone(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Stable ordering: requested sort key, falling back to document id.
        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| {
                let ordering = value_cmp(
                    a.body.get(&sort.field).unwrap_or(&Value::Null),
                    b.body.get(&sort.field).unwrap_or(&Value::Null),
                )
                .then_with(|| a.key.id.cmp(&b.key.id));
                match sort.order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        } else {
            found.sort_by(|a, b| a.key.id.cmp(&b.key.id));
        }

        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &CollectionName, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read().expect("RwLock poisoned");

        let count = collections
            .get(collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|stored| filter.matches(&stored.body))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn commit(
        &self,
        writes: Vec<DocumentWrite>,
    ) -> StoreResult<HashMap<DocumentKey, Revision>> {
        let mut collections = self.collections.write().expect("RwLock poisoned");

        // First, verify all revision preconditions match.
        for write in &writes {
            let current = collections
                .get(&write.key.collection)
                .and_then(|documents| documents.get(&write.key.id))
                .map(|stored| stored.revision);

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
                ExpectedRevision::Any => {
                    // No check needed
                }
            }
        }

        // Then, verify every unique index against the post-commit state.
        let staged: HashMap<&DocumentKey, Option<&Value>> = writes
            .iter()
            .map(|write| {
                let body = match &write.op {
                    WriteOp::Put(body) => Some(body),
                    WriteOp::Delete => None,
                };
                (&write.key, body)
            })
            .collect();

        for (position, write) in writes.iter().enumerate() {
            let WriteOp::Put(body) = &write.op else {
                continue;
            };
            for index in self
                .indexes
                .iter()
                .filter(|index| index.collection == write.key.collection)
            {
                let tuple = index_tuple(index, body);

                // Committed documents, excluding any rewritten or deleted
                // in this same commit.
                if let Some(documents) = collections.get(&write.key.collection) {
                    for (id, stored) in documents {
                        let key = DocumentKey::new(write.key.collection.clone(), id.clone());
                        if staged.contains_key(&key) {
                            continue;
                        }
                        if index_tuple(index, &stored.body) == tuple {
                            return Err(StoreError::DuplicateKey {
                                collection: index.collection.clone(),
                                fields: index.field_list(),
                                value: render_tuple(&tuple),
                            });
                        }
                    }
                }

                // Other staged writes in this commit.
                for other in writes.iter().take(position) {
                    let WriteOp::Put(other_body) = &other.op else {
                        continue;
                    };
                    if other.key.collection == write.key.collection
                        && other.key != write.key
                        && index_tuple(index, other_body) == tuple
                    {
                        return Err(StoreError::DuplicateKey {
                            collection: index.collection.clone(),
                            fields: index.field_list(),
                            value: render_tuple(&tuple),
                        });
                    }
                }
            }
        }

        // All checks passed, proceed with the writes.
        drop(staged);
        let mut new_revisions = HashMap::new();

        for write in writes {
            let documents = collections.entry(write.key.collection.clone()).or_default();
            match write.op {
                WriteOp::Put(body) => {
                    let next = documents
                        .get(&write.key.id)
                        .map_or_else(Revision::initial, |stored| stored.revision)
                        .next();
                    documents.insert(
                        write.key.id.clone(),
                        StoredDocument {
                            revision: next,
                            body,
                        },
                    );
                    new_revisions.insert(write.key, next);
                }
                WriteOp::Delete => {
                    documents.remove(&write.key.id);
                }
            }
        }

        Ok(new_revisions)
    }
}

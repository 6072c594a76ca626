//! Document value types for the transactional data access layer.
//!
//! A document is a JSON body stored under a `(collection, id)` key with a
//! monotonically increasing [`Revision`]. Writes carry an expected revision
//! for optimistic concurrency control; the store validates every expectation
//! before applying anything.

use crate::types::Revision;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The name of a document collection.
///
/// Guaranteed non-empty and at most 64 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CollectionName(String);

/// A document identifier within a collection.
///
/// Guaranteed non-empty and at most 64 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct DocumentId(String);

impl DocumentId {
    /// Build a document id from a displayable entity id.
    ///
    /// Entity ids are non-empty by construction, so this cannot fail.
    pub fn from_display(id: &impl std::fmt::Display) -> Self {
        Self::try_new(id.to_string()).expect("Entity ids are valid document ids")
    }
}

/// Fully qualified document address: collection plus id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    /// The collection the document lives in
    pub collection: CollectionName,
    /// The document id within the collection
    pub id: DocumentId,
}

impl DocumentKey {
    /// Creates a new document key.
    pub const fn new(collection: CollectionName, id: DocumentId) -> Self {
        Self { collection, id }
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as it exists in the store, with its current revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedDocument {
    /// The document's address
    pub key: DocumentKey,
    /// Revision at read time; the precondition for a later write
    pub revision: Revision,
    /// The JSON body
    pub body: Value,
}

impl VersionedDocument {
    /// Creates a new versioned document.
    pub const fn new(key: DocumentKey, revision: Revision, body: Value) -> Self {
        Self {
            key,
            revision,
            body,
        }
    }
}

/// Expected revision for optimistic concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedRevision {
    /// The document must not exist
    New,
    /// The document must exist at exactly this revision
    Exact(Revision),
    /// Any revision is acceptable (no concurrency control)
    Any,
}

/// The operation half of a staged write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or replace the document body
    Put(Value),
    /// Remove the document
    Delete,
}

/// A single write to apply within an atomic commit.
#[derive(Debug, Clone)]
pub struct DocumentWrite {
    /// The target document
    pub key: DocumentKey,
    /// The revision precondition for this write
    pub expected: ExpectedRevision,
    /// What to do to the document
    pub op: WriteOp,
}

impl DocumentWrite {
    /// A write that inserts or replaces a document body.
    pub const fn put(key: DocumentKey, expected: ExpectedRevision, body: Value) -> Self {
        Self {
            key,
            expected,
            op: WriteOp::Put(body),
        }
    }

    /// A write that removes a document.
    pub const fn delete(key: DocumentKey, expected: ExpectedRevision) -> Self {
        Self {
            key,
            expected,
            op: WriteOp::Delete,
        }
    }
}

/// A uniqueness constraint enforced by the store at commit time.
///
/// Violations surface as `StoreError::DuplicateKey` and never partially
/// apply a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    /// The collection the index guards
    pub collection: CollectionName,
    /// The document fields forming the unique tuple
    pub fields: Vec<String>,
}

impl UniqueIndex {
    /// Creates a unique index over the given fields of a collection.
    pub fn new(collection: CollectionName, fields: &[&str]) -> Self {
        Self {
            collection,
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    /// Comma-joined field list, used in error reporting.
    pub fn field_list(&self) -> String {
        self.fields.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_name_rejects_empty_and_long_values() {
        assert!(CollectionName::try_new("products").is_ok());
        assert!(CollectionName::try_new("   ").is_err());
        assert!(CollectionName::try_new("a".repeat(65)).is_err());
    }

    #[test]
    fn document_key_displays_as_path() {
        let key = DocumentKey::new(
            CollectionName::try_new("orders").unwrap(),
            DocumentId::try_new("ORD-1").unwrap(),
        );
        assert_eq!(key.to_string(), "orders/ORD-1");
    }

    #[test]
    fn document_write_constructors() {
        let key = DocumentKey::new(
            CollectionName::try_new("products").unwrap(),
            DocumentId::try_new("PRD-1").unwrap(),
        );

        let put = DocumentWrite::put(key.clone(), ExpectedRevision::New, json!({"stock": 5}));
        assert!(matches!(put.op, WriteOp::Put(_)));
        assert_eq!(put.expected, ExpectedRevision::New);

        let del = DocumentWrite::delete(key, ExpectedRevision::Exact(Revision::initial().next()));
        assert!(matches!(del.op, WriteOp::Delete));
    }

    #[test]
    fn unique_index_field_list() {
        let index = UniqueIndex::new(
            CollectionName::try_new("reviews").unwrap(),
            &["product_id", "user_id"],
        );
        assert_eq!(index.field_list(), "product_id,user_id");
    }

    #[test]
    fn versioned_document_roundtrips_through_json() {
        let doc = VersionedDocument::new(
            DocumentKey::new(
                CollectionName::try_new("products").unwrap(),
                DocumentId::try_new("PRD-1").unwrap(),
            ),
            Revision::try_new(3).unwrap(),
            json!({"sku": "LAP-0001"}),
        );
        let encoded = serde_json::to_string(&doc).unwrap();
        let decoded: VersionedDocument = serde_json::from_str(&encoded).unwrap();
        assert_eq!(doc, decoded);
    }
}

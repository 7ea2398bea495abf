//! Record store adapter.
//!
//! Collections hold loosely typed BSON documents keyed by an opaque string id
//! (`_id`) that the store assigns on insert. Besides plain reads and writes the
//! adapter exposes a handful of conditional writes that must be atomic on the
//! backing store: they are the only mutual exclusion the portal relies on.

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::StoreError;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub const ID_FIELD: &str = "_id";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Op {
    Eq,
    /// The field holds an array that contains the value.
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Op,
    pub value: Bson,
}

impl Predicate {
    pub fn eq(field: impl ToString, value: impl Into<Bson>) -> Predicate {
        Predicate {
            field: field.to_string(),
            op: Op::Eq,
            value: value.into(),
        }
    }

    pub fn contains(field: impl ToString, value: impl Into<Bson>) -> Predicate {
        Predicate {
            field: field.to_string(),
            op: Op::ArrayContains,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

impl Query {
    pub fn new() -> Query {
        Query::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Query {
        self.predicates.push(predicate);
        self
    }

    pub fn eq(self, field: impl ToString, value: impl Into<Bson>) -> Query {
        self.filter(Predicate::eq(field, value))
    }

    pub fn contains(self, field: impl ToString, value: impl Into<Bson>) -> Query {
        self.filter(Predicate::contains(field, value))
    }

    pub fn order_by(mut self, field: impl ToString, direction: Direction) -> Query {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Query {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Query {
        self.skip = Some(skip);
        self
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query_many(&self, collection: &str, query: &Query)
        -> Result<Vec<Document>, StoreError>;

    /// Inserts `data` and returns the id assigned to it.
    async fn insert(&self, collection: &str, data: Document) -> Result<String, StoreError>;

    /// Inserts `data` unless a record matching every `key` predicate exists.
    ///
    /// Returns `None` on conflict.
    async fn insert_unique(
        &self,
        collection: &str,
        key: &[Predicate],
        data: Document,
    ) -> Result<Option<String>, StoreError>;

    /// Overwrites the fields of the record matching `key`, inserting it if
    /// there is none. Returns the id of the written record.
    async fn upsert(
        &self,
        collection: &str,
        key: &[Predicate],
        data: Document,
    ) -> Result<String, StoreError>;

    /// Sets the fields in `patch`. Returns `false` when the record doesn't exist.
    async fn update(&self, collection: &str, id: &str, patch: Document)
        -> Result<bool, StoreError>;

    /// Compare-and-set: applies `patch` to one record matching all `expected`
    /// predicates and returns the updated record.
    async fn claim_one(
        &self,
        collection: &str,
        expected: &[Predicate],
        patch: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Adds `value` to the array `field`. `None` if the record doesn't exist,
    /// `Some(false)` if the value was already present.
    async fn add_to_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<Option<bool>, StoreError>;

    /// Removes `value` from the array `field`. `None` if the record doesn't
    /// exist, `Some(false)` if the value wasn't present.
    async fn pull(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<Option<bool>, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn check_key(key: &[Predicate]) -> Result<(), StoreError> {
    match key.iter().find(|p| p.op != Op::Eq) {
        Some(p) => Err(StoreError::MalformedKey(p.field.clone())),
        None => Ok(()),
    }
}

pub(crate) fn document_id(collection: &str, doc: &Document) -> Result<String, StoreError> {
    doc.get_str(ID_FIELD)
        .map(str::to_string)
        .map_err(|_| StoreError::MissingId(collection.to_string()))
}

use bson::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ServiceError, ServiceResult};
use crate::store::{Query, RecordStore};

pub mod assignment;
pub mod class;
pub mod enrollment;
pub mod grade;
pub mod guardian;
pub mod lesson;
pub mod schedule;
pub mod subject;
pub mod user;

/// A typed view of a document living in a named collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;
}

pub(crate) fn to_document<T: Serialize>(value: &T) -> ServiceResult<Document> {
    Ok(bson::to_document(value)?)
}

pub(crate) fn from_document<T: Record>(doc: Document) -> ServiceResult<T> {
    Ok(bson::from_document(doc)?)
}

pub(crate) async fn fetch_optional<T: Record>(
    store: &dyn RecordStore,
    id: &str,
) -> ServiceResult<Option<T>> {
    store
        .get_one(T::COLLECTION, id)
        .await?
        .map(from_document)
        .transpose()
}

pub(crate) async fn fetch<T: Record>(store: &dyn RecordStore, id: &str) -> ServiceResult<T> {
    fetch_optional(store, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(T::COLLECTION, id))
}

pub(crate) async fn find<T: Record>(
    store: &dyn RecordStore,
    query: &Query,
) -> ServiceResult<Vec<T>> {
    store
        .query_many(T::COLLECTION, query)
        .await?
        .into_iter()
        .map(from_document)
        .collect()
}

/// Inserts `record` and returns it with the id the store assigned.
pub(crate) async fn create<T: Record>(
    store: &dyn RecordStore,
    record: &T,
) -> ServiceResult<String> {
    Ok(store.insert(T::COLLECTION, to_document(record)?).await?)
}

pub(crate) fn require_text(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::invalid(format!("{} can't be empty", field)));
    }
    Ok(())
}

/// Paging window applied to list queries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Page {
    pub length: u32,
    pub page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            length: 20,
            page: 0,
        }
    }
}

impl Page {
    pub fn apply(self, query: Query) -> Query {
        query
            .limit(i64::from(self.length.max(1)))
            .skip(u64::from(self.page) * u64::from(self.length.max(1)))
    }
}

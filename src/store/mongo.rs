use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};

use super::{check_key, document_id, new_id, Direction, Op, Predicate, Query, RecordStore, ID_FIELD};
use crate::error::StoreError;

const DUPLICATE_KEY: i32 = 11000;

/// Record store backed by a MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> MongoStore {
        MongoStore { db }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    /// Creates the unique indexes backing `insert_unique` keys.
    pub async fn ensure_indexes(
        &self,
        unique_keys: &[(&str, &[&str])],
    ) -> Result<(), StoreError> {
        for (collection, fields) in unique_keys {
            let mut keys = Document::new();
            for field in fields.iter() {
                keys.insert(*field, 1);
            }
            tracing::debug!("ensuring unique index on {} {:?}", collection, fields);

            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.collection(collection).create_index(index, None).await?;
        }
        Ok(())
    }
}

fn filter(predicates: &[Predicate]) -> Document {
    if predicates.is_empty() {
        return Document::new();
    }

    let clauses: Vec<Bson> = predicates
        .iter()
        .map(|p| match p.op {
            Op::Eq => Bson::Document(doc! { p.field.as_str(): p.value.clone() }),
            Op::ArrayContains => Bson::Document(doc! {
                p.field.as_str(): { "$elemMatch": { "$eq": p.value.clone() } }
            }),
        })
        .collect();

    doc! { "$and": clauses }
}

fn key_filter(key: &[Predicate]) -> Result<Document, StoreError> {
    check_key(key)?;
    let mut filter = Document::new();
    for p in key {
        filter.insert(p.field.clone(), p.value.clone());
    }
    Ok(filter)
}

fn without_id(mut data: Document) -> Document {
    data.remove(ID_FIELD);
    data
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn get_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collection(collection)
            .find_one(doc! { ID_FIELD: id }, None)
            .await?)
    }

    async fn query_many(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let sort = query.order_by.as_ref().map(|(field, direction)| {
            let order = match direction {
                Direction::Asc => 1,
                Direction::Desc => -1,
            };
            doc! { field.as_str(): order }
        });

        let options = FindOptions::builder()
            .sort(sort)
            .limit(query.limit)
            .skip(query.skip)
            .build();

        let cursor = self
            .collection(collection)
            .find(filter(&query.predicates), options)
            .await?;

        Ok(cursor.try_collect::<Vec<Document>>().await?)
    }

    async fn insert(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let id = new_id();
        let mut record = without_id(data);
        record.insert(ID_FIELD, id.as_str());

        self.collection(collection).insert_one(record, None).await?;
        Ok(id)
    }

    async fn insert_unique(
        &self,
        collection: &str,
        key: &[Predicate],
        data: Document,
    ) -> Result<Option<String>, StoreError> {
        let filter = key_filter(key)?;
        let id = new_id();
        let mut record = without_id(data);
        record.insert(ID_FIELD, id.as_str());

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::Before)
            .build();

        match self
            .collection(collection)
            .find_one_and_update(filter, doc! { "$setOnInsert": record }, options)
            .await
        {
            Ok(Some(_existing)) => Ok(None),
            Ok(None) => Ok(Some(id)),
            Err(e) if is_duplicate_key(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(
        &self,
        collection: &str,
        key: &[Predicate],
        data: Document,
    ) -> Result<String, StoreError> {
        let filter = key_filter(key)?;
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let update = doc! {
            "$set": without_id(data),
            "$setOnInsert": { ID_FIELD: new_id() },
        };

        let written = self
            .collection(collection)
            .find_one_and_update(filter, update, options)
            .await?
            .ok_or_else(|| StoreError::MissingId(collection.to_string()))?;

        document_id(collection, &written)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<bool, StoreError> {
        let result = self
            .collection(collection)
            .update_one(doc! { ID_FIELD: id }, doc! { "$set": without_id(patch) }, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn claim_one(
        &self,
        collection: &str,
        expected: &[Predicate],
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Ok(self
            .collection(collection)
            .find_one_and_update(
                filter(expected),
                doc! { "$set": without_id(patch) },
                options,
            )
            .await?)
    }

    async fn add_to_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<Option<bool>, StoreError> {
        let result = self
            .collection(collection)
            .update_one(doc! { ID_FIELD: id }, doc! { "$addToSet": { field: value } }, None)
            .await?;

        Ok(match result.matched_count {
            0 => None,
            _ => Some(result.modified_count > 0),
        })
    }

    async fn pull(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<Option<bool>, StoreError> {
        let result = self
            .collection(collection)
            .update_one(doc! { ID_FIELD: id }, doc! { "$pull": { field: value } }, None)
            .await?;

        Ok(match result.matched_count {
            0 => None,
            _ => Some(result.modified_count > 0),
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = self
            .collection(collection)
            .delete_one(doc! { ID_FIELD: id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_translate_predicates() {
        let built = filter(&[
            Predicate::eq("class_id", "c1"),
            Predicate::contains("students", "s1"),
        ]);
        assert_eq!(
            built,
            doc! { "$and": [
                { "class_id": "c1" },
                { "students": { "$elemMatch": { "$eq": "s1" } } },
            ] }
        );
        assert!(filter(&[]).is_empty());
    }

    #[test]
    fn key_filters_reject_array_predicates() {
        assert_eq!(
            key_filter(&[Predicate::eq("a", 1), Predicate::eq("b", true)]).unwrap(),
            doc! { "a": 1, "b": true }
        );
        assert!(matches!(
            key_filter(&[Predicate::contains("a", 1)]),
            Err(StoreError::MalformedKey(field)) if field == "a"
        ));
    }
}

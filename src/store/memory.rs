use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bson::{Bson, Document};
use tokio::sync::RwLock;

use super::{check_key, new_id, Direction, Op, Predicate, Query, RecordStore, ID_FIELD};
use crate::error::StoreError;

type Collection = BTreeMap<String, Document>;

/// In-process record store.
///
/// Every operation runs under a single write lock, which makes the
/// conditional operations atomic in the same way the MongoDB adapter is.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of records currently held in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

fn matches(doc: &Document, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|p| match (p.op, doc.get(&p.field)) {
        (Op::Eq, Some(value)) => value == &p.value,
        (Op::Eq, None) => p.value == Bson::Null,
        (Op::ArrayContains, Some(Bson::Array(items))) => items.contains(&p.value),
        (Op::ArrayContains, _) => false,
    })
}

fn compare(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    fn number(value: &Bson) -> Option<f64> {
        match value {
            Bson::Int32(it) => Some(*it as f64),
            Bson::Int64(it) => Some(*it as f64),
            Bson::Double(it) => Some(*it),
            _ => None,
        }
    }

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Bson::String(a), Bson::String(b)) => a.cmp(b),
            (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
            (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
            _ => match (number(a), number(b)) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        },
    }
}

fn apply_patch(doc: &mut Document, patch: Document) {
    for (key, value) in patch {
        if key != ID_FIELD {
            doc.insert(key, value);
        }
    }
}

fn seeded(id: &str, key: &[Predicate], data: Document) -> Document {
    let mut doc = Document::new();
    doc.insert(ID_FIELD, id);
    for p in key {
        doc.insert(p.field.clone(), p.value.clone());
    }
    apply_patch(&mut doc, data);
    doc
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn query_many(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let mut found: Vec<Document> = match collections.get(collection) {
            Some(c) => c
                .values()
                .filter(|doc| matches(doc, &query.predicates))
                .cloned()
                .collect(),
            None => return Ok(vec![]),
        };

        if let Some((field, direction)) = &query.order_by {
            found.sort_by(|a, b| {
                let ordering = compare(a.get(field), b.get(field));
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = match query.limit {
            Some(limit) if limit > 0 => limit as usize,
            _ => usize::MAX,
        };

        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn insert(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let id = new_id();
        let doc = seeded(&id, &[], data);
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), doc);
        Ok(id)
    }

    async fn insert_unique(
        &self,
        collection: &str,
        key: &[Predicate],
        data: Document,
    ) -> Result<Option<String>, StoreError> {
        check_key(key)?;
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();

        if records.values().any(|doc| matches(doc, key)) {
            return Ok(None);
        }

        let id = new_id();
        records.insert(id.clone(), seeded(&id, key, data));
        Ok(Some(id))
    }

    async fn upsert(
        &self,
        collection: &str,
        key: &[Predicate],
        data: Document,
    ) -> Result<String, StoreError> {
        check_key(key)?;
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();

        if let Some((id, doc)) = records.iter_mut().find(|(_, doc)| matches(doc, key)) {
            apply_patch(doc, data);
            return Ok(id.clone());
        }

        let id = new_id();
        records.insert(id.clone(), seeded(&id, key, data));
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection).and_then(|c| c.get_mut(id)) {
            Some(doc) => {
                apply_patch(doc, patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn claim_one(
        &self,
        collection: &str,
        expected: &[Predicate],
        patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|c| c.values_mut().find(|doc| matches(doc, expected)));

        Ok(doc.map(|doc| {
            apply_patch(doc, patch);
            doc.clone()
        }))
    }

    async fn add_to_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<Option<bool>, StoreError> {
        let mut collections = self.collections.write().await;
        let doc = match collections.get_mut(collection).and_then(|c| c.get_mut(id)) {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let mut items = match doc.get(field) {
            Some(Bson::Array(items)) => items.clone(),
            _ => vec![],
        };
        if items.contains(&value) {
            return Ok(Some(false));
        }
        items.push(value);
        doc.insert(field, items);
        Ok(Some(true))
    }

    async fn pull(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Bson,
    ) -> Result<Option<bool>, StoreError> {
        let mut collections = self.collections.write().await;
        let doc = match collections.get_mut(collection).and_then(|c| c.get_mut(id)) {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let items = match doc.get(field) {
            Some(Bson::Array(items)) => items.clone(),
            _ => return Ok(Some(false)),
        };
        let before = items.len();
        let remaining: Vec<Bson> = items.into_iter().filter(|it| it != &value).collect();
        let changed = remaining.len() != before;
        doc.insert(field, remaining);
        Ok(Some(changed))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::future::Future;
    use std::sync::Arc;

    use super::*;
    use crate::store::document_id;
    use bson::doc;
    use futures::future::join_all;
    use tokio::sync::Barrier;

    /// Runs `n` tasks on the runtime's worker threads, releasing them all at once.
    pub(crate) async fn race<T, F, Fut>(n: usize, task: F) -> Vec<T>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let start = Arc::new(Barrier::new(n));
        let handles = (0..n).map(|i| {
            let start = start.clone();
            let work = task(i);
            tokio::spawn(async move {
                start.wait().await;
                work.await
            })
        });

        join_all(handles)
            .await
            .into_iter()
            .map(|it| it.expect("task panicked"))
            .collect()
    }

    fn unused_code() -> [Predicate; 2] {
        [Predicate::eq("code", "X1"), Predicate::eq("consumed", false)]
    }

    fn unused_code_query() -> Query {
        Query::new().eq("code", "X1").eq("consumed", false).limit(1)
    }

    /// Claims the code with a separate read and write, pausing in between
    /// until every contender has read.
    async fn read_then_write(store: &MemoryStore, all_read: &Barrier) -> bool {
        let found = store
            .query_many("codes", &unused_code_query())
            .await
            .expect("query");
        all_read.wait().await;

        match found.first() {
            Some(code) => {
                let id = document_id("codes", code).expect("id");
                store
                    .update("codes", &id, doc! { "consumed": true })
                    .await
                    .expect("update")
            }
            None => false,
        }
    }

    #[tokio::test]
    async fn queries_filter_order_and_page() {
        let store = MemoryStore::new();
        let items = [("a", 3i64, vec!["x"]), ("b", 1, vec!["y"]), ("c", 2, vec!["x", "y"])];
        for (name, due, tags) in items {
            store
                .insert("items", doc! { "name": name, "due": due, "tags": tags })
                .await
                .expect("insert");
        }

        let tagged = store
            .query_many(
                "items",
                &Query::new().contains("tags", "x").order_by("due", Direction::Desc),
            )
            .await
            .expect("query");
        let names: Vec<_> = tagged.iter().map(|d| d.get_str("name").unwrap()).collect();
        assert_eq!(names, vec!["a", "c"]);

        let paged = store
            .query_many("items", &Query::new().order_by("due", Direction::Asc).skip(1).limit(1))
            .await
            .expect("query");
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].get_str("name").unwrap(), "c");

        assert!(store
            .query_many("missing", &Query::new())
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn claim_one_succeeds_once_under_contention() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("codes", doc! { "code": "X1", "consumed": false })
            .await
            .expect("insert");

        let results = race(16, |_| {
            let store = store.clone();
            async move {
                store
                    .claim_one("codes", &unused_code(), doc! { "consumed": true })
                    .await
                    .expect("claim")
            }
        })
        .await;

        assert_eq!(results.iter().filter(|it| it.is_some()).count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn read_then_write_claims_more_than_once() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("codes", doc! { "code": "X1", "consumed": false })
            .await
            .expect("insert");

        let all_read = Arc::new(Barrier::new(16));
        let results = race(16, |_| {
            let store = store.clone();
            let all_read = all_read.clone();
            async move { read_then_write(&store, &all_read).await }
        })
        .await;

        assert_eq!(results.iter().filter(|it| **it).count(), 16);
    }

    #[tokio::test]
    async fn insert_unique_and_upsert_respect_keys() {
        let store = MemoryStore::new();
        let key = [Predicate::eq("a", "1"), Predicate::eq("b", "2")];

        let first = store
            .insert_unique("links", &key, doc! { "kind": "mother" })
            .await
            .expect("insert");
        assert!(first.is_some());
        let second = store
            .insert_unique("links", &key, doc! { "kind": "father" })
            .await
            .expect("insert");
        assert!(second.is_none());

        let id = store.upsert("grades", &key, doc! { "value": 5.0 }).await.expect("upsert");
        let same = store.upsert("grades", &key, doc! { "value": 7.5 }).await.expect("upsert");
        assert_eq!(id, same);
        assert_eq!(store.count("grades").await, 1);
        let stored = store.get_one("grades", &id).await.expect("get").expect("exists");
        assert_eq!(stored.get_f64("value").unwrap(), 7.5);
        assert_eq!(stored.get_str("a").unwrap(), "1");

        let contains = [Predicate::contains("a", "1")];
        assert!(store.upsert("grades", &contains, doc! {}).await.is_err());
    }

    #[tokio::test]
    async fn set_edits_report_changes() {
        let store = MemoryStore::new();
        let id = store
            .insert("classes", doc! { "students": Vec::<String>::new() })
            .await
            .expect("insert");

        let s1 = || Bson::from("s1");
        let added = store.add_to_set("classes", &id, "students", s1()).await;
        assert_eq!(added.unwrap(), Some(true));
        let added = store.add_to_set("classes", &id, "students", s1()).await;
        assert_eq!(added.unwrap(), Some(false));
        let added = store.add_to_set("classes", "nope", "students", s1()).await;
        assert_eq!(added.unwrap(), None);

        let pulled = store.pull("classes", &id, "students", "s2".into()).await;
        assert_eq!(pulled.unwrap(), Some(false));
        let pulled = store.pull("classes", &id, "students", s1()).await;
        assert_eq!(pulled.unwrap(), Some(true));

        assert!(store.delete("classes", &id).await.unwrap());
        assert!(!store.delete("classes", &id).await.unwrap());
    }
}

//! In-memory document store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use diarist_core::document::{
    CollectionRef, Document, DocumentRef, DocumentStore, Query, Snapshot, WriteMode, merge_documents,
};
use diarist_core::error::StoreError;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Documents keyed by full path in an ordered map, so a collection's
/// descendants form one contiguous key range.
pub struct InMemoryDocumentStore {
    docs: Arc<RwLock<BTreeMap<String, Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            docs: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The child segment of `path` directly under `prefix` (which ends with '/').
fn child_segment<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix)
        .map(|rest| rest.split('/').next().unwrap_or(rest))
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        doc.validate()?;
        Ok(self.docs.read().await.get(&doc.path()).cloned())
    }

    async fn set(&self, doc: &DocumentRef, data: Document, mode: WriteMode) -> Result<(), StoreError> {
        doc.validate()?;
        let path = doc.path();
        let mut docs = self.docs.write().await;
        if mode == WriteMode::Merge {
            if let Some(existing) = docs.get_mut(&path) {
                merge_documents(existing, data);
                return Ok(());
            }
        }
        docs.insert(path, data);
        Ok(())
    }

    async fn create(&self, doc: &DocumentRef, data: Document) -> Result<(), StoreError> {
        doc.validate()?;
        match self.docs.write().await.entry(doc.path()) {
            Entry::Occupied(slot) => Err(StoreError::AlreadyExists(slot.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(data);
                Ok(())
            }
        }
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        doc.validate()?;
        self.docs.write().await.remove(&doc.path());
        Ok(())
    }

    async fn query(&self, collection: &CollectionRef, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        collection.validate()?;
        let prefix = format!("{}/", collection.path());
        let docs = self.docs.read().await;
        let children: Vec<Snapshot> = docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(path, data)| Snapshot::new(&path[prefix.len()..], data.clone()))
            .collect();
        Ok(query.apply(children))
    }

    async fn list_ids(&self, collection: &CollectionRef) -> Result<Vec<String>, StoreError> {
        collection.validate()?;
        let prefix = format!("{}/", collection.path());
        let docs = self.docs.read().await;
        let mut ids: Vec<String> = docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, _)| child_segment(path, &prefix))
            .map(String::from)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diarist_core::document::Direction;
    use serde_json::json;

    fn body(v: serde_json::Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn set_get_and_merge() {
        let store = InMemoryDocumentStore::new();
        let doc = CollectionRef::root("users").doc("u1").collection("entries").doc("2024-01-01");

        store
            .set(&doc, body(json!({"title": "A", "theme": "dark"})), WriteMode::Overwrite)
            .await
            .unwrap();
        store.set(&doc, body(json!({"title": "B"})), WriteMode::Merge).await.unwrap();

        let got = store.get(&doc).await.unwrap().unwrap();
        assert_eq!(got["title"], json!("B"));
        assert_eq!(got["theme"], json!("dark"));

        store.set(&doc, body(json!({"title": "C"})), WriteMode::Overwrite).await.unwrap();
        let got = store.get(&doc).await.unwrap().unwrap();
        assert!(got.get("theme").is_none());
    }

    #[tokio::test]
    async fn query_sees_only_direct_children() {
        let store = InMemoryDocumentStore::new();
        let users = CollectionRef::root("users");
        let fumiko = users.doc("u1").collection("models").doc("fumiko").collection("messages");
        let krishna = users.doc("u1").collection("models").doc("krishna").collection("messages");

        store.add(&fumiko, body(json!({"n": 1}))).await.unwrap();
        store.add(&fumiko, body(json!({"n": 2}))).await.unwrap();
        store.add(&krishna, body(json!({"n": 3}))).await.unwrap();

        let got = store
            .query(&fumiko, &Query::new().order_by("n", Direction::Ascending))
            .await
            .unwrap();
        let ns: Vec<i64> = got.iter().map(|s| s.data["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2]);
    }

    #[tokio::test]
    async fn list_ids_includes_implicit_parents() {
        let store = InMemoryDocumentStore::new();
        let users = CollectionRef::root("users");
        store
            .set(&users.doc("bob").collection("entries").doc("2024-01-01"), Document::new(), WriteMode::Overwrite)
            .await
            .unwrap();
        store
            .set(&users.doc("alice").collection("entries").doc("2024-01-01"), Document::new(), WriteMode::Overwrite)
            .await
            .unwrap();
        store
            .set(&users.doc("alice").collection("entries").doc("2024-01-02"), Document::new(), WriteMode::Overwrite)
            .await
            .unwrap();

        assert_eq!(store.list_ids(&users).await.unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn create_refuses_to_replace() {
        let store = InMemoryDocumentStore::new();
        let doc = CollectionRef::root("c").doc("d");
        store.create(&doc, body(json!({"v": 1}))).await.unwrap();
        let err = store.create(&doc, body(json!({"v": 2}))).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.get(&doc).await.unwrap().unwrap()["v"], json!(1));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryDocumentStore::new();
        let doc = CollectionRef::root("c").doc("d");
        store.delete(&doc).await.unwrap();
        store.set(&doc, Document::new(), WriteMode::Overwrite).await.unwrap();
        store.delete(&doc).await.unwrap();
        assert!(store.get(&doc).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }
}

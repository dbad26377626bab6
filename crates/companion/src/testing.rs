//! Shared test doubles: a scripted model, a store that fails on demand and
//! a media store that records uploads.

use async_trait::async_trait;
use diarist_core::document::{CollectionRef, Document, DocumentRef, DocumentStore, Query, Snapshot, WriteMode};
use diarist_core::error::{MediaError, ProviderError, StoreError};
use diarist_core::media::{MediaStore, Upload};
use diarist_core::provider::{Provider, ProviderRequest, ProviderResponse};
use diarist_store::InMemoryDocumentStore;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns scripted replies in order; the last one repeats once the queue
/// is down to a single reply.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn failing(err: ProviderError) -> Self {
        Self::new(vec![Err(err)])
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().expect("ScriptedProvider needs at least one reply")
        };
        reply.map(|text| ProviderResponse {
            text,
            usage: None,
            model: request.model,
        })
    }
}

/// In-memory store that fails every operation touching a path containing
/// one of the configured segments, and counts operations.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryDocumentStore,
    failing: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, segment: &str) {
        self.failing.lock().unwrap().push(segment.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, path: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.lock().unwrap();
        if failing.iter().any(|seg| path.split('/').any(|p| p == seg)) {
            return Err(StoreError::QueryFailed(format!("injected failure at {path}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        self.check(&doc.path())?;
        self.inner.get(doc).await
    }

    async fn set(&self, doc: &DocumentRef, data: Document, mode: WriteMode) -> Result<(), StoreError> {
        self.check(&doc.path())?;
        self.inner.set(doc, data, mode).await
    }

    async fn create(&self, doc: &DocumentRef, data: Document) -> Result<(), StoreError> {
        self.check(&doc.path())?;
        self.inner.create(doc, data).await
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), StoreError> {
        self.check(&doc.path())?;
        self.inner.delete(doc).await
    }

    async fn query(&self, collection: &CollectionRef, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        self.check(&collection.path())?;
        self.inner.query(collection, query).await
    }

    async fn list_ids(&self, collection: &CollectionRef) -> Result<Vec<String>, StoreError> {
        self.check(&collection.path())?;
        self.inner.list_ids(collection).await
    }
}

/// Media store that hands out predictable URLs and can reject given fields.
#[derive(Default)]
pub struct RecordingMedia {
    rejected: Vec<String>,
    uploads: Mutex<Vec<(String, String)>>,
}

impl RecordingMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(fields: &[&str]) -> Self {
        Self {
            rejected: fields.iter().map(|f| f.to_string()).collect(),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// `(folder, field)` pairs of accepted uploads.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStore for RecordingMedia {
    fn name(&self) -> &str {
        "recording"
    }

    async fn upload(&self, folder: &str, upload: &Upload) -> Result<String, MediaError> {
        if self.rejected.contains(&upload.field) {
            return Err(MediaError::Storage(format!("rejected {}", upload.field)));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((folder.to_string(), upload.field.clone()));
        Ok(format!("https://cdn.test/{folder}/{}", upload.field))
    }
}

//! Entry store adapter: `users/{user}/entries/{date_id}`.

use chrono::{DateTime, Utc};
use diarist_core::auth::UserId;
use diarist_core::document::{
    CollectionRef, Direction, DocumentStore, FilterOp, Query, Snapshot, WriteMode, merge_documents,
    to_document,
};
use diarist_core::error::{Error, Result};
use diarist_core::journal::{DateId, EntryDraft, EntrySummary, JournalEntry};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::user_doc;

#[derive(Clone)]
pub struct EntryStore {
    store: Arc<dyn DocumentStore>,
}

impl EntryStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn collection(user: &UserId) -> CollectionRef {
        user_doc(user).collection("entries")
    }

    /// Merge-write one day's entry and return the stored result.
    ///
    /// `created_at` is written only when the entry has none; `updated_at` is
    /// refreshed on every call. Presentation defaults are filled on first
    /// write only, so a later partial save never resets them.
    pub async fn upsert_entry(&self, user: &UserId, date_id: &DateId, draft: EntryDraft) -> Result<JournalEntry> {
        let doc = Self::collection(user).doc(date_id.as_str());
        let existing = self.store.get(&doc).await?;
        let now = Utc::now();

        let mut patch = to_document(&draft)?;
        patch.insert("date_id".into(), json!(date_id));
        patch.insert("updated_at".into(), json!(now));

        let has_created = existing
            .as_ref()
            .and_then(|d| d.get("created_at"))
            .is_some_and(|v| !v.is_null());
        if !has_created {
            patch.insert("created_at".into(), json!(now));
        }
        if existing.is_none() {
            let defaults = JournalEntry::new(date_id.clone());
            patch.entry("title").or_insert_with(|| json!(defaults.title));
            patch.entry("theme").or_insert_with(|| json!(defaults.theme));
            patch.entry("font").or_insert_with(|| json!(defaults.font));
            patch.entry("blocks").or_insert_with(|| json!([]));
        }

        self.store.set(&doc, patch.clone(), WriteMode::Merge).await?;
        debug!(user = %user, date_id = %date_id, created = existing.is_none(), "Entry saved");

        let mut merged = existing.unwrap_or_default();
        merge_documents(&mut merged, patch);
        Ok(Snapshot::new(date_id.as_str(), merged).decode()?)
    }

    /// Summaries, newest first by creation time.
    pub async fn list_entries(&self, user: &UserId) -> Result<Vec<EntrySummary>> {
        let query = Query::new().order_by("created_at", Direction::Descending);
        let snapshots = self.store.query(&Self::collection(user), &query).await?;
        Ok(decode_entries(snapshots).iter().map(JournalEntry::summary).collect())
    }

    pub async fn get_entry(&self, user: &UserId, date_id: &DateId) -> Result<JournalEntry> {
        let doc = Self::collection(user).doc(date_id.as_str());
        match self.store.get(&doc).await? {
            Some(data) => Ok(Snapshot::new(date_id.as_str(), data).decode()?),
            None => Err(Error::not_found(format!("entry {date_id}"))),
        }
    }

    /// Deleting an absent entry succeeds.
    pub async fn delete_entry(&self, user: &UserId, date_id: &DateId) -> Result<()> {
        let doc = Self::collection(user).doc(date_id.as_str());
        self.store.delete(&doc).await?;
        debug!(user = %user, date_id = %date_id, "Entry deleted");
        Ok(())
    }

    /// Entries created at or after `since`, newest first.
    pub async fn query_recent(&self, user: &UserId, since: DateTime<Utc>) -> Result<Vec<JournalEntry>> {
        let query = Query::new()
            .filter("created_at", FilterOp::Gte, json!(since))
            .order_by("created_at", Direction::Descending);
        let snapshots = self.store.query(&Self::collection(user), &query).await?;
        Ok(decode_entries(snapshots))
    }

    pub async fn latest_entry(&self, user: &UserId) -> Result<Option<JournalEntry>> {
        let query = Query::new()
            .order_by("created_at", Direction::Descending)
            .limit(1);
        let snapshots = self.store.query(&Self::collection(user), &query).await?;
        Ok(decode_entries(snapshots).into_iter().next())
    }
}

/// Decode entries, skipping (and logging) documents that no longer parse.
fn decode_entries(snapshots: Vec<Snapshot>) -> Vec<JournalEntry> {
    snapshots
        .into_iter()
        .filter_map(|snap| match snap.decode::<JournalEntry>() {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(id = %snap.id, error = %e, "Skipping unreadable entry");
                None
            }
        })
        .collect()
}

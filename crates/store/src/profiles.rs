//! Profile store adapter: `users/{user}/virtual_profile/{timestamp_iso}`.

use chrono::{Duration, SecondsFormat, Utc};
use diarist_core::auth::UserId;
use diarist_core::document::{CollectionRef, Direction, DocumentStore, Query, to_document};
use diarist_core::error::{Error, Result, StoreError};
use diarist_core::profile::VirtualProfile;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::user_doc;

const MAX_KEY_ATTEMPTS: usize = 64;

#[derive(Clone)]
pub struct ProfileStore {
    store: Arc<dyn DocumentStore>,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn collection(user: &UserId) -> CollectionRef {
        user_doc(user).collection("virtual_profile")
    }

    /// The most recent snapshot, if any.
    pub async fn latest(&self, user: &UserId) -> Result<Option<VirtualProfile>> {
        let query = Query::new().order_by("timestamp", Direction::Descending).limit(1);
        let snapshots = self.store.query(&Self::collection(user), &query).await?;
        Ok(snapshots.into_iter().next().and_then(|snap| match snap.decode() {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(id = %snap.id, error = %e, "Skipping unreadable profile snapshot");
                None
            }
        }))
    }

    /// Write a new snapshot keyed by its timestamp. Never overwrites: a
    /// colliding key is nudged forward by a microsecond and the insert retried.
    pub async fn append(&self, user: &UserId, mut snapshot: VirtualProfile) -> Result<VirtualProfile> {
        let collection = Self::collection(user);
        let mut timestamp = snapshot.timestamp.unwrap_or_else(Utc::now);
        for _ in 0..MAX_KEY_ATTEMPTS {
            snapshot.timestamp = Some(timestamp);
            let doc = collection.doc(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true));
            match self.store.create(&doc, to_document(&snapshot)?).await {
                Ok(()) => {
                    debug!(user = %user, id = %doc.id(), raw = snapshot.is_raw(), "Profile snapshot stored");
                    return Ok(snapshot);
                }
                Err(StoreError::AlreadyExists(_)) => timestamp += Duration::microseconds(1),
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Internal(format!(
            "no free profile key for {user} after {MAX_KEY_ATTEMPTS} attempts"
        )))
    }
}

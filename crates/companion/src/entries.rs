//! Entry save pipeline.
//!
//! Media blocks are resolved before the merge-upsert: block `i` takes the URL
//! of upload part `file_{i}` when one was sent and stored, and otherwise
//! keeps the URL it arrived with.

use diarist_core::auth::UserId;
use diarist_core::document::DocumentStore;
use diarist_core::error::Result;
use diarist_core::journal::{BlockKind, ContentBlock, DateId, EntryDraft, JournalEntry};
use diarist_core::media::{MediaStore, Upload};
use diarist_store::EntryStore;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one save.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub date_id: DateId,
    pub blocks_saved: usize,
    /// Blocks whose URL came from an upload in this request.
    pub uploaded: usize,
    #[serde(skip)]
    pub entry: JournalEntry,
}

pub struct EntryService {
    entries: EntryStore,
    media: Arc<dyn MediaStore>,
}

impl EntryService {
    pub fn new(store: Arc<dyn DocumentStore>, media: Arc<dyn MediaStore>) -> Self {
        Self {
            entries: EntryStore::new(store),
            media,
        }
    }

    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    /// Validate the date, resolve media blocks against `uploads`, then
    /// merge-upsert the entry.
    pub async fn save(&self, user: &UserId, date_id: &str, mut draft: EntryDraft, uploads: Vec<Upload>) -> Result<SaveOutcome> {
        let date_id = DateId::parse(date_id)?;

        let mut uploaded = 0;
        if let Some(blocks) = draft.blocks.take() {
            let folder = format!("{user}/{date_id}");
            let mut parts: HashMap<String, Upload> = uploads.into_iter().map(|u| (u.field.clone(), u)).collect();

            let resolving = blocks.into_iter().enumerate().map(|(index, block)| {
                let upload = if block.kind.is_media() {
                    parts.remove(&format!("file_{index}"))
                } else {
                    None
                };
                self.resolve_block(&folder, index, block, upload)
            });
            let resolved = join_all(resolving).await;

            uploaded = resolved.iter().filter(|(_, fresh)| *fresh).count();
            draft.blocks = Some(resolved.into_iter().map(|(block, _)| block).collect());

            for field in parts.keys() {
                debug!(user = %user, field = %field, "Upload part matches no media block, ignoring");
            }
        }

        let entry = self.entries.upsert_entry(user, &date_id, draft).await?;
        info!(user = %user, date_id = %date_id, blocks = entry.blocks.len(), uploaded, "Entry saved");
        Ok(SaveOutcome {
            date_id,
            blocks_saved: entry.blocks.len(),
            uploaded,
            entry,
        })
    }

    /// Returns the normalized block and whether its URL is a fresh upload.
    async fn resolve_block(
        &self,
        folder: &str,
        index: usize,
        mut block: ContentBlock,
        upload: Option<Upload>,
    ) -> (ContentBlock, bool) {
        let Some(upload) = upload else {
            return (block.normalize(), false);
        };
        match self.media.upload(folder, &upload).await {
            Ok(url) => {
                block.url = Some(url);
                if block.kind == BlockKind::Document {
                    if block.file_name.is_none() {
                        block.file_name = upload.file_name.clone();
                    }
                    if block.file_size.is_none() {
                        block.file_size = Some(upload.len().to_string());
                    }
                }
                (block.normalize(), true)
            }
            Err(e) => {
                warn!(
                    folder = %folder,
                    block = index,
                    media = self.media.name(),
                    error = %e,
                    "Upload failed, keeping the block's existing URL"
                );
                (block.normalize(), false)
            }
        }
    }
}

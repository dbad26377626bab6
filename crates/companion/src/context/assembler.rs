//! Context assembly pipeline.
//!
//! Gathers everything the prompt needs for one turn:
//!
//! 1. **Recent entries** (trailing window, newest first)
//! 2. **Profile** (latest snapshot, if any)
//! 3. **History** (this persona's last exchanges, oldest first)
//! 4. **Current focus** (the caller's free-text hint, passed through)
//!
//! # Degradation
//!
//! Each source is read independently. A source that fails contributes an
//! empty value, a `warn!` line and a [`DegradeInfo`]; the turn carries on
//! with whatever the other sources returned.

use chrono::{DateTime, Duration, Utc};
use diarist_config::CompanionConfig;
use diarist_core::auth::UserId;
use diarist_core::chat::ChatExchange;
use diarist_core::document::DocumentStore;
use diarist_core::error::Result;
use diarist_core::journal::JournalEntry;
use diarist_core::persona::Persona;
use diarist_core::profile::VirtualProfile;
use diarist_store::{EntryStore, HistoryStore, ProfileStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// One of the three stores the assembler reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    Entries,
    Profile,
    History,
}

impl ContextSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entries => "entries",
            Self::Profile => "profile",
            Self::History => "history",
        }
    }
}

impl fmt::Display for ContextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source that failed during assembly and was left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradeInfo {
    pub source: ContextSource,
    /// The store error, rendered.
    pub reason: String,
}

/// How much of each source to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    /// Entries created within this many days are included.
    pub entry_days: u32,
    /// Maximum prior exchanges included.
    pub history_limit: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            entry_days: 7,
            history_limit: 5,
        }
    }
}

impl From<&CompanionConfig> for ContextWindow {
    fn from(config: &CompanionConfig) -> Self {
        Self {
            entry_days: config.entry_window_days,
            history_limit: config.history_limit,
        }
    }
}

/// Everything gathered for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    /// Entries inside the window, newest first.
    pub recent_entries: Vec<JournalEntry>,
    pub profile: Option<VirtualProfile>,
    /// Prior exchanges with this persona, oldest first.
    pub history: Vec<ChatExchange>,
    /// Free-text hint from the caller about what they are writing now.
    pub current_focus: Option<String>,
    /// Sources that failed and were left empty.
    pub degraded: Vec<DegradeInfo>,
}

impl AssembledContext {
    pub fn is_degraded(&self, source: ContextSource) -> bool {
        self.degraded.iter().any(|d| d.source == source)
    }

    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Reads the three context sources for a user and persona. Cheap to clone.
#[derive(Clone)]
pub struct ContextAssembler {
    entries: EntryStore,
    profiles: ProfileStore,
    history: HistoryStore,
    window: ContextWindow,
}

impl ContextAssembler {
    pub fn new(entries: EntryStore, profiles: ProfileStore, history: HistoryStore, window: ContextWindow) -> Self {
        Self {
            entries,
            profiles,
            history,
            window,
        }
    }

    /// Build all three adapters over one document store.
    pub fn from_store(store: Arc<dyn DocumentStore>, window: ContextWindow) -> Self {
        Self::new(
            EntryStore::new(store.clone()),
            ProfileStore::new(store.clone()),
            HistoryStore::new(store),
            window,
        )
    }

    pub fn window(&self) -> ContextWindow {
        self.window
    }

    /// Assemble context for `persona` as of now.
    pub async fn assemble(&self, user: &UserId, persona: Persona, hint: Option<&str>) -> AssembledContext {
        self.assemble_at(user, persona, hint, Utc::now()).await
    }

    /// Assemble context with an explicit clock.
    ///
    /// # Algorithm
    ///
    /// 1. Compute the entry cutoff `now - entry_days`
    /// 2. Read entries, latest profile and persona history concurrently
    /// 3. Keep each successful result; degrade each failed one
    pub async fn assemble_at(
        &self,
        user: &UserId,
        persona: Persona,
        hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> AssembledContext {
        let since = now - Duration::days(i64::from(self.window.entry_days));

        let (entries, profile, history) = tokio::join!(
            self.entries.query_recent(user, since),
            self.profiles.latest(user),
            self.history.recent(user, persona, self.window.history_limit),
        );

        let mut degraded = Vec::new();
        let recent_entries = settle(user, ContextSource::Entries, entries, &mut degraded).unwrap_or_default();
        let profile = settle(user, ContextSource::Profile, profile, &mut degraded).flatten();
        let history = settle(user, ContextSource::History, history, &mut degraded).unwrap_or_default();

        let current_focus = hint
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        debug!(
            user = %user,
            persona = %persona,
            entries = recent_entries.len(),
            profile = profile.is_some(),
            history = history.len(),
            degraded = degraded.len(),
            "Context assembled"
        );

        AssembledContext {
            recent_entries,
            profile,
            history,
            current_focus,
            degraded,
        }
    }
}

fn settle<T>(user: &UserId, source: ContextSource, result: Result<T>, degraded: &mut Vec<DegradeInfo>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(user = %user, source = %source, error = %e, "Context source unavailable, continuing without it");
            degraded.push(DegradeInfo {
                source,
                reason: e.to_string(),
            });
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyStore;
    use diarist_core::journal::{ContentBlock, DateId, EntryDraft};

    fn user() -> UserId {
        UserId::from("u1")
    }

    async fn seeded(store: Arc<dyn DocumentStore>) {
        let entries = EntryStore::new(store.clone());
        entries
            .upsert_entry(
                &user(),
                &DateId::parse("2024-05-01").unwrap(),
                EntryDraft::default().with_blocks(vec![ContentBlock::text("rained all day")]),
            )
            .await
            .unwrap();
        ProfileStore::new(store.clone())
            .append(
                &user(),
                VirtualProfile {
                    summary: Some("quiet and reflective".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let history = HistoryStore::new(store);
        for i in 0..8 {
            history
                .append(
                    &user(),
                    Persona::Fumiko,
                    &ChatExchange::user(format!("f{i}"), None).at(Utc::now() + Duration::seconds(i)),
                )
                .await
                .unwrap();
        }
        history
            .append(&user(), Persona::Krishna, &ChatExchange::user("k0", None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn assembles_all_sources_with_bounded_history() {
        let store = Arc::new(FlakyStore::new());
        seeded(store.clone()).await;
        let assembler = ContextAssembler::from_store(store, ContextWindow::default());

        let ctx = assembler.assemble(&user(), Persona::Fumiko, Some("  thinking about work ")).await;
        assert!(ctx.is_complete());
        assert_eq!(ctx.recent_entries.len(), 1);
        assert_eq!(
            ctx.profile.as_ref().and_then(|p| p.summary.as_deref()),
            Some("quiet and reflective")
        );
        let msgs: Vec<&str> = ctx.history.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["f3", "f4", "f5", "f6", "f7"]);
        assert_eq!(ctx.current_focus.as_deref(), Some("thinking about work"));
    }

    #[tokio::test]
    async fn history_is_scoped_to_the_requested_persona() {
        let store = Arc::new(FlakyStore::new());
        seeded(store.clone()).await;
        let assembler = ContextAssembler::from_store(store, ContextWindow::default());

        let ctx = assembler.assemble(&user(), Persona::Krishna, None).await;
        let msgs: Vec<&str> = ctx.history.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["k0"]);
        assert!(ctx.current_focus.is_none());
    }

    #[tokio::test]
    async fn entries_outside_the_window_are_excluded() {
        let store = Arc::new(FlakyStore::new());
        seeded(store.clone()).await;
        let assembler = ContextAssembler::from_store(store, ContextWindow::default());

        let later = Utc::now() + Duration::days(8);
        let ctx = assembler.assemble_at(&user(), Persona::Fumiko, None, later).await;
        assert!(ctx.recent_entries.is_empty());
        assert!(ctx.is_complete());
    }

    #[tokio::test]
    async fn failed_profile_read_degrades_only_the_profile() {
        let store = Arc::new(FlakyStore::new());
        seeded(store.clone()).await;
        store.fail_on("virtual_profile");
        let assembler = ContextAssembler::from_store(store, ContextWindow::default());

        let ctx = assembler.assemble(&user(), Persona::Fumiko, None).await;
        assert!(ctx.profile.is_none());
        assert!(ctx.is_degraded(ContextSource::Profile));
        assert!(!ctx.is_degraded(ContextSource::Entries));
        assert_eq!(ctx.recent_entries.len(), 1);
        assert_eq!(ctx.history.len(), 5);
    }

    #[tokio::test]
    async fn every_source_failing_still_yields_a_context() {
        let store = Arc::new(FlakyStore::new());
        store.fail_on("users");
        let assembler = ContextAssembler::from_store(store, ContextWindow::default());

        let ctx = assembler.assemble(&user(), Persona::Fumiko, Some("hint")).await;
        assert_eq!(ctx.degraded.len(), 3);
        assert!(ctx.recent_entries.is_empty() && ctx.profile.is_none() && ctx.history.is_empty());
        assert_eq!(ctx.current_focus.as_deref(), Some("hint"));
    }

    #[test]
    fn window_follows_config() {
        let config = CompanionConfig {
            entry_window_days: 3,
            history_limit: 2,
            ..Default::default()
        };
        assert_eq!(
            ContextWindow::from(&config),
            ContextWindow {
                entry_days: 3,
                history_limit: 2
            }
        );
    }
}

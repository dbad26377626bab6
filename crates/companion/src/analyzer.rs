//! Profile derivation.
//!
//! [`ProfileAnalyzer::derive_and_store_profile`] is the unit of work: read a
//! user's latest entry, ask the model for a structured profile, append the
//! snapshot. [`ProfileAnalyzer::sweep`] runs it for every known user and
//! never stops on a single user's failure.

use crate::orchestrator::ModelSettings;
use diarist_core::auth::UserId;
use diarist_core::document::DocumentStore;
use diarist_core::error::{Error, ErrorKind, Result};
use diarist_core::profile::VirtualProfile;
use diarist_core::provider::Provider;
use diarist_store::{EntryStore, ProfileStore, users};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Users whose profile was derived and stored.
    pub analyzed: usize,
    /// Users with no entry, or an entry without text.
    pub skipped: usize,
    /// Users whose analysis failed.
    pub failed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.analyzed + self.skipped + self.failed
    }
}

pub struct ProfileAnalyzer {
    store: Arc<dyn DocumentStore>,
    entries: EntryStore,
    profiles: ProfileStore,
    provider: Arc<dyn Provider>,
    model: ModelSettings,
}

impl ProfileAnalyzer {
    pub fn new(store: Arc<dyn DocumentStore>, provider: Arc<dyn Provider>, model: ModelSettings) -> Self {
        Self {
            entries: EntryStore::new(store.clone()),
            profiles: ProfileStore::new(store.clone()),
            store,
            provider,
            model,
        }
    }

    /// Derive a profile from the user's latest entry and append it.
    ///
    /// Returns `NotFound` when the user has no entry or the latest entry has
    /// no text; the model is not called in that case.
    pub async fn derive_and_store_profile(&self, user: &UserId) -> Result<VirtualProfile> {
        let entry = self
            .entries
            .latest_entry(user)
            .await?
            .ok_or_else(|| Error::not_found(format!("no entries for user {user}")))?;
        let text = entry.plain_text();
        if text.is_empty() {
            return Err(Error::not_found(format!("entry {} has no text to analyze", entry.date_id)));
        }

        debug!(user = %user, date_id = %entry.date_id, chars = text.len(), "Analyzing entry");
        let response = self
            .provider
            .complete(self.model.request(analysis_prompt(&text)))
            .await?;

        let profile = parse_analysis(&response.text);
        if profile.is_raw() {
            warn!(user = %user, "Analysis was not valid JSON, storing raw text");
        }
        let stored = self.profiles.append(user, profile).await?;
        info!(user = %user, date_id = %entry.date_id, raw = stored.is_raw(), "Profile updated");
        Ok(stored)
    }

    /// Every user with data in the store.
    pub async fn known_users(&self) -> Result<Vec<UserId>> {
        let ids = self.store.list_ids(&users()).await?;
        Ok(ids.into_iter().map(UserId::new).collect())
    }

    /// Analyze every known user.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let users = self.known_users().await?;
        Ok(self.sweep_users(&users).await)
    }

    /// Analyze the given users one at a time, counting outcomes.
    pub async fn sweep_users(&self, users: &[UserId]) -> SweepReport {
        info!(users = users.len(), "Profile sweep started");
        let mut report = SweepReport::default();
        for user in users {
            match self.derive_and_store_profile(user).await {
                Ok(_) => report.analyzed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(user = %user, reason = %e, "Skipping user");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "Profile analysis failed, continuing");
                    report.failed += 1;
                }
            }
        }
        info!(
            analyzed = report.analyzed,
            skipped = report.skipped,
            failed = report.failed,
            "Profile sweep finished"
        );
        report
    }
}

/// The analysis instruction sent to the model.
pub fn analysis_prompt(entry_text: &str) -> String {
    format!(
        r#"You are a professional psychologist and behavioral analyst. Analyze the following diary entry carefully and provide a comprehensive user profile based on this single entry.

DIARY ENTRY:
{entry_text}

Please provide analysis in the following JSON format:
{{
    "personality_traits": ["list of identified personality traits"],
    "emotional_state": "current emotional state and intensity",
    "interests_hobbies": ["identified interests and hobbies"],
    "habits_patterns": ["behavioral patterns and habits"],
    "values_priorities": ["values and what matters to the user"],
    "challenges_concerns": ["identified challenges or concerns"],
    "behavioral_insights": "key behavioral observations",
    "mental_health_indicators": "positive and any concerning mental health indicators",
    "relationship_insights": "insights about relationships mentioned",
    "summary": "2-3 sentence summary of the user based on this entry"
}}

Be specific, insightful, and nuanced. Look for both explicit and implicit information."#
    )
}

/// Parse the span from the first `{` to the last `}` as a profile. Anything
/// that does not yield at least one field becomes a raw snapshot.
pub fn parse_analysis(text: &str) -> VirtualProfile {
    let span = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return VirtualProfile::raw(text),
    };
    match serde_json::from_str::<VirtualProfile>(span) {
        Ok(mut profile) if !profile.fields().is_empty() => {
            profile.timestamp = None;
            profile
        }
        _ => VirtualProfile::raw(text),
    }
}

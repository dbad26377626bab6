//! Personas: the closed set of companions a user can talk to.
//!
//! Each persona has one identity document describing its character, voice
//! and history. Documents are loaded from a directory (`fumiko.txt`,
//! `krishna.txt`); a missing or blank file falls back to the built-in text.
//!
//! The persona name is also the history partition key
//! (`users/{user}/models/{persona}/messages`), so it is parsed once at the
//! edge and never passed around as a free-form string.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Fumiko,
    Krishna,
}

impl Persona {
    pub const ALL: [Persona; 2] = [Persona::Fumiko, Persona::Krishna];

    /// Stable lowercase key used in storage paths and URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Persona::Fumiko => "fumiko",
            Persona::Krishna => "krishna",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Persona::Fumiko => "Fumiko",
            Persona::Krishna => "Krishna",
        }
    }

    pub fn identity_file(self) -> &'static str {
        match self {
            Persona::Fumiko => "fumiko.txt",
            Persona::Krishna => "krishna.txt",
        }
    }

    fn builtin_document(self) -> &'static str {
        match self {
            Persona::Fumiko => FUMIKO_BUILTIN,
            // Placeholder until Krishna's character is written.
            Persona::Krishna => KRISHNA_BUILTIN,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persona {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fumiko" => Ok(Persona::Fumiko),
            "krishna" => Ok(Persona::Krishna),
            other => Err(Error::validation(format!(
                "unknown persona {other:?} (expected one of: fumiko, krishna)"
            ))),
        }
    }
}

const FUMIKO_BUILTIN: &str = "\
Name: Fumiko
Age: 27
Background: Grew up in a small coastal town, moved to the city to study literature, now works nights in a second-hand bookshop.
Personality: Warm, observant, quietly funny. Notices small details and remembers them. Prefers questions over advice.
Voice: Short, gentle sentences. Occasional dry humour. Uses everyday images (tea going cold, rain on windows) instead of abstractions.
Relationship to the user: A close friend who reads their diary with permission and cares how their days actually feel.";

const KRISHNA_BUILTIN: &str = "\
Name: Krishna
Status: Character not written yet.
Voice: Calm and brief. Acknowledge the message plainly.";

/// The identity document loaded for one persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaIdentity {
    pub persona: Persona,
    /// Display name, taken from a `Name:` line when present.
    pub name: String,
    pub document: String,
    /// Where the document came from: a file path or `<builtin>`.
    pub source: String,
}

impl PersonaIdentity {
    pub fn builtin(persona: Persona) -> Self {
        Self {
            persona,
            name: persona.display_name().into(),
            document: persona.builtin_document().into(),
            source: "<builtin>".into(),
        }
    }

    fn from_file(persona: Persona, path: &Path, document: String) -> Self {
        let name = extract_name(&document).unwrap_or_else(|| persona.display_name().into());
        Self {
            persona,
            name,
            document: document.trim().to_string(),
            source: path.display().to_string(),
        }
    }
}

/// Looks for `Name: X` on its own line, then for a leading `# X` heading.
fn extract_name(document: &str) -> Option<String> {
    for line in document.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Name:") {
            let name = rest.trim();
            if !name.is_empty() && name.len() < 50 {
                return Some(name.to_string());
            }
        }
    }
    document
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("# "))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

/// All persona identities, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PersonaLibrary {
    identities: HashMap<Persona, PersonaIdentity>,
}

impl PersonaLibrary {
    /// Load every persona's document from `dir`, falling back per persona to
    /// the built-in text.
    pub fn load(dir: Option<&Path>) -> Self {
        let identities = Persona::ALL
            .into_iter()
            .map(|persona| {
                let identity = dir
                    .and_then(|d| Self::try_load(persona, d))
                    .unwrap_or_else(|| {
                        debug!(persona = %persona, "Using built-in identity document");
                        PersonaIdentity::builtin(persona)
                    });
                (persona, identity)
            })
            .collect();
        Self { identities }
    }

    pub fn builtin() -> Self {
        Self::load(None)
    }

    fn try_load(persona: Persona, dir: &Path) -> Option<PersonaIdentity> {
        let path: PathBuf = dir.join(persona.identity_file());
        match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                debug!(persona = %persona, file = %path.display(), "Loaded identity document");
                Some(PersonaIdentity::from_file(persona, &path, content))
            }
            Ok(_) => {
                warn!(file = %path.display(), "Identity document is empty, ignoring");
                None
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to read identity document");
                None
            }
        }
    }

    pub fn get(&self, persona: Persona) -> PersonaIdentity {
        self.identities
            .get(&persona)
            .cloned()
            .unwrap_or_else(|| PersonaIdentity::builtin(persona))
    }

    /// Replace one persona's document (used by tests and tooling).
    pub fn with_document(mut self, persona: Persona, document: impl Into<String>) -> Self {
        let document = document.into();
        let name = extract_name(&document).unwrap_or_else(|| persona.display_name().into());
        self.identities.insert(
            persona,
            PersonaIdentity {
                persona,
                name,
                document,
                source: "<inline>".into(),
            },
        );
        self
    }

    pub fn diagnostic_summary(&self) -> String {
        let mut summary = String::new();
        for persona in Persona::ALL {
            let identity = self.get(persona);
            summary.push_str(&format!(
                "{:<8} name={} ({} chars) from {}\n",
                persona.as_str(),
                identity.name,
                identity.document.len(),
                identity.source
            ));
        }
        summary
    }
}

impl Default for PersonaLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

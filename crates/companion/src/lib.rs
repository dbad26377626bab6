//! The companion pipeline.
//!
//! A conversation turn flows **assemble → compose → invoke → persist**:
//!
//! 1. **Assemble** the user's recent entries, latest profile and this
//!    persona's recent exchanges ([`ContextAssembler`])
//! 2. **Compose** one instruction payload for the persona ([`PromptComposer`])
//! 3. **Invoke** the configured model once
//! 4. **Persist** the exchange under the same persona's partition
//!
//! [`Conversation`] drives that sequence. The crate also hosts the two other
//! units of work that talk to the model or the stores on a user's behalf:
//! [`ProfileAnalyzer`] (profile derivation and the batch sweep) and
//! [`EntryService`] (the media-resolving save path).

pub mod analyzer;
pub mod context;
pub mod entries;
pub mod orchestrator;
pub mod prompt;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{ProfileAnalyzer, SweepReport};
pub use context::{AssembledContext, ContextAssembler, ContextSource, ContextWindow, DegradeInfo};
pub use entries::{EntryService, SaveOutcome};
pub use orchestrator::{Conversation, ModelSettings, Reply, ResponseDelay, Stage};
pub use prompt::PromptComposer;

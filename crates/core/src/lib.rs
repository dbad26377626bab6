//! # Diarist Core
//!
//! Domain types, traits, and error definitions for the Diarist journaling
//! backend. This crate has **no framework dependencies**: it defines the
//! journal model and the seams every other crate implements against.
//!
//! ## External collaborators
//!
//! Each collaborator the companion pipeline depends on is a trait here:
//! - [`DocumentStore`]: hierarchical document store with ordered queries
//! - [`MediaStore`]: takes bytes, returns a durable URL
//! - [`Provider`]: takes a prompt, returns a text completion
//! - [`IdentityVerifier`]: maps a credential to a [`UserId`]
//!
//! Implementations live in their respective crates, so tests can swap in
//! in-memory or counting stubs without touching the pipeline.

pub mod auth;
pub mod chat;
pub mod document;
pub mod error;
pub mod journal;
pub mod media;
pub mod persona;
pub mod profile;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use auth::{IdentityVerifier, UserId};
pub use chat::{ChatExchange, Sender};
pub use document::{
    CollectionRef, Direction, Document, DocumentRef, DocumentStore, FilterOp, Query, Snapshot, WriteMode,
};
pub use error::{Error, ErrorKind, Result};
pub use journal::{BlockKind, ContentBlock, DateId, EntryDraft, EntrySummary, JournalEntry};
pub use media::{MediaStore, Upload};
pub use persona::{Persona, PersonaIdentity, PersonaLibrary};
pub use profile::VirtualProfile;
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};

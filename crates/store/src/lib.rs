//! Persistence for Diarist.
//!
//! Two layers:
//! - document store backends ([`InMemoryDocumentStore`], [`SqliteDocumentStore`])
//!   implementing `diarist_core::DocumentStore`
//! - typed adapters over any backend ([`EntryStore`], [`ProfileStore`],
//!   [`HistoryStore`]) that own the key layout under `users/{user}/…`
//!
//! plus media backends implementing `diarist_core::MediaStore`.

pub mod entries;
pub mod history;
pub mod in_memory;
pub mod media;
pub mod profiles;
pub mod sqlite;

pub use entries::EntryStore;
pub use history::HistoryStore;
pub use in_memory::InMemoryDocumentStore;
pub use media::{DisabledMediaStore, LocalMediaStore};
pub use profiles::ProfileStore;
pub use sqlite::SqliteDocumentStore;

use diarist_core::auth::UserId;
use diarist_core::document::{CollectionRef, DocumentRef};

/// The root collection every user's data lives under.
pub fn users() -> CollectionRef {
    CollectionRef::root("users")
}

pub fn user_doc(user: &UserId) -> DocumentRef {
    users().doc(user.as_str())
}

//! History store adapter: `users/{user}/models/{persona}/messages/{auto_id}`.
//!
//! The persona is part of the path, so one persona's exchanges can never be
//! read through another persona's partition.

use diarist_core::auth::UserId;
use diarist_core::chat::ChatExchange;
use diarist_core::document::{CollectionRef, Direction, DocumentStore, Query, to_document};
use diarist_core::error::Result;
use diarist_core::persona::Persona;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::user_doc;

#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn DocumentStore>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn collection(user: &UserId, persona: Persona) -> CollectionRef {
        user_doc(user)
            .collection("models")
            .doc(persona.as_str())
            .collection("messages")
    }

    /// Append one exchange to exactly `persona`'s partition. Returns its id.
    pub async fn append(&self, user: &UserId, persona: Persona, exchange: &ChatExchange) -> Result<String> {
        let id = self
            .store
            .add(&Self::collection(user, persona), to_document(exchange)?)
            .await?;
        debug!(user = %user, persona = %persona, id = %id, "Exchange stored");
        Ok(id)
    }

    /// Up to `limit` most recent exchanges for `persona`, oldest first.
    pub async fn recent(&self, user: &UserId, persona: Persona, limit: usize) -> Result<Vec<ChatExchange>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query = Query::new()
            .order_by("timestamp", Direction::Descending)
            .limit(limit);
        let snapshots = self.store.query(&Self::collection(user, persona), &query).await?;

        let mut exchanges: Vec<ChatExchange> = snapshots
            .into_iter()
            .filter_map(|snap| match snap.decode::<ChatExchange>() {
                Ok(mut exchange) => {
                    exchange.id = Some(snap.id);
                    Some(exchange)
                }
                Err(e) => {
                    warn!(id = %snap.id, error = %e, "Skipping unreadable exchange");
                    None
                }
            })
            .collect();
        exchanges.reverse();
        Ok(exchanges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDocumentStore;
    use chrono::{Duration, TimeZone, Utc};

    fn history() -> HistoryStore {
        HistoryStore::new(Arc::new(InMemoryDocumentStore::new()))
    }

    fn exchange(msg: &str, minute: i64) -> ChatExchange {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        ChatExchange::user(msg, None).at(base + Duration::minutes(minute))
    }

    #[tokio::test]
    async fn personas_never_see_each_other() {
        let h = history();
        let user = UserId::from("u");
        h.append(&user, Persona::Fumiko, &exchange("ex1", 0)).await.unwrap();
        h.append(&user, Persona::Krishna, &exchange("ex2", 1)).await.unwrap();

        let fumiko = h.recent(&user, Persona::Fumiko, 10).await.unwrap();
        assert_eq!(fumiko.len(), 1);
        assert_eq!(fumiko[0].message, "ex1");

        let krishna = h.recent(&user, Persona::Krishna, 10).await.unwrap();
        assert_eq!(krishna.len(), 1);
        assert_eq!(krishna[0].message, "ex2");
    }

    #[tokio::test]
    async fn recent_is_bounded_chronological_and_stable() {
        let h = history();
        let user = UserId::from("u");
        // Written out of order on purpose.
        for (msg, minute) in [("m3", 3), ("m1", 1), ("m5", 5), ("m2", 2), ("m4", 4)] {
            h.append(&user, Persona::Fumiko, &exchange(msg, minute)).await.unwrap();
        }

        let window = h.recent(&user, Persona::Fumiko, 3).await.unwrap();
        let msgs: Vec<&str> = window.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["m3", "m4", "m5"]);
        assert!(window.iter().all(|e| e.id.is_some()));

        let again = h.recent(&user, Persona::Fumiko, 3).await.unwrap();
        assert_eq!(window, again);
    }

    #[tokio::test]
    async fn zero_limit_returns_nothing() {
        let h = history();
        let user = UserId::from("u");
        h.append(&user, Persona::Fumiko, &exchange("m", 0)).await.unwrap();
        assert!(h.recent(&user, Persona::Fumiko, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn thread_id_is_stored_but_not_used_for_filtering() {
        let h = history();
        let user = UserId::from("u");
        h.append(&user, Persona::Fumiko, &ChatExchange::user("a", Some("t1".into())))
            .await
            .unwrap();
        h.append(&user, Persona::Fumiko, &ChatExchange::user("b", Some("t2".into())))
            .await
            .unwrap();
        let all = h.recent(&user, Persona::Fumiko, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|e| e.thread_id.as_deref() == Some("t1")));
    }
}

//! Conversation exchanges between a user and a persona.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who sent the message of an exchange. Only users start exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    #[default]
    User,
}

/// One user message and the companion's reply, stored as a single document.
///
/// `thread_id` is recorded but history is not partitioned by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    /// Store-assigned id; absent until written.
    #[serde(default, skip_serializing)]
    pub id: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub sender: Sender,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_timestamp: Option<DateTime<Utc>>,

    #[serde(default, rename = "chat_id", alias = "thread_id", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl ChatExchange {
    /// A user message received now.
    pub fn user(message: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            sender: Sender::User,
            message: message.into(),
            response: None,
            response_timestamp: None,
            thread_id,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self.response_timestamp = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thread_id_is_stored_as_chat_id() {
        let ex = ChatExchange::user("hello", Some("t-1".into())).with_response("hi!");
        let value = serde_json::to_value(&ex).unwrap();
        assert_eq!(value["chat_id"], json!("t-1"));
        assert_eq!(value["sender"], json!("user"));
        assert!(value.get("id").is_none());
        assert!(value.get("response_timestamp").is_some());
    }

    #[test]
    fn legacy_documents_decode() {
        let ex: ChatExchange = serde_json::from_value(json!({
            "timestamp": "2024-01-01T10:00:00Z",
            "message": "hey",
            "thread_id": "abc"
        }))
        .unwrap();
        assert_eq!(ex.sender, Sender::User);
        assert_eq!(ex.thread_id.as_deref(), Some("abc"));
        assert!(ex.response.is_none());
    }
}

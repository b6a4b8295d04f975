use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Keyed, MessageId, MessageKey};

/// A record of the remote chat store.
///
/// `color` and `wingdings` are captured when the message is sent, so old messages keep their
/// sender's styling after the sender changes settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub name: Option<String>,
    pub text: Option<String>,
    pub color: Option<String>,
    pub wingdings: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "anon",
        }
    }

    pub fn is_wingdings(&self) -> bool {
        self.wingdings.unwrap_or(false)
    }
}

impl Keyed for ChatMessage {
    fn key(&self) -> MessageKey {
        MessageKey {
            timestamp: self.created_at,
            identifier: self.id.clone(),
        }
    }
}

/// The row inserted when sending; the store assigns `id` and `created_at`.
///
/// Without a `color` the message is shown in the color derived from the sender's name.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NewChatMessage {
    pub name: String,
    pub text: String,
    pub color: Option<String>,
    pub wingdings: bool,
}

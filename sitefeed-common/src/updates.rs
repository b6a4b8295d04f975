use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Keyed, MessageId, MessageKey};

/// A message of the remote updates channel, as returned by the updates API.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct UpdateMessage {
    pub id: MessageId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "guildId")]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Set when the entry arrived but could not be decoded; only `id` and `timestamp` were
    /// recovered from it.
    #[serde(skip)]
    pub decode_error: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Author {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "globalName")]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Member {
    #[serde(default, alias = "nick")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub user: Option<MemberUser>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MemberUser {
    #[serde(default, alias = "globalName")]
    pub global_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "contentType")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|content_type| content_type.starts_with("image/"))
    }
}

impl Keyed for UpdateMessage {
    /// Messages without a timestamp sort as the oldest.
    fn key(&self) -> MessageKey {
        MessageKey {
            timestamp: self.timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC),
            identifier: self.id.clone(),
        }
    }
}

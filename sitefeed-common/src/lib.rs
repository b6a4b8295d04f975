use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

mod chat;
mod transport;
mod updates;

pub use chat::{ChatMessage, NewChatMessage};
pub use transport::{ChatStore, FetchError, FetchRequest, StoreError, UpdatesSource};
pub use updates::{Attachment, Author, Member, MemberUser, UpdateMessage};

/// Opaque identifier assigned by the remote store.
///
/// Remote stores hand these out either as JSON strings (snowflakes) or as integers (serial
/// primary keys); both are kept in their decimal string form.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageId(Arc<str>);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MessageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id.into())
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string().into())
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(id) => id.into(),
            Raw::Signed(id) => id.to_string().into(),
            Raw::Unsigned(id) => id.into(),
        })
    }
}

/// Sort key of a message: chronological, ties broken by identifier.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct MessageKey {
    pub timestamp: DateTime<Utc>,
    pub identifier: MessageId,
}

pub trait Keyed {
    fn key(&self) -> MessageKey;
}

/// Messages ordered by timestamp, holding at most one entry per identifier.
#[derive(Clone, Debug)]
pub struct MessageList<M> {
    messages: BTreeMap<MessageKey, M>,
    keys: HashMap<MessageId, MessageKey>,
}

impl<M> Default for MessageList<M> {
    fn default() -> Self {
        Self {
            messages: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }
}

impl<M: Keyed> MessageList<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `message` unless its identifier is already present.
    ///
    /// Returns `false` (and drops `message`) for a duplicate.
    pub fn insert(&mut self, message: M) -> bool {
        let key = message.key();
        if self.keys.contains_key(&key.identifier) {
            return false;
        }
        self.keys.insert(key.identifier.clone(), key.clone());
        self.messages.insert(key, message);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&M> {
        self.keys.get(id).and_then(|key| self.messages.get(key))
    }

    pub fn remove(&mut self, id: &str) -> Option<M> {
        let key = self.keys.remove(id)?;
        self.messages.remove(&key)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &M> {
        self.messages.values()
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &M> {
        self.messages.values().rev()
    }

    pub fn oldest(&self) -> Option<&M> {
        self.messages.values().next()
    }

    pub fn newest(&self) -> Option<&M> {
        self.messages.values().next_back()
    }

    pub fn ids(&self) -> impl Iterator<Item = &MessageId> {
        self.messages.keys().map(|key| &key.identifier)
    }
}

impl<M: Keyed> FromIterator<M> for MessageList<M> {
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<M: Keyed> Extend<M> for MessageList<M> {
    fn extend<I: IntoIterator<Item = M>>(&mut self, iter: I) {
        for message in iter {
            self.insert(message);
        }
    }
}

use async_trait::async_trait;

use crate::{ChatMessage, MessageId, NewChatMessage, UpdateMessage};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("chat store request failed: {0}")]
    Request(String),
    #[error("chat store responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("chat store response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
    #[error("Server error: {status} {reason}")]
    Status { status: u16, reason: String },
    #[error("Invalid response from server: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether the server answered with something that is not a message list, as opposed to
    /// a transient network failure.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Malformed(_))
    }
}

/// Query of one page of the updates feed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchRequest {
    pub limit: usize,
    pub include_members: bool,
    /// Only messages older than this one; unset for a forward fetch.
    pub before: Option<MessageId>,
}

/// Ordered remote collection of chat messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// All messages, ascending by creation time.
    async fn fetch_all(&self) -> Result<Vec<ChatMessage>, StoreError>;

    async fn insert(&self, message: NewChatMessage) -> Result<(), StoreError>;
}

/// Paginated remote feed of update messages, newest first.
#[async_trait]
pub trait UpdatesSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<UpdateMessage>, FetchError>;
}

#[async_trait]
impl<T: ChatStore + ?Sized> ChatStore for std::sync::Arc<T> {
    async fn fetch_all(&self) -> Result<Vec<ChatMessage>, StoreError> {
        (**self).fetch_all().await
    }

    async fn insert(&self, message: NewChatMessage) -> Result<(), StoreError> {
        (**self).insert(message).await
    }
}

#[async_trait]
impl<T: UpdatesSource + ?Sized> UpdatesSource for std::sync::Arc<T> {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<UpdateMessage>, FetchError> {
        (**self).fetch(request).await
    }
}

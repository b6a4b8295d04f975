use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::prelude::{Rng, SliceRandom};
use sitefeed_common::{
    Attachment, Author, ChatMessage, ChatStore, FetchError, FetchRequest, Keyed, Member,
    MessageId, NewChatMessage, StoreError, UpdateMessage, UpdatesSource,
};
use uuid::Uuid;

const USER_NAMES: &[&str] = &["alice", "bob", "charlie", "dana"];

const COLORS: &[&str] = &["#5d8aa8", "#e34234", "#9966cc", "#ffbf00"];

const MIN_MESSAGE_WORDS: usize = 1;
const MAX_MESSAGE_WORDS: usize = 15;

/// In-memory chat store. Ids are sequential, like a serial primary key.
#[derive(Debug, Default)]
pub struct FakeChatStore {
    messages: Mutex<Vec<ChatMessage>>,
    next_id: AtomicU64,
    failure: Mutex<Option<StoreError>>,
}

impl FakeChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with `error`, until cleared with `None`.
    pub fn set_failure(&self, error: Option<StoreError>) {
        *lock(&self.failure) = error;
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.messages).clone()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match &*lock(&self.failure) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn push(&self, message: NewChatMessage, created_at: DateTime<Utc>) -> ChatMessage {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = ChatMessage {
            id: id.into(),
            name: Some(message.name),
            text: Some(message.text),
            color: message.color,
            wingdings: Some(message.wingdings),
            created_at,
        };
        lock(&self.messages).push(record.clone());
        record
    }
}

#[async_trait]
impl ChatStore for FakeChatStore {
    async fn fetch_all(&self) -> Result<Vec<ChatMessage>, StoreError> {
        self.check_failure()?;
        let mut messages = self.messages();
        messages.sort_by_key(|message| message.created_at);
        Ok(messages)
    }

    async fn insert(&self, message: NewChatMessage) -> Result<(), StoreError> {
        self.check_failure()?;
        self.push(message, Utc::now());
        Ok(())
    }
}

/// Inserts a random message every few seconds until the returned future is dropped.
pub async fn chatter(store: std::sync::Arc<FakeChatStore>) {
    loop {
        let (message, millis) = generate_chat_message();
        tracing::debug!(name = %message.name, "fake chatter");
        store.push(message, Utc::now());
        tokio::time::sleep(tokio::time::Duration::from_millis(millis)).await;
    }
}

fn generate_chat_message() -> (NewChatMessage, u64) {
    let mut rng = rand::thread_rng();
    let name = USER_NAMES.choose(&mut rng).copied().unwrap_or("anon");
    let color = rng
        .gen_bool(0.5)
        .then(|| COLORS.choose(&mut rng).copied())
        .flatten();
    let message_len = rng.gen_range(MIN_MESSAGE_WORDS..=MAX_MESSAGE_WORDS);
    let message = NewChatMessage {
        name: name.to_owned(),
        text: lipsum::lipsum_words_with_rng(&mut rng, message_len),
        color: color.map(str::to_owned),
        wingdings: rng.gen_bool(0.1),
    };
    let millis = rng.gen_range(0..5000);
    (message, millis)
}

/// In-memory updates feed serving pages newest first.
#[derive(Debug, Default)]
pub struct FakeUpdatesSource {
    messages: Mutex<Vec<UpdateMessage>>,
    failure: Mutex<Option<FetchError>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeUpdatesSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A feed of `count` random messages, one minute apart, ending now.
    pub fn with_history(count: usize) -> Self {
        let source = Self::new();
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        for age in (0..count).rev() {
            let minutes = i64::try_from(age).unwrap_or(i64::MAX);
            source.push(generate_update(&mut rng, now - Duration::minutes(minutes)));
        }
        source
    }

    pub fn push(&self, message: UpdateMessage) {
        lock(&self.messages).push(message);
    }

    pub fn delete(&self, id: &str) {
        lock(&self.messages).retain(|message| message.id.as_str() != id);
    }

    pub fn set_failure(&self, error: Option<FetchError>) {
        *lock(&self.failure) = error;
    }

    /// Every request served so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl UpdatesSource for FakeUpdatesSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<UpdateMessage>, FetchError> {
        lock(&self.requests).push(request.clone());
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        let mut messages = lock(&self.messages).clone();
        messages.sort_by_key(|message| std::cmp::Reverse(message.key()));
        let start = match &request.before {
            Some(before) => messages
                .iter()
                .position(|message| &message.id == before)
                .map_or(messages.len(), |idx| idx + 1),
            None => 0,
        };
        Ok(messages.into_iter().skip(start).take(request.limit).collect())
    }
}

/// Posts a random update every half minute or so until the returned future is dropped.
pub async fn announcer(source: std::sync::Arc<FakeUpdatesSource>) {
    loop {
        let (message, secs) = {
            let mut rng = rand::thread_rng();
            (generate_update(&mut rng, Utc::now()), rng.gen_range(10..50))
        };
        tracing::debug!(id = %message.id.as_str(), "fake announcement");
        source.push(message);
        tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;
    }
}

/// A random update message posted at `timestamp`.
pub fn generate_update(rng: &mut impl Rng, timestamp: DateTime<Utc>) -> UpdateMessage {
    let name = USER_NAMES.choose(rng).copied().unwrap_or("anon");
    let words = rng.gen_range(MIN_MESSAGE_WORDS..=MAX_MESSAGE_WORDS);
    let attachments = if rng.gen_bool(0.2) {
        vec![Attachment {
            url: Some(format!("https://cdn.example.com/{}.png", Uuid::now_v7())),
            content_type: Some("image/png".to_owned()),
            filename: Some("screenshot.png".to_owned()),
        }]
    } else {
        Vec::new()
    };
    UpdateMessage {
        id: MessageId::from(Uuid::now_v7().to_string()),
        content: Some(lipsum::lipsum_words_with_rng(&mut *rng, words)),
        timestamp: Some(timestamp),
        guild_id: None,
        author: Some(Author {
            id: Some(rng.gen_range(1u64 << 22..u64::MAX >> 1).to_string()),
            username: Some(name.to_owned()),
            global_name: None,
            avatar: None,
            discriminator: Some("0".to_owned()),
        }),
        member: rng.gen_bool(0.5).then(|| Member {
            nickname: Some(format!("{name} (mod)")),
            avatar: None,
            user: None,
        }),
        attachments,
        decode_error: None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

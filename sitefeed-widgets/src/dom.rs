//! What the widgets need from their host page, and an in-memory page providing it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sitefeed_common::MessageId;
use tokio::sync::Notify;

/// Rendered markup of one message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fragment {
    pub id: Option<MessageId>,
    pub markup: String,
    /// Plain-text rendition, for hosts that do not display markup.
    pub text: String,
    /// Color of the message's name label, if it has one.
    pub accent: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The watchdog fired while a fetch was still running.
    Timeout,
    /// A fetch failed; automatic refreshes wait for an explicit retry.
    FetchFailed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorPanel {
    pub kind: ErrorKind,
    pub title: String,
    pub detail: String,
}

impl ErrorPanel {
    pub fn timeout() -> Self {
        Self {
            kind: ErrorKind::Timeout,
            title: "Failed to load updates.".to_owned(),
            detail: "Connection timed out. The server might be down or you might be offline."
                .to_owned(),
        }
    }

    pub fn fetch_failed(detail: impl std::fmt::Display) -> Self {
        Self {
            kind: ErrorKind::FetchFailed,
            title: "Error loading updates".to_owned(),
            detail: format!("Error details: {detail}"),
        }
    }

    pub fn markup(&self) -> String {
        format!(
            r#"<div class="error-container" role="alert"><p class="error-title">{}</p><p class="error-detail">{}</p><button class="retry-btn">Retry</button></div>"#,
            crate::render::escape_html(&self.title),
            crate::render::escape_html(&self.detail),
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notice {
    Empty(String),
    Error(ErrorPanel),
}

/// Scroll position of a scrollable container, in host units.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: u32,
    pub client_height: u32,
    pub scroll_height: u32,
}

impl ScrollMetrics {
    pub fn near_bottom(&self, threshold: u32) -> bool {
        self.scroll_top.saturating_add(self.client_height).saturating_add(threshold)
            >= self.scroll_height
    }
}

/// Host side of the updates feed: a loading indicator plus a content element holding message
/// fragments or a notice.
pub trait FeedSurface {
    fn set_loading(&mut self, loading: bool);
    /// Replaces the content with `fragments`, in order.
    fn render_all(&mut self, fragments: Vec<Fragment>);
    /// Inserts `fragments` above the current content.
    fn prepend(&mut self, fragments: Vec<Fragment>);
    fn remove(&mut self, id: &MessageId) -> bool;
    fn rendered_ids(&self) -> Vec<MessageId>;
    /// Replaces the content with a notice.
    fn show_notice(&mut self, notice: Notice);
    fn clear_notice(&mut self);
    fn clear(&mut self);
}

/// Host side of the chat box: the message list and the compose input.
pub trait ChatSurface {
    fn replace_messages(&mut self, fragments: Vec<Fragment>);
    fn clear_input(&mut self);
    fn scroll_to_bottom(&mut self);
}

/// A content change, as recorded by [`Document`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    RenderAll(usize),
    Prepend(usize),
    Remove(MessageId),
    Notice,
    ClearNotice,
    Clear,
    ClearInput,
}

#[derive(Clone, Debug, Default)]
pub struct Document {
    loading: bool,
    fragments: Vec<Fragment>,
    notice: Option<Notice>,
    input: String,
    pinned_to_bottom: bool,
    mutations: Vec<Mutation>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn is_pinned_to_bottom(&self) -> bool {
        self.pinned_to_bottom
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn ids(&self) -> Vec<&str> {
        self.fragments
            .iter()
            .filter_map(|fragment| fragment.id.as_ref().map(MessageId::as_str))
            .collect()
    }

    /// The content element's markup.
    pub fn markup(&self) -> String {
        match &self.notice {
            Some(Notice::Empty(text)) => format!(
                r#"<p class="empty-state" role="status">{}</p>"#,
                crate::render::escape_html(text)
            ),
            Some(Notice::Error(panel)) => panel.markup(),
            None => self.fragments.iter().map(|f| f.markup.as_str()).collect(),
        }
    }
}

impl FeedSurface for Document {
    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    fn render_all(&mut self, fragments: Vec<Fragment>) {
        self.mutations.push(Mutation::RenderAll(fragments.len()));
        self.notice = None;
        self.fragments = fragments;
    }

    fn prepend(&mut self, fragments: Vec<Fragment>) {
        self.mutations.push(Mutation::Prepend(fragments.len()));
        self.fragments.splice(0..0, fragments);
    }

    fn remove(&mut self, id: &MessageId) -> bool {
        let before = self.fragments.len();
        self.fragments.retain(|fragment| fragment.id.as_ref() != Some(id));
        let removed = self.fragments.len() != before;
        if removed {
            self.mutations.push(Mutation::Remove(id.clone()));
        }
        removed
    }

    fn rendered_ids(&self) -> Vec<MessageId> {
        self.fragments.iter().filter_map(|fragment| fragment.id.clone()).collect()
    }

    fn show_notice(&mut self, notice: Notice) {
        self.mutations.push(Mutation::Notice);
        self.fragments.clear();
        self.notice = Some(notice);
    }

    fn clear_notice(&mut self) {
        if self.notice.take().is_some() {
            self.mutations.push(Mutation::ClearNotice);
        }
    }

    fn clear(&mut self) {
        self.mutations.push(Mutation::Clear);
        self.fragments.clear();
        self.notice = None;
    }
}

impl ChatSurface for Document {
    fn replace_messages(&mut self, fragments: Vec<Fragment>) {
        self.mutations.push(Mutation::RenderAll(fragments.len()));
        self.fragments = fragments;
        self.pinned_to_bottom = false;
    }

    fn clear_input(&mut self) {
        self.mutations.push(Mutation::ClearInput);
        self.input.clear();
    }

    fn scroll_to_bottom(&mut self) {
        self.pinned_to_bottom = true;
    }
}

/// A [`Document`] shared between a widget driver and the host drawing it.
///
/// Every change wakes whoever waits on [`SharedDocument::changed`].
#[derive(Clone, Debug, Default)]
pub struct SharedDocument {
    document: Arc<Mutex<Document>>,
    changed: Arc<Notify>,
}

impl SharedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn changed(&self) -> Arc<Notify> {
        self.changed.clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let result = f(&mut self.lock());
        self.changed.notify_one();
        result
    }
}

impl FeedSurface for SharedDocument {
    fn set_loading(&mut self, loading: bool) {
        self.update(|doc| doc.set_loading(loading));
    }

    fn render_all(&mut self, fragments: Vec<Fragment>) {
        self.update(|doc| doc.render_all(fragments));
    }

    fn prepend(&mut self, fragments: Vec<Fragment>) {
        self.update(|doc| doc.prepend(fragments));
    }

    fn remove(&mut self, id: &MessageId) -> bool {
        self.update(|doc| doc.remove(id))
    }

    fn rendered_ids(&self) -> Vec<MessageId> {
        self.lock().rendered_ids()
    }

    fn show_notice(&mut self, notice: Notice) {
        self.update(|doc| doc.show_notice(notice));
    }

    fn clear_notice(&mut self) {
        self.update(|doc| FeedSurface::clear_notice(doc));
    }

    fn clear(&mut self) {
        self.update(|doc| FeedSurface::clear(doc));
    }
}

impl ChatSurface for SharedDocument {
    fn replace_messages(&mut self, fragments: Vec<Fragment>) {
        self.update(|doc| doc.replace_messages(fragments));
    }

    fn clear_input(&mut self) {
        self.update(|doc| doc.clear_input());
    }

    fn scroll_to_bottom(&mut self) {
        self.update(|doc| doc.scroll_to_bottom());
    }
}

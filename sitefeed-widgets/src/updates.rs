//! The updates feed: newest-first pages of the remote updates channel, refreshed on a timer and
//! extended backwards on scroll.
//!
//! [`UpdatesFeed`] is the state machine. Every fetch is started with [`UpdatesFeed::begin`] (or
//! one of its triggers), which hands out a [`FetchTicket`] while holding the in-flight guard, and
//! finished with [`UpdatesFeed::complete`]. [`run`] drives it with timers and a source.

use std::{collections::HashSet, time::Duration};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use sitefeed_common::{
    FetchError, FetchRequest, Keyed, MessageId, MessageList, UpdateMessage, UpdatesSource,
};
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    config::UpdatesConfig,
    dom::{ErrorKind, ErrorPanel, FeedSurface, Fragment, Notice, ScrollMetrics},
    render::{error_placeholder, update_fragment, update_fragment_or_placeholder},
};

pub const NO_UPDATES: &str = "No updates found. Check back later!";
pub const NO_MESSAGES: &str = "No messages found.";
pub const NO_VALID_MESSAGES: &str = "No valid messages to display.";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchKind {
    /// The newest page.
    Refresh,
    /// The page before the oldest message held.
    LoadMore,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchTicket {
    epoch: u64,
    seq: u64,
    kind: FetchKind,
    request: FetchRequest,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// No host surface yet.
    Detached,
    /// Attached, first load not finished.
    Uninitialized,
    Loading(FetchKind),
    Idle,
    Error(ErrorKind),
}

#[derive(Debug)]
pub struct UpdatesFeed {
    config: UpdatesConfig,
    messages: MessageList<UpdateMessage>,
    attached: bool,
    epoch: u64,
    next_seq: u64,
    in_flight: Option<(u64, FetchKind)>,
    has_more: bool,
    initial_load: bool,
    panel: Option<ErrorKind>,
    last_fetch: Option<DateTime<Utc>>,
}

impl Default for UpdatesFeed {
    fn default() -> Self {
        Self::new(UpdatesConfig::default())
    }
}

impl UpdatesFeed {
    pub fn new(config: UpdatesConfig) -> Self {
        Self {
            config,
            messages: MessageList::new(),
            attached: false,
            epoch: 0,
            next_seq: 0,
            in_flight: None,
            has_more: true,
            initial_load: true,
            panel: None,
            last_fetch: None,
        }
    }

    pub fn config(&self) -> &UpdatesConfig {
        &self.config
    }

    /// Mounts the feed on `surface`, starting over with empty state.
    ///
    /// Calling it again re-initializes: fetches begun before are ignored when they land.
    pub fn attach(&mut self, surface: &mut impl FeedSurface) {
        self.messages.clear();
        self.attached = true;
        self.epoch += 1;
        self.in_flight = None;
        self.has_more = true;
        self.initial_load = true;
        self.panel = None;
        self.last_fetch = None;
        surface.clear();
        surface.set_loading(true);
        tracing::info!(epoch = self.epoch, "updates attached");
    }

    pub fn phase(&self) -> Phase {
        if !self.attached {
            Phase::Detached
        } else if let Some(kind) = self.panel {
            Phase::Error(kind)
        } else if let Some((_, kind)) = self.in_flight {
            Phase::Loading(kind)
        } else if self.initial_load {
            Phase::Uninitialized
        } else {
            Phase::Idle
        }
    }

    /// Whether a fetch holds the guard, even if a timeout panel is shown for it.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn messages(&self) -> &MessageList<UpdateMessage> {
        &self.messages
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }

    /// Timer refreshes are skipped while a fetch-failure panel waits for a retry.
    pub fn auto_refresh_paused(&self) -> bool {
        self.panel == Some(ErrorKind::FetchFailed)
    }

    /// Starts a fetch unless one is already running.
    pub fn begin(&mut self, kind: FetchKind, surface: &mut impl FeedSurface) -> Option<FetchTicket> {
        if !self.attached {
            return None;
        }
        if let Some((seq, running)) = self.in_flight {
            tracing::debug!(seq, ?running, ?kind, "fetch already running");
            return None;
        }
        let before = match kind {
            FetchKind::Refresh => None,
            FetchKind::LoadMore => {
                if !self.has_more {
                    return None;
                }
                Some(self.messages.oldest()?.id.clone())
            }
        };
        self.next_seq += 1;
        self.in_flight = Some((self.next_seq, kind));
        surface.set_loading(true);
        tracing::debug!(seq = self.next_seq, ?kind, ?before, "fetch started");
        Some(FetchTicket {
            epoch: self.epoch,
            seq: self.next_seq,
            kind,
            request: FetchRequest {
                limit: self.config.page_size,
                include_members: true,
                before,
            },
        })
    }

    /// A refresh-timer tick.
    pub fn tick(&mut self, surface: &mut impl FeedSurface) -> Option<FetchTicket> {
        if self.auto_refresh_paused() {
            tracing::debug!("auto-refresh paused by error panel");
            return None;
        }
        self.begin(FetchKind::Refresh, surface)
    }

    pub fn on_scroll(
        &mut self,
        metrics: ScrollMetrics,
        surface: &mut impl FeedSurface,
    ) -> Option<FetchTicket> {
        if !metrics.near_bottom(self.config.scroll_threshold) {
            return None;
        }
        self.begin(FetchKind::LoadMore, surface)
    }

    /// The retry action of the error panel.
    pub fn retry(&mut self, surface: &mut impl FeedSurface) -> Option<FetchTicket> {
        if self.in_flight.is_some() {
            return None;
        }
        if self.panel.take().is_some() {
            surface.clear_notice();
        }
        self.begin(FetchKind::Refresh, surface)
    }

    /// The watchdog of fetch `seq` ran out. The fetch keeps its guard and may still land.
    pub fn watchdog_fired(&mut self, seq: u64, surface: &mut impl FeedSurface) -> bool {
        if self.in_flight.map(|(running, _)| running) != Some(seq) || self.panel.is_some() {
            return false;
        }
        tracing::warn!(seq, "updates still loading at watchdog deadline");
        self.panel = Some(ErrorKind::Timeout);
        surface.set_loading(false);
        surface.show_notice(Notice::Error(ErrorPanel::timeout()));
        true
    }

    /// Applies the result of the fetch `ticket` was handed out for.
    ///
    /// Returns false if the ticket is from before the last attach or not the running fetch.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<UpdateMessage>, FetchError>,
        surface: &mut impl FeedSurface,
    ) -> bool {
        if ticket.epoch != self.epoch {
            tracing::debug!(seq = ticket.seq, "dropping fetch from before reinit");
            return false;
        }
        if self.in_flight.map(|(seq, _)| seq) != Some(ticket.seq) {
            tracing::debug!(seq = ticket.seq, "dropping fetch that is not running");
            return false;
        }
        self.in_flight = None;
        self.last_fetch = Some(Utc::now());
        surface.set_loading(false);
        let initial = std::mem::replace(&mut self.initial_load, false);
        let batch = match result {
            Ok(batch) => batch,
            Err(err) => {
                if err.is_malformed() {
                    tracing::error!(%err, "updates source answered with garbage");
                } else {
                    tracing::warn!(%err, "fetching updates failed");
                }
                self.has_more = false;
                self.panel = Some(ErrorKind::FetchFailed);
                surface.show_notice(Notice::Error(ErrorPanel::fetch_failed(&err)));
                return true;
            }
        };
        tracing::debug!(seq = ticket.seq, kind = ?ticket.kind, len = batch.len(), "fetch landed");
        // a panel took the content's place, so everything has to be drawn again
        let restore = self.panel.take().is_some();
        if restore {
            surface.clear_notice();
        }
        match ticket.kind {
            FetchKind::Refresh => self.merge_newest(batch, initial || restore, surface),
            FetchKind::LoadMore => self.merge_older(batch, restore, surface),
        }
        true
    }

    fn merge_newest(
        &mut self,
        batch: Vec<UpdateMessage>,
        full_render: bool,
        surface: &mut impl FeedSurface,
    ) {
        let full_page = batch.len() >= self.config.page_size;
        self.has_more = full_page;
        if batch.is_empty() {
            if self.messages.is_empty() {
                surface.show_notice(Notice::Empty(NO_UPDATES.to_owned()));
            } else if full_render {
                self.render_all(surface);
            }
            return;
        }
        let removed = self.reconcile_deletions(&batch, full_page, surface);
        let previous_newest = self.messages.newest().map(Keyed::key);
        let mut fresh = Vec::new();
        for message in batch {
            let id = message.id.clone();
            if self.messages.insert(message) {
                fresh.push(id);
            }
        }
        if fresh.is_empty() {
            if full_render || (removed && self.messages.is_empty()) {
                self.render_all(surface);
            }
            return;
        }
        let mut fresh: Vec<&UpdateMessage> = fresh
            .iter()
            .filter_map(|id| self.messages.get(id.as_str()))
            .collect();
        fresh.sort_by_key(|message| std::cmp::Reverse(message.key()));
        let all_newer = previous_newest.is_some_and(|newest| {
            fresh.iter().all(|message| message.key() > newest)
        });
        if full_render || !all_newer || surface.rendered_ids().is_empty() {
            self.render_all(surface);
        } else {
            tracing::debug!(count = fresh.len(), "prepending updates");
            surface.prepend(fresh.into_iter().map(update_fragment_or_placeholder).collect());
        }
    }

    fn merge_older(
        &mut self,
        batch: Vec<UpdateMessage>,
        full_render: bool,
        surface: &mut impl FeedSurface,
    ) {
        let full_page = batch.len() >= self.config.page_size;
        let mut unique = 0;
        for message in batch {
            if self.messages.insert(message) {
                unique += 1;
            }
        }
        self.has_more = full_page && unique > 0;
        if unique > 0 || full_render {
            self.render_all(surface);
        }
    }

    /// Drops messages the newest page no longer has.
    ///
    /// A full page only speaks for the span its dated messages cover, so older messages are
    /// kept then.
    fn reconcile_deletions(
        &mut self,
        batch: &[UpdateMessage],
        full_page: bool,
        surface: &mut impl FeedSurface,
    ) -> bool {
        let incoming: HashSet<&MessageId> = batch.iter().map(|message| &message.id).collect();
        let floor = if full_page {
            let dated = batch.iter().filter(|message| message.timestamp.is_some());
            match dated.map(Keyed::key).min() {
                Some(floor) => Some(floor),
                None => return false,
            }
        } else {
            None
        };
        let gone: Vec<MessageId> = self
            .messages
            .iter()
            .filter(|message| floor.as_ref().map_or(true, |floor| message.key() >= *floor))
            .filter(|message| !incoming.contains(&message.id))
            .map(|message| message.id.clone())
            .collect();
        for id in &gone {
            tracing::debug!(%id, "update deleted remotely");
            self.messages.remove(id.as_str());
            surface.remove(id);
        }
        !gone.is_empty()
    }

    fn render_all(&self, surface: &mut impl FeedSurface) {
        if self.messages.is_empty() {
            surface.show_notice(Notice::Empty(NO_MESSAGES.to_owned()));
            return;
        }
        let mut failed = 0;
        let fragments: Vec<Fragment> = self
            .messages
            .newest_first()
            .map(|message| {
                update_fragment(message).unwrap_or_else(|err| {
                    tracing::warn!(id = %message.id, %err, "could not render update");
                    failed += 1;
                    error_placeholder(&message.id)
                })
            })
            .collect();
        if failed == fragments.len() {
            surface.show_notice(Notice::Empty(NO_VALID_MESSAGES.to_owned()));
        } else {
            surface.render_all(fragments);
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdatesCommand {
    /// The content container scrolled.
    Scroll(ScrollMetrics),
    Retry,
    Reinitialize,
    Shutdown,
}

async fn fetch<U: UpdatesSource + ?Sized>(
    source: &U,
    ticket: FetchTicket,
    limit: Duration,
) -> (FetchTicket, Result<Vec<UpdateMessage>, FetchError>) {
    let result = match tokio::time::timeout(limit, source.fetch(ticket.request())).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout),
    };
    (ticket, result)
}

/// Attaches `feed` to `surface` and drives it until [`UpdatesCommand::Shutdown`] or until
/// `commands` closes.
pub async fn run<U, S>(
    mut feed: UpdatesFeed,
    source: &U,
    mut surface: S,
    mut commands: mpsc::UnboundedReceiver<UpdatesCommand>,
) -> UpdatesFeed
where
    U: UpdatesSource + ?Sized,
    S: FeedSurface,
{
    let config = feed.config().clone();
    feed.attach(&mut surface);
    let mut ticker =
        tokio::time::interval_at(Instant::now() + config.initial_delay, config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let watchdog = tokio::time::sleep(config.watchdog);
    tokio::pin!(watchdog);
    let mut watched = None;
    let mut pending = FuturesUnordered::new();
    loop {
        let started = tokio::select! {
            _ = ticker.tick() => feed.tick(&mut surface),
            () = &mut watchdog, if watched.is_some() => {
                if let Some(seq) = watched.take() {
                    feed.watchdog_fired(seq, &mut surface);
                }
                None
            }
            Some((ticket, result)) = pending.next() => {
                if watched == Some(FetchTicket::seq(&ticket)) {
                    watched = None;
                }
                feed.complete(ticket, result, &mut surface);
                None
            }
            command = commands.recv() => match command {
                Some(UpdatesCommand::Scroll(metrics)) => feed.on_scroll(metrics, &mut surface),
                Some(UpdatesCommand::Retry) => feed.retry(&mut surface),
                Some(UpdatesCommand::Reinitialize) => {
                    feed.attach(&mut surface);
                    watched = None;
                    ticker.reset_after(config.initial_delay);
                    None
                }
                Some(UpdatesCommand::Shutdown) | None => break,
            },
        };
        if let Some(ticket) = started {
            watched = Some(ticket.seq());
            watchdog.as_mut().reset(Instant::now() + config.watchdog);
            pending.push(fetch(source, ticket, config.request_timeout));
        }
    }
    tracing::info!("updates stopped");
    feed
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slow::SlowSource;
    use chrono::TimeZone;
    use sitefeed_common::{Attachment, Author};
    use sitefeed_fake_messages::FakeUpdatesSource;

    use super::*;
    use crate::dom::{Document, Mutation, SharedDocument};

    fn update(id: &str, secs: i64) -> UpdateMessage {
        UpdateMessage {
            id: id.into(),
            content: Some(format!("update {id}")),
            timestamp: Some(Utc.timestamp_opt(secs, 0).unwrap()),
            author: Some(Author {
                id: Some("5".to_owned()),
                username: Some("site".to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn batch(ids: &[(&str, i64)]) -> Vec<UpdateMessage> {
        ids.iter().map(|&(id, secs)| update(id, secs)).collect()
    }

    fn attached(page_size: usize) -> (UpdatesFeed, Document) {
        let mut feed = UpdatesFeed::new(UpdatesConfig {
            page_size,
            ..Default::default()
        });
        let mut doc = Document::new();
        feed.attach(&mut doc);
        (feed, doc)
    }

    fn refresh(feed: &mut UpdatesFeed, doc: &mut Document, messages: Vec<UpdateMessage>) {
        let ticket = feed.begin(FetchKind::Refresh, doc).unwrap();
        assert!(feed.complete(ticket, Ok(messages), doc));
    }

    fn load_more(feed: &mut UpdatesFeed, doc: &mut Document, messages: Vec<UpdateMessage>) {
        let ticket = feed.begin(FetchKind::LoadMore, doc).unwrap();
        assert!(feed.complete(ticket, Ok(messages), doc));
    }

    const NEAR_BOTTOM: ScrollMetrics = ScrollMetrics {
        scroll_top: 900,
        client_height: 100,
        scroll_height: 1000,
    };

    #[test]
    fn nothing_happens_before_attach() {
        let mut feed = UpdatesFeed::default();
        let mut doc = Document::new();
        assert_eq!(feed.phase(), Phase::Detached);
        assert!(feed.begin(FetchKind::Refresh, &mut doc).is_none());
        feed.attach(&mut doc);
        assert_eq!(feed.phase(), Phase::Uninitialized);
    }

    #[test]
    fn first_load_renders_everything_newest_first() {
        let (mut feed, mut doc) = attached(20);
        let ticket = feed.begin(FetchKind::Refresh, &mut doc).unwrap();
        assert_eq!(
            ticket.request(),
            &FetchRequest {
                limit: 20,
                include_members: true,
                before: None,
            }
        );
        assert_eq!(feed.phase(), Phase::Loading(FetchKind::Refresh));
        assert!(doc.is_loading());
        feed.complete(ticket, Ok(batch(&[("a", 1), ("c", 3), ("b", 2)])), &mut doc);

        assert_eq!(doc.ids(), ["c", "b", "a"]);
        assert_eq!(doc.mutations().last(), Some(&Mutation::RenderAll(3)));
        assert!(!doc.is_loading());
        assert_eq!(feed.phase(), Phase::Idle);
        assert!(!feed.has_more());
        assert!(feed.last_fetch().is_some());
    }

    #[test]
    fn duplicate_ids_are_kept_once() {
        let (mut feed, mut doc) = attached(20);
        refresh(&mut feed, &mut doc, batch(&[("a", 1), ("b", 2)]));
        refresh(&mut feed, &mut doc, batch(&[("c", 3), ("c", 3), ("b", 2), ("a", 1)]));
        assert_eq!(feed.messages().len(), 3);
        assert_eq!(doc.ids(), ["c", "b", "a"]);
    }

    #[test]
    fn repeating_a_refresh_changes_nothing() {
        let (mut feed, mut doc) = attached(20);
        let same = batch(&[("a", 1), ("b", 2)]);
        refresh(&mut feed, &mut doc, same.clone());
        let mutations = doc.mutations().len();
        refresh(&mut feed, &mut doc, same);
        assert_eq!(doc.mutations().len(), mutations);
        assert_eq!(feed.messages().len(), 2);
        assert_eq!(doc.ids(), ["b", "a"]);
    }

    #[test]
    fn newer_messages_are_prepended() {
        let (mut feed, mut doc) = attached(20);
        refresh(&mut feed, &mut doc, batch(&[("a", 1), ("b", 2)]));
        refresh(&mut feed, &mut doc, batch(&[("d", 4), ("c", 3), ("b", 2), ("a", 1)]));
        assert_eq!(doc.mutations().last(), Some(&Mutation::Prepend(2)));
        assert_eq!(doc.ids(), ["d", "c", "b", "a"]);
    }

    #[test]
    fn out_of_order_arrivals_get_a_full_render() {
        let (mut feed, mut doc) = attached(20);
        refresh(&mut feed, &mut doc, batch(&[("a", 1), ("c", 3)]));
        refresh(&mut feed, &mut doc, batch(&[("c", 3), ("b", 2), ("a", 1)]));
        assert_eq!(doc.mutations().last(), Some(&Mutation::RenderAll(3)));
        assert_eq!(doc.ids(), ["c", "b", "a"]);
    }

    #[test]
    fn short_pages_end_pagination() {
        let (mut feed, mut doc) = attached(2);
        refresh(&mut feed, &mut doc, batch(&[("d", 4), ("c", 3)]));
        assert!(feed.has_more());

        let ticket = feed.on_scroll(NEAR_BOTTOM, &mut doc).unwrap();
        assert_eq!(ticket.kind(), FetchKind::LoadMore);
        assert_eq!(ticket.request().before.as_ref().map(MessageId::as_str), Some("c"));
        feed.complete(ticket, Ok(batch(&[("b", 2)])), &mut doc);

        assert!(!feed.has_more());
        assert_eq!(doc.ids(), ["d", "c", "b"]);
        let mutations = doc.mutations().len();
        assert!(feed.on_scroll(NEAR_BOTTOM, &mut doc).is_none());
        assert_eq!(doc.mutations().len(), mutations);
    }

    #[test]
    fn load_more_without_anything_new_ends_pagination() {
        let (mut feed, mut doc) = attached(2);
        refresh(&mut feed, &mut doc, batch(&[("d", 4), ("c", 3)]));
        load_more(&mut feed, &mut doc, batch(&[("d", 4), ("c", 3)]));
        assert!(!feed.has_more());
    }

    #[test]
    fn scrolling_far_from_the_bottom_loads_nothing() {
        let (mut feed, mut doc) = attached(2);
        refresh(&mut feed, &mut doc, batch(&[("d", 4), ("c", 3)]));
        let metrics = ScrollMetrics {
            scroll_top: 0,
            ..NEAR_BOTTOM
        };
        assert!(feed.on_scroll(metrics, &mut doc).is_none());
    }

    #[test]
    fn refreshes_drop_deleted_messages_but_load_more_does_not() {
        let (mut feed, mut doc) = attached(3);
        refresh(&mut feed, &mut doc, batch(&[("a", 3), ("b", 2), ("c", 1)]));

        load_more(&mut feed, &mut doc, batch(&[("a", 3), ("c", 1)]));
        assert!(feed.messages().contains("b"));
        assert_eq!(doc.ids(), ["a", "b", "c"]);

        refresh(&mut feed, &mut doc, batch(&[("a", 3), ("c", 1)]));
        assert!(!feed.messages().contains("b"));
        assert_eq!(doc.ids(), ["a", "c"]);
        assert!(doc.mutations().contains(&Mutation::Remove("b".into())));
    }

    #[test]
    fn full_pages_only_reconcile_the_span_they_cover() {
        let (mut feed, mut doc) = attached(2);
        refresh(&mut feed, &mut doc, batch(&[("d", 4), ("c", 3)]));
        load_more(&mut feed, &mut doc, batch(&[("b", 2), ("a", 1)]));
        refresh(&mut feed, &mut doc, batch(&[("e", 5), ("d", 4)]));
        assert_eq!(doc.ids(), ["e", "d", "c", "b", "a"]);
        assert_eq!(feed.messages().len(), 5);
    }

    #[test]
    fn undecodable_entries_keep_pages_full() {
        let (mut feed, mut doc) = attached(3);
        let mut page = batch(&[("f", 6), ("e", 5), ("d", 4)]);
        page[1] = UpdateMessage {
            id: "e".into(),
            timestamp: Some(Utc.timestamp_opt(5, 0).unwrap()),
            decode_error: Some("invalid type: string \"oops\"".to_owned()),
            ..Default::default()
        };
        refresh(&mut feed, &mut doc, page.clone());
        assert!(feed.has_more());
        load_more(&mut feed, &mut doc, batch(&[("c", 3), ("b", 2), ("a", 1)]));
        refresh(&mut feed, &mut doc, page);

        assert!(feed.has_more());
        assert_eq!(doc.ids(), ["f", "e", "d", "c", "b", "a"]);
        assert_eq!(doc.fragments()[1].text, "Error displaying this message.");
    }

    #[test]
    fn undated_entries_do_not_widen_the_reconciled_span() {
        let (mut feed, mut doc) = attached(2);
        refresh(&mut feed, &mut doc, batch(&[("d", 4), ("c", 3)]));
        load_more(&mut feed, &mut doc, batch(&[("b", 2), ("a", 1)]));
        let undated = UpdateMessage {
            id: "x".into(),
            decode_error: Some("missing field".to_owned()),
            ..Default::default()
        };
        refresh(&mut feed, &mut doc, vec![update("e", 5), undated]);
        assert_eq!(feed.messages().len(), 6);
        assert_eq!(doc.ids(), ["e", "d", "c", "b", "a", "x"]);
    }

    #[test]
    fn only_one_fetch_runs_at_a_time() {
        let (mut feed, mut doc) = attached(20);
        let first = feed.begin(FetchKind::Refresh, &mut doc).unwrap();
        assert!(feed.begin(FetchKind::Refresh, &mut doc).is_none());
        assert!(feed.tick(&mut doc).is_none());
        assert!(feed.complete(first.clone(), Ok(Vec::new()), &mut doc));
        assert!(!feed.complete(first, Ok(Vec::new()), &mut doc));
        assert!(feed.begin(FetchKind::Refresh, &mut doc).is_some());
    }

    #[test]
    fn fetches_from_before_reattaching_are_ignored() {
        let (mut feed, mut doc) = attached(20);
        let stale = feed.begin(FetchKind::Refresh, &mut doc).unwrap();
        feed.attach(&mut doc);
        assert!(!feed.complete(stale, Ok(batch(&[("a", 1)])), &mut doc));
        assert!(feed.messages().is_empty());
        assert!(!feed.is_loading());
    }

    #[test]
    fn empty_first_load_shows_a_notice() {
        let (mut feed, mut doc) = attached(20);
        refresh(&mut feed, &mut doc, Vec::new());
        assert_eq!(doc.notice(), Some(&Notice::Empty(NO_UPDATES.to_owned())));
        assert!(!feed.has_more());
        refresh(&mut feed, &mut doc, batch(&[("a", 1)]));
        assert_eq!(doc.notice(), None);
        assert_eq!(doc.ids(), ["a"]);
    }

    #[test]
    fn failures_show_a_panel_and_pause_refreshes_until_retried() {
        let (mut feed, mut doc) = attached(20);
        refresh(&mut feed, &mut doc, batch(&[("a", 1)]));
        let ticket = feed.tick(&mut doc).unwrap();
        let failure = FetchError::Status {
            status: 502,
            reason: "Bad Gateway".to_owned(),
        };
        feed.complete(ticket, Err(failure), &mut doc);

        assert_eq!(feed.phase(), Phase::Error(ErrorKind::FetchFailed));
        assert!(doc.markup().contains("Error details: Server error: 502 Bad Gateway"));
        assert!(doc.fragments().is_empty());
        assert!(!feed.has_more());
        assert!(feed.auto_refresh_paused());
        assert!(feed.tick(&mut doc).is_none());

        let ticket = feed.retry(&mut doc).unwrap();
        assert_eq!(doc.notice(), None);
        feed.complete(ticket, Ok(batch(&[("b", 2), ("a", 1)])), &mut doc);
        assert_eq!(feed.phase(), Phase::Idle);
        assert_eq!(doc.ids(), ["b", "a"]);
    }

    #[test]
    fn watchdog_panel_gives_way_to_a_late_success() {
        let (mut feed, mut doc) = attached(20);
        let ticket = feed.begin(FetchKind::Refresh, &mut doc).unwrap();
        assert!(feed.watchdog_fired(ticket.seq(), &mut doc));
        assert!(!feed.watchdog_fired(ticket.seq(), &mut doc));
        assert_eq!(feed.phase(), Phase::Error(ErrorKind::Timeout));
        assert!(!doc.is_loading());
        assert!(doc.markup().contains("Connection timed out."));
        assert!(feed.is_loading());
        assert!(!feed.auto_refresh_paused());
        assert!(feed.tick(&mut doc).is_none());

        feed.complete(ticket, Ok(batch(&[("a", 1)])), &mut doc);
        assert_eq!(doc.notice(), None);
        assert_eq!(doc.ids(), ["a"]);
    }

    #[test]
    fn watchdog_of_a_finished_fetch_is_ignored() {
        let (mut feed, mut doc) = attached(20);
        let ticket = feed.begin(FetchKind::Refresh, &mut doc).unwrap();
        let seq = ticket.seq();
        feed.complete(ticket, Ok(Vec::new()), &mut doc);
        assert!(!feed.watchdog_fired(seq, &mut doc));
    }

    #[test]
    fn records_that_cannot_render_become_placeholders() {
        let (mut feed, mut doc) = attached(20);
        let mut broken = update("b", 2);
        broken.attachments = vec![Attachment {
            url: Some("javascript:alert(1)".to_owned()),
            ..Default::default()
        }];
        refresh(&mut feed, &mut doc, vec![update("a", 1), broken.clone()]);
        assert_eq!(doc.ids(), ["b", "a"]);
        assert!(doc.fragments()[0].markup.contains("Error displaying this message."));

        let (mut feed, mut doc) = attached(20);
        refresh(&mut feed, &mut doc, vec![broken]);
        assert_eq!(doc.notice(), Some(&Notice::Empty(NO_VALID_MESSAGES.to_owned())));
    }

    /// Delegates to a fake after a fixed delay.
    mod slow {
        use std::time::Duration;

        use sitefeed_common::{FetchError, FetchRequest, UpdateMessage, UpdatesSource};
        use sitefeed_fake_messages::FakeUpdatesSource;

        pub struct SlowSource {
            pub inner: FakeUpdatesSource,
            pub delay: Duration,
        }

        #[async_trait::async_trait]
        impl UpdatesSource for SlowSource {
            async fn fetch(
                &self,
                request: &FetchRequest,
            ) -> Result<Vec<UpdateMessage>, FetchError> {
                tokio::time::sleep(self.delay).await;
                self.inner.fetch(request).await
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn driver_loads_then_refreshes_on_the_timer() {
        let source = Arc::new(FakeUpdatesSource::new());
        source.push(update("a", 1));
        source.push(update("b", 2));
        let doc = SharedDocument::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = run(UpdatesFeed::default(), &source, doc.clone(), rx);
        let script = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            assert_eq!(doc.lock().ids(), ["b", "a"]);
            source.push(update("c", 3));
            tokio::time::sleep(Duration::from_secs(30)).await;
            assert_eq!(doc.lock().ids(), ["c", "b", "a"]);
            assert_eq!(doc.lock().mutations().last(), Some(&Mutation::Prepend(1)));
            tx.send(UpdatesCommand::Shutdown).unwrap();
        };
        let (feed, ()) = tokio::join!(driver, script);
        assert_eq!(feed.messages().len(), 3);
        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|request| request.before.is_none() && request.limit == 20));
    }

    #[tokio::test(start_paused = true)]
    async fn driver_loads_more_on_scroll() {
        let source = FakeUpdatesSource::new();
        for (id, secs) in [("a", 1), ("b", 2), ("c", 3)] {
            source.push(update(id, secs));
        }
        let doc = SharedDocument::new();
        let feed = UpdatesFeed::new(UpdatesConfig {
            page_size: 2,
            ..Default::default()
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = run(feed, &source, doc.clone(), rx);
        let script = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tx.send(UpdatesCommand::Scroll(NEAR_BOTTOM)).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(UpdatesCommand::Shutdown).unwrap();
        };
        let (feed, ()) = tokio::join!(driver, script);
        assert_eq!(doc.lock().ids(), ["c", "b", "a"]);
        assert!(!feed.has_more());
        assert_eq!(source.requests()[1].before.as_ref().map(MessageId::as_str), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn driver_shows_the_watchdog_panel_before_a_slow_success() {
        let inner = FakeUpdatesSource::new();
        inner.push(update("a", 1));
        let source = SlowSource {
            inner,
            delay: Duration::from_secs(12),
        };
        let doc = SharedDocument::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = run(UpdatesFeed::default(), &source, doc.clone(), rx);
        let script = async {
            tokio::time::sleep(Duration::from_millis(10_200)).await;
            assert!(doc.lock().markup().contains("Connection timed out."));
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(doc.lock().notice(), None);
            assert_eq!(doc.lock().ids(), ["a"]);
            tx.send(UpdatesCommand::Shutdown).unwrap();
        };
        tokio::join!(driver, script);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_aborts_hung_fetches_and_retries_on_request() {
        let inner = FakeUpdatesSource::new();
        inner.push(update("a", 1));
        let source = SlowSource {
            inner,
            delay: Duration::from_secs(60),
        };
        let doc = SharedDocument::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = run(UpdatesFeed::default(), &source, doc.clone(), rx);
        let script = async {
            tokio::time::sleep(Duration::from_millis(15_200)).await;
            assert!(doc.lock().markup().contains("Error details: request timed out"));
            // paused: the next tick must not start a fetch
            tokio::time::sleep(Duration::from_secs(30)).await;
            assert_eq!(source.inner.requests().len(), 0);
            tx.send(UpdatesCommand::Retry).unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(UpdatesCommand::Shutdown).unwrap();
        };
        let (feed, ()) = tokio::join!(driver, script);
        assert_eq!(feed.phase(), Phase::Loading(FetchKind::Refresh));
    }
}

//! The chat box: a full-replace poll of the chat store, and sending through the censor.

use futures::stream::{FuturesUnordered, StreamExt};
use sitefeed_common::{ChatMessage, ChatStore, MessageList, NewChatMessage, StoreError};
use tokio::{sync::mpsc, time::MissedTickBehavior};

use crate::{
    censor::Censor,
    config::ChatConfig,
    dom::ChatSurface,
    prefs::{ChatSettings, Preferences, SettingsUpdate},
    render::chat_fragment,
    wingdings::to_wingdings,
};

/// Told about growth of the chat, with the author of the newest message.
pub trait NewMessageObserver: Send {
    fn new_message(&mut self, author: &str);
}

impl<F: FnMut(&str) + Send> NewMessageObserver for F {
    fn new_message(&mut self, author: &str) {
        self(author)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollTicket {
    epoch: u64,
    seq: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SendError {
    #[error("display name is empty")]
    EmptyName,
    #[error("message is empty")]
    EmptyText,
}

pub struct ChatFeed {
    messages: MessageList<ChatMessage>,
    epoch: u64,
    next_seq: u64,
    /// Sequence number of the poll currently shown.
    applied: Option<u64>,
    censor: Censor,
    observer: Option<Box<dyn NewMessageObserver>>,
}

impl Default for ChatFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatFeed {
    pub fn new() -> Self {
        Self {
            messages: MessageList::new(),
            epoch: 0,
            next_seq: 0,
            applied: None,
            censor: Censor::default(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl NewMessageObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn with_censor(mut self, censor: Censor) -> Self {
        self.censor = censor;
        self
    }

    pub fn messages(&self) -> &MessageList<ChatMessage> {
        &self.messages
    }

    /// Forgets everything and empties the view; polls started before this are ignored when
    /// they land.
    pub fn reset(&mut self, surface: &mut impl ChatSurface) {
        self.messages.clear();
        self.epoch += 1;
        self.applied = None;
        surface.replace_messages(Vec::new());
        tracing::info!(epoch = self.epoch, "chat reinitialized");
    }

    pub fn begin_poll(&mut self) -> PollTicket {
        self.next_seq += 1;
        PollTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        }
    }

    /// Replaces the local messages with a poll result and re-renders them.
    ///
    /// Returns whether the result was applied. Failed polls and polls overtaken by a newer one
    /// are dropped; the next tick tries again.
    pub fn complete_poll(
        &mut self,
        ticket: PollTicket,
        result: Result<Vec<ChatMessage>, StoreError>,
        surface: &mut impl ChatSurface,
    ) -> bool {
        if ticket.epoch != self.epoch {
            tracing::debug!(?ticket, epoch = self.epoch, "dropping poll from before reinit");
            return false;
        }
        if self.applied.is_some_and(|applied| applied >= ticket.seq) {
            tracing::debug!(?ticket, "dropping overtaken poll");
            return false;
        }
        let batch = match result {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(%err, "chat poll failed");
                return false;
            }
        };
        let previous = self.messages.len();
        self.messages = batch.into_iter().collect();
        self.applied = Some(ticket.seq);
        if self.messages.len() > previous {
            if let (Some(newest), Some(observer)) = (self.messages.newest(), &mut self.observer) {
                observer.new_message(newest.display_name());
            }
        }
        surface.replace_messages(self.messages.iter().map(chat_fragment).collect());
        surface.scroll_to_bottom();
        true
    }

    /// Builds the record to store for `text`, sent with `settings`.
    pub fn compose(&self, text: &str, settings: &ChatSettings) -> Result<NewChatMessage, SendError> {
        let name = settings.name.trim();
        if name.is_empty() {
            return Err(SendError::EmptyName);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyText);
        }
        let text = if settings.wingdings {
            to_wingdings(text)
        } else {
            text.to_owned()
        };
        Ok(NewChatMessage {
            name: name.to_owned(),
            text: self.censor.censor(&text),
            color: settings.color.clone(),
            wingdings: settings.wingdings,
        })
    }

    /// On success clears the input and hands out a poll to run right away.
    pub fn complete_send(
        &mut self,
        result: Result<(), StoreError>,
        surface: &mut impl ChatSurface,
    ) -> Option<PollTicket> {
        match result {
            Ok(()) => {
                surface.clear_input();
                Some(self.begin_poll())
            }
            Err(err) => {
                tracing::warn!(%err, "could not send chat message");
                None
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChatCommand {
    /// Send the given input text.
    Send(String),
    SaveSettings(SettingsUpdate),
    Reinitialize,
    Shutdown,
}

enum Job {
    Poll(PollTicket),
    Send(NewChatMessage),
}

enum Outcome {
    Polled(PollTicket, Result<Vec<ChatMessage>, StoreError>),
    Sent(Result<(), StoreError>),
}

async fn perform<C: ChatStore + ?Sized>(store: &C, job: Job) -> Outcome {
    match job {
        Job::Poll(ticket) => Outcome::Polled(ticket, store.fetch_all().await),
        Job::Send(message) => Outcome::Sent(store.insert(message).await),
    }
}

/// Drives `feed` until [`ChatCommand::Shutdown`] or until `commands` closes.
///
/// Polls on every tick of `config.poll_interval`, starting immediately. Polls and sends run
/// concurrently; a send that succeeds is followed by an extra poll.
pub async fn run<C, P, S>(
    mut feed: ChatFeed,
    store: &C,
    prefs: &mut P,
    mut surface: S,
    config: &ChatConfig,
    mut commands: mpsc::UnboundedReceiver<ChatCommand>,
) -> ChatFeed
where
    C: ChatStore + ?Sized,
    P: Preferences,
    S: ChatSurface,
{
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending = FuturesUnordered::new();
    tracing::info!(interval = ?config.poll_interval, "chat started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                pending.push(perform(store, Job::Poll(feed.begin_poll())));
            }
            Some(outcome) = pending.next() => match outcome {
                Outcome::Polled(ticket, result) => {
                    feed.complete_poll(ticket, result, &mut surface);
                }
                Outcome::Sent(result) => {
                    if let Some(ticket) = feed.complete_send(result, &mut surface) {
                        pending.push(perform(store, Job::Poll(ticket)));
                    }
                }
            },
            command = commands.recv() => match command {
                Some(ChatCommand::Send(text)) => {
                    match feed.compose(&text, &ChatSettings::load(&*prefs)) {
                        Ok(message) => pending.push(perform(store, Job::Send(message))),
                        Err(err) => tracing::debug!(%err, "not sending"),
                    }
                }
                Some(ChatCommand::SaveSettings(update)) => {
                    if let Err(err) = update.save(&mut *prefs) {
                        tracing::warn!(%err, "could not save chat settings");
                    }
                }
                Some(ChatCommand::Reinitialize) => {
                    feed.reset(&mut surface);
                    ticker.reset_immediately();
                }
                Some(ChatCommand::Shutdown) | None => break,
            },
        }
    }
    tracing::info!("chat stopped");
    feed
}

//! Feed widgets of the site: the chat box and the updates feed.
//!
//! Each widget is a controller owning its local view of a remote message list, plus an async
//! driver that runs its timers and network calls and patches a host [`dom`] surface.

pub mod censor;
pub mod chat;
pub mod color;
pub mod config;
pub mod dom;
pub mod prefs;
pub mod render;
pub mod updates;
pub mod wingdings;

pub use censor::{censor, Censor};
pub use chat::{ChatCommand, ChatFeed};
pub use config::{ChatConfig, UpdatesConfig};
pub use dom::{Document, SharedDocument};
pub use updates::{UpdatesCommand, UpdatesFeed};

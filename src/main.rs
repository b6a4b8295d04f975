use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use sitefeed_common::{ChatStore, UpdatesSource};
use sitefeed_fake_messages::{FakeChatStore, FakeUpdatesSource};
use sitefeed_remote::{HttpUpdatesSource, SupabaseChatStore};
use sitefeed_tui::Panes;
use sitefeed_widgets::{
    chat, prefs::FilePreferences, updates, ChatCommand, ChatConfig, ChatFeed, SharedDocument,
    UpdatesCommand, UpdatesConfig, UpdatesFeed,
};
use tokio::sync::mpsc;
use tracing_subscriber::prelude::*;

/// Updates the fake feed starts out with.
const FAKE_HISTORY: usize = 45;

/// The site's chat box and updates feed, in the terminal.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Use in-memory transports with generated messages instead of the network.
    #[arg(long)]
    fake: bool,
    /// Project URL of the Supabase instance holding the chat.
    #[arg(long, env = "SITEFEED_SUPABASE_URL", required_unless_present = "fake")]
    supabase_url: Option<String>,
    /// Public API key of the Supabase instance.
    #[arg(long, env = "SITEFEED_SUPABASE_KEY", required_unless_present = "fake")]
    supabase_key: Option<String>,
    /// URL of the updates API.
    #[arg(long, env = "SITEFEED_UPDATES_ENDPOINT", required_unless_present = "fake")]
    updates_endpoint: Option<String>,
    /// Seconds between chat polls.
    #[arg(long, default_value_t = 5)]
    chat_interval: u64,
    /// Seconds between updates refreshes.
    #[arg(long, default_value_t = 30)]
    updates_interval: u64,
    /// Updates requested per page.
    #[arg(long, default_value_t = 20)]
    page_size: usize,
    /// File keeping the chat name, color and wingdings setting.
    #[arg(long, default_value = "sitefeed-prefs.json")]
    prefs: PathBuf,
    #[arg(long, default_value = "sitefeed.log")]
    log_file: PathBuf,
}

type Transports = (Arc<dyn ChatStore>, Arc<dyn UpdatesSource>);

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let log_file = std::sync::Mutex::new(std::fs::File::create(&args.log_file)?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(log_file))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let chat_config = ChatConfig {
        poll_interval: Duration::from_secs(args.chat_interval),
    };
    let updates_config = UpdatesConfig {
        page_size: args.page_size,
        refresh_interval: Duration::from_secs(args.updates_interval),
        ..Default::default()
    };
    let (store, source) = transports(&args, &updates_config)?;
    let mut prefs = FilePreferences::load(&args.prefs)
        .wrap_err_with(|| format!("loading preferences from {}", args.prefs.display()))?;

    let chat_doc = SharedDocument::new();
    let updates_doc = SharedDocument::new();
    let (chat_tx, chat_rx) = mpsc::unbounded_channel();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let (notify_tx, notifications) = mpsc::unbounded_channel();

    let feed = ChatFeed::new().with_observer(move |author: &str| {
        // the receiver is gone once the terminal closes
        let _ = notify_tx.send(author.to_owned());
    });
    let chat_task = tokio::spawn({
        let doc = chat_doc.clone();
        async move {
            chat::run(feed, &*store, &mut prefs, doc, &chat_config, chat_rx).await;
        }
    });
    let updates_task = tokio::spawn({
        let doc = updates_doc.clone();
        async move {
            updates::run(UpdatesFeed::new(updates_config), &*source, doc, updates_rx).await;
        }
    });
    tracing::info!(fake = args.fake, "started");

    let res = sitefeed_tui::run(Panes {
        chat: chat_doc,
        updates: updates_doc,
        chat_commands: chat_tx.clone(),
        updates_commands: updates_tx.clone(),
        notifications,
    })
    .await;

    let _ = chat_tx.send(ChatCommand::Shutdown);
    let _ = updates_tx.send(UpdatesCommand::Shutdown);
    chat_task.await?;
    updates_task.await?;
    res?;
    Ok(())
}

fn transports(args: &Args, config: &UpdatesConfig) -> color_eyre::Result<Transports> {
    if args.fake {
        let store = Arc::new(FakeChatStore::new());
        tokio::spawn(sitefeed_fake_messages::chatter(store.clone()));
        let source = Arc::new(FakeUpdatesSource::with_history(FAKE_HISTORY));
        tokio::spawn(sitefeed_fake_messages::announcer(source.clone()));
        return Ok((store, source));
    }
    let (Some(url), Some(key), Some(endpoint)) = (
        args.supabase_url.as_deref(),
        args.supabase_key.as_deref(),
        args.updates_endpoint.as_deref(),
    ) else {
        return Err(eyre!("remote transports need a supabase url, key and updates endpoint"));
    };
    let store = SupabaseChatStore::new(url, key)?;
    let source = HttpUpdatesSource::new(endpoint, config.request_timeout)?;
    Ok((Arc::new(store), Arc::new(source)))
}

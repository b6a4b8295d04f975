//! HTTP transports for the chat store and the updates feed.

mod supabase;
mod updates;

pub use supabase::SupabaseChatStore;
pub use updates::HttpUpdatesSource;

use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 10;

fn build_client(request_timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
}

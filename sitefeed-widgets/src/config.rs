use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChatConfig {
    pub poll_interval: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdatesConfig {
    /// Messages requested per fetch; a shorter answer means the feed is exhausted.
    pub page_size: usize,
    pub refresh_interval: Duration,
    /// Delay before the first fetch after attaching.
    pub initial_delay: Duration,
    /// A fetch still running after this long is aborted.
    pub request_timeout: Duration,
    /// A fetch still running after this long gets the timeout panel, though it may still land.
    pub watchdog: Duration,
    /// Distance from the bottom of the scroll container, in host units, that triggers a
    /// load-more.
    pub scroll_threshold: u32,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            refresh_interval: Duration::from_secs(30),
            initial_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(15),
            watchdog: Duration::from_secs(10),
            scroll_threshold: 100,
        }
    }
}

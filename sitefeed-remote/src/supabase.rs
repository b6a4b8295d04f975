use std::time::Duration;

use async_trait::async_trait;
use sitefeed_common::{ChatMessage, ChatStore, NewChatMessage, StoreError};

const DEFAULT_TABLE: &str = "messages";
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Chat store backed by a Supabase (PostgREST) table, authenticated with the public anon key.
#[derive(Clone, Debug)]
pub struct SupabaseChatStore {
    http: reqwest::Client,
    project_url: String,
    table: String,
    api_key: String,
}

impl SupabaseChatStore {
    pub fn new(project_url: &str, api_key: impl Into<String>) -> Result<Self, StoreError> {
        let http = crate::build_client(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            http,
            project_url: project_url.trim_end_matches('/').to_owned(),
            table: DEFAULT_TABLE.to_owned(),
            api_key: api_key.into(),
        })
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.project_url, self.table)
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.table_url())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl ChatStore for SupabaseChatStore {
    async fn fetch_all(&self) -> Result<Vec<ChatMessage>, StoreError> {
        let response = self
            .request(reqwest::Method::GET)
            .query(&[("select", "*"), ("order", "created_at.asc")])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json::<Vec<ChatMessage>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn insert(&self, message: NewChatMessage) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(&[message])
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%status, %body, "chat store rejected request");
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

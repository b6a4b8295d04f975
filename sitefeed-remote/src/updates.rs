use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sitefeed_common::{FetchError, FetchRequest, MessageId, UpdateMessage, UpdatesSource};

/// Updates feed served by the channel-mirroring HTTP API.
#[derive(Clone, Debug)]
pub struct HttpUpdatesSource {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpUpdatesSource {
    /// `request_timeout` aborts a fetch that has not completed in time.
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, FetchError> {
        let http = crate::build_client(request_timeout).map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

fn query(request: &FetchRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("limit", request.limit.to_string()),
        ("include_members", request.include_members.to_string()),
    ];
    if let Some(before) = &request.before {
        params.push(("before", before.to_string()));
    }
    params
}

fn map_request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Request(err.to_string())
    }
}

/// Decodes a message list.
///
/// Entries that are not valid messages are kept with whatever `id` and `timestamp` they carry
/// and `decode_error` set, so a page keeps its length and the feed can show a placeholder.
fn decode_messages(body: &str) -> Result<Vec<UpdateMessage>, FetchError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(FetchError::Malformed("Invalid data format received".to_owned()));
    };
    Ok(items.into_iter().map(decode_message).collect())
}

fn decode_message(item: Value) -> UpdateMessage {
    match serde_json::from_value::<UpdateMessage>(item.clone()) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!("undecodable update message: {err}");
            salvage(&item, err.to_string())
        }
    }
}

fn salvage(item: &Value, error: String) -> UpdateMessage {
    let id = match item.get("id") {
        Some(Value::String(id)) => MessageId::from(id.as_str()),
        Some(Value::Number(id)) => MessageId::from(id.to_string()),
        _ => MessageId::default(),
    };
    let timestamp = item
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|timestamp| DateTime::parse_from_rfc3339(timestamp).ok())
        .map(|timestamp| timestamp.with_timezone(&Utc));
    UpdateMessage {
        id,
        timestamp,
        decode_error: Some(error),
        ..Default::default()
    }
}

#[async_trait]
impl UpdatesSource for HttpUpdatesSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<UpdateMessage>, FetchError> {
        tracing::debug!(endpoint = %self.endpoint, ?request, "fetching updates");
        let response = self
            .http
            .get(&self.endpoint)
            .query(&query(request))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(map_request_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "updates API error");
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_owned(),
            });
        }
        let body = response.text().await.map_err(map_request_error)?;
        decode_messages(&body)
    }
}

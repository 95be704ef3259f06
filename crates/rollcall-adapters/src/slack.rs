//! Slack notification threads
//!
//! A thread is a root message whose text is the session's thread key;
//! attendance logs are replies to it.

use async_trait::async_trait;
use reqwest::Client;
use rollcall_adapter_api::{MessagingError, MessagingResult, MessagingService};
use rollcall_api::{NotificationThread, ThreadKey};
use rollcall_config::MessagingConfig;
use rollcall_util::{ChannelId, ThreadId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::borrow::Cow;
use tracing::debug;

use crate::token_from_env;

pub struct SlackMessaging {
    client: Client,
    api_base: String,
    token_env: String,
    history_limit: u32,
}

impl SlackMessaging {
    pub fn new(config: &MessagingConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &MessagingConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token_env: config.token_env.clone(),
            history_limit: config.history_limit,
        }
    }

    fn token(&self) -> MessagingResult<String> {
        token_from_env(&self.token_env)
            .ok_or_else(|| MessagingError::MissingToken(self.token_env.clone()))
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn history_page(
        &self,
        channel: &ChannelId,
        cursor: Option<&str>,
    ) -> MessagingResult<HistoryResponse> {
        let mut query = vec![
            ("channel", channel.as_str().to_string()),
            ("limit", self.history_limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self
            .client
            .get(self.url("conversations.history"))
            .bearer_auth(self.token()?)
            .query(&query)
            .send()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;

        read_response(response).await
    }

    async fn post_message(
        &self,
        channel: &ChannelId,
        text: &str,
        thread_ts: Option<&ThreadId>,
    ) -> MessagingResult<PostMessageResponse> {
        let mut body = json!({
            "channel": channel.as_str(),
            "text": text,
        });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts.as_str());
        }

        let response = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(self.token()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;

        read_response(response).await
    }
}

#[async_trait]
impl MessagingService for SlackMessaging {
    async fn find_thread(
        &self,
        channel: &ChannelId,
        key: &ThreadKey,
    ) -> MessagingResult<Option<NotificationThread>> {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;
        let mut scanned = 0usize;

        loop {
            let history = self.history_page(channel, cursor.as_deref()).await?;
            pages += 1;
            scanned += history.messages.len();

            if let Some(ts) = find_root(&history, key) {
                debug!(channel = %channel, key = %key, pages, scanned, "Thread found in channel history");
                return Ok(Some(NotificationThread::new(
                    channel.clone(),
                    ThreadId::new(ts),
                )));
            }

            match history.next_cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        debug!(channel = %channel, key = %key, pages, scanned, "Thread key not in channel history");
        Ok(None)
    }

    async fn create_thread(
        &self,
        channel: &ChannelId,
        key: &ThreadKey,
    ) -> MessagingResult<NotificationThread> {
        let posted = self.post_message(channel, key.as_str(), None).await?;
        Ok(NotificationThread::new(channel.clone(), ThreadId::new(posted.ts)))
    }

    async fn append_to_thread(
        &self,
        channel: &ChannelId,
        thread_id: &ThreadId,
        text: &str,
    ) -> MessagingResult<()> {
        self.post_message(channel, text, Some(thread_id)).await?;
        Ok(())
    }
}

/// Envelope shared by every Web API response
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

impl HistoryResponse {
    /// Slack marks the last page with an empty cursor
    fn next_cursor(&self) -> Option<&str> {
        self.response_metadata
            .as_ref()
            .map(|meta| meta.next_cursor.as_str())
            .filter(|cursor| !cursor.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    ts: String,
    #[serde(default)]
    text: String,
    thread_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ts: String,
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> MessagingResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| MessagingError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(MessagingError::Api(format!("HTTP {}: {}", status, body)));
    }
    parse_body(&body)
}

/// Slack reports failures as `ok: false` with an HTTP 200
fn parse_body<T: DeserializeOwned>(body: &str) -> MessagingResult<T> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| MessagingError::InvalidResponse(e.to_string()))?;
    if !envelope.ok {
        return Err(MessagingError::Api(
            envelope.error.unwrap_or_else(|| "unknown_error".into()),
        ));
    }
    serde_json::from_str(body).map_err(|e| MessagingError::InvalidResponse(e.to_string()))
}

/// Root messages only: replies that happen to repeat the key are ignored
fn find_root(history: &HistoryResponse, key: &ThreadKey) -> Option<String> {
    history
        .messages
        .iter()
        .filter(|m| m.thread_ts.as_ref().is_none_or(|ts| ts == &m.ts))
        .find(|m| unescape(&m.text) == key.as_str())
        .map(|m| m.ts.clone())
}

/// Undo the escaping Slack applies to message text. `&amp;` goes last so
/// an escaped entity such as `&amp;lt;` stays literal.
fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

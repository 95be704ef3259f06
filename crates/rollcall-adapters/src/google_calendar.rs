//! Google Calendar feed

use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat};
use reqwest::Client;
use rollcall_adapter_api::{CalendarError, CalendarResult, CalendarService};
use rollcall_api::CalendarEntry;
use rollcall_config::CalendarConfig;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::token_from_env;

/// Lists events of one calendar through the Calendar v3 REST API
pub struct GoogleCalendar {
    client: Client,
    api_base: String,
    calendar_id: String,
    token_env: String,
}

impl GoogleCalendar {
    pub fn new(config: &CalendarConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &CalendarConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            calendar_id: config.calendar_id.clone(),
            token_env: config.token_env.clone(),
        }
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.api_base, self.calendar_id)
    }

    async fn fetch_page(
        &self,
        token: &str,
        window_start: DateTime<Local>,
        window_end: DateTime<Local>,
        page_token: Option<&str>,
    ) -> CalendarResult<EventsPage> {
        let mut query = vec![
            ("timeMin", window_start.to_rfc3339_opts(SecondsFormat::Secs, false)),
            ("timeMax", window_end.to_rfc3339_opts(SecondsFormat::Secs, false)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token.to_string()));
        }

        let response = self
            .client
            .get(self.events_url())
            .bearer_auth(token)
            .query(&query)
            .send()
            .await
            .map_err(|e| CalendarError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CalendarError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::Transport(e.to_string()))?;
        parse_events_page(&body)
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    async fn list_sessions(
        &self,
        window_start: DateTime<Local>,
        window_end: DateTime<Local>,
    ) -> CalendarResult<Vec<CalendarEntry>> {
        let token = token_from_env(&self.token_env)
            .ok_or_else(|| CalendarError::MissingToken(self.token_env.clone()))?;

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .fetch_page(&token, window_start, window_end, page_token.as_deref())
                .await?;
            entries.extend(page.entries);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(
            calendar_id = %self.calendar_id,
            window_start = %window_start,
            window_end = %window_end,
            entries = entries.len(),
            "Calendar window listed"
        );
        Ok(entries)
    }
}

/// One page of the events listing, reduced to timed entries
#[derive(Debug)]
pub struct EventsPage {
    pub entries: Vec<CalendarEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<Event>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(default)]
    id: String,
    status: Option<String>,
    summary: Option<String>,
    start: EventTime,
    end: EventTime,
    hangout_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<DateTime<chrono::FixedOffset>>,
}

/// Parse an events listing body.
///
/// All-day events carry no `dateTime` and are skipped, as are deleted events.
pub fn parse_events_page(body: &str) -> CalendarResult<EventsPage> {
    let response: EventsResponse = serde_json::from_str(body)
        .map_err(|e| CalendarError::InvalidResponse(format!("Failed to parse events: {}", e)))?;

    let entries = response
        .items
        .into_iter()
        .filter(|event| event.status.as_deref() != Some("cancelled"))
        .filter_map(|event| {
            let (Some(start), Some(end)) = (event.start.date_time, event.end.date_time) else {
                debug!(event_id = %event.id, "Skipping all-day event");
                return None;
            };
            let title = event.summary.unwrap_or_default();
            if title.trim().is_empty() {
                warn!(event_id = %event.id, "Event has no title");
            }
            Some(CalendarEntry::new(
                title,
                start.with_timezone(&Local),
                end.with_timezone(&Local),
                event.hangout_link,
            ))
        })
        .collect();

    Ok(EventsPage {
        entries,
        next_page_token: response.next_page_token,
    })
}

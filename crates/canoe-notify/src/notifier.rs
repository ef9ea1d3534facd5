use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tracing::info;

use crate::Notification;

/// Delivers formatted notifications to people.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

const SLACK_POST_MESSAGE: &str = "https://slack.com/api/chat.postMessage";

/// Posts to a chat channel through the Slack Web API.
pub struct SlackNotifier {
    token: String,
    channel_id: String,
    endpoint: String,
    http: reqwest::blocking::Client,
}

impl SlackNotifier {
    pub fn new(token: impl Into<String>, channel_id: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("build slack http client")?;
        Ok(Self {
            token: token.into(),
            channel_id: channel_id.into(),
            endpoint: SLACK_POST_MESSAGE.to_string(),
            http,
        })
    }

    /// Posts to `endpoint` instead of the public Slack API.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        let body = json!({
            "channel": self.channel_id,
            "text": notification.text,
            "blocks": notification.blocks,
        });
        let reply: serde_json::Value = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .context("chat.postMessage")?
            .json()
            .context("decode chat.postMessage reply")?;

        // the API answers 200 with ok=false on logical errors
        if reply.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let err = reply.get("error").and_then(|v| v.as_str()).unwrap_or("unknown error");
            return Err(anyhow!("chat.postMessage rejected: {err}"));
        }
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        info!(text = %notification.text, "notification");
        Ok(())
    }
}

/// Keeps every notification in memory. Used by tests.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

//! HTTP polling client for the outcome feed

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::EventSource;
use crate::config::FeedConfig;
use crate::types::RawEvent;

pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl EventSource for HttpFeed {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self) -> Result<Vec<RawEvent>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch outcome feed")?;

        if !response.status().is_success() {
            bail!("Outcome feed returned error: {}", response.status());
        }

        let payload: Value = response
            .json()
            .await
            .context("Failed to parse outcome feed response")?;

        Ok(parse_payload(&payload))
    }
}

/// Decode a feed payload: either a bare array or `{"data": [...]}`.
///
/// The feed lists the most recent round first; the result is oldest first.
/// Fields that are missing or of the wrong type are left empty for the
/// engine to reject.
pub fn parse_payload(payload: &Value) -> Vec<RawEvent> {
    let items = match payload {
        Value::Array(items) => items.as_slice(),
        other => other
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
    };

    items.iter().rev().map(parse_round).collect()
}

fn parse_round(round: &Value) -> RawEvent {
    RawEvent {
        id: round.get("id").and_then(scalar_string),
        category: round.get("color").and_then(scalar_string),
        value: round
            .get("roll")
            .and_then(|v| v.as_i64().or_else(|| v.as_str()?.trim().parse().ok())),
        timestamp: round
            .get("created_at")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wrapped_payload() {
        let payload = json!({
            "data": [
                {"id": "b", "color": 0, "roll": 0, "created_at": "2024-05-10T17:22:35.120Z"},
                {"id": "a", "color": 1, "roll": 7, "created_at": "2024-05-10T17:22:05.000Z"}
            ]
        });
        let events = parse_payload(&payload);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("a"));
        assert_eq!(events[0].category.as_deref(), Some("1"));
        assert_eq!(events[0].value, Some(7));
        assert_eq!(events[1].category.as_deref(), Some("0"));
    }

    #[test]
    fn test_parse_bare_array_with_names() {
        let payload = json!([
            {"id": 991, "color": "black", "roll": "12", "created_at": "2024-05-10T17:22:05Z"}
        ]);
        let events = parse_payload(&payload);
        assert_eq!(events[0].id.as_deref(), Some("991"));
        assert_eq!(events[0].category.as_deref(), Some("black"));
        assert_eq!(events[0].value, Some(12));
    }

    #[test]
    fn test_parse_keeps_missing_fields_empty() {
        let events = parse_payload(&json!({"data": [{"id": "x"}]}));
        assert_eq!(events.len(), 1);
        assert!(events[0].category.is_none());
        assert!(events[0].timestamp.is_none());

        assert!(parse_payload(&json!({"unexpected": true})).is_empty());
    }
}

//! Structured session events. Delivery is best effort: a failing sink never
//! affects the gate outcome.

use crate::config::EventLogConfig;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

pub trait EventSink: Send + Sync {
    fn log_session(&self, session_id: &str, attribution_token: Option<&str>);
    fn log_event(&self, session_id: &str, name: &str, payload: Option<Value>);

    /// Writes still in flight, handed over so a caller can await them before
    /// the runtime shuts down.
    fn take_in_flight(&self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }
}

/// Writes events to the tracing subscriber only.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn log_session(&self, session_id: &str, attribution_token: Option<&str>) {
        tracing::info!(
            session_id,
            has_att_token = attribution_token.is_some(),
            "Session started"
        );
    }

    fn log_event(&self, session_id: &str, name: &str, payload: Option<Value>) {
        match payload {
            Some(payload) => tracing::info!(session_id, event = name, %payload, "Gate event"),
            None => tracing::info!(session_id, event = name, "Gate event"),
        }
    }
}

/// Pushes sessions and events to a Firebase Realtime Database over its REST
/// interface:
///
/// - `PUT  {db}/sessions/{uuid}.json` for the session record
/// - `POST {db}/sessions/{uuid}/events.json` for each event
///
/// Requests are spawned on the current runtime and never awaited by the
/// caller.
pub struct RealtimeDbEventSink {
    client: reqwest::Client,
    base_url: Url,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl RealtimeDbEventSink {
    pub fn new(database_url: &Url) -> Self {
        RealtimeDbEventSink {
            client: reqwest::Client::new(),
            base_url: with_trailing_slash(database_url),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    fn sessions_url(&self, rest: &str) -> Option<Url> {
        match self.base_url.join(&format!("sessions/{rest}")) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(error = %err, "Could not build event URL");
                None
            }
        }
    }

    fn spawn_send(&self, request: reqwest::RequestBuilder, what: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(what, "No runtime available, dropping event");
            return;
        };
        let task = handle.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => tracing::debug!(what, "Event written"),
                Err(err) => tracing::warn!(what, error = %err, "Failed to write event"),
            }
        });

        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|task| !task.is_finished());
        in_flight.push(task);
    }
}

impl EventSink for RealtimeDbEventSink {
    fn log_session(&self, session_id: &str, attribution_token: Option<&str>) {
        let Some(url) = self.sessions_url(&format!("{session_id}.json")) else {
            return;
        };
        let body = json!({
            "uuid": session_id,
            "att_token": attribution_token.unwrap_or_default(),
            "timestamp": {".sv": "timestamp"},
        });
        self.spawn_send(self.client.put(url).json(&body), "session".into());
    }

    fn log_event(&self, session_id: &str, name: &str, payload: Option<Value>) {
        let Some(url) = self.sessions_url(&format!("{session_id}/events.json")) else {
            return;
        };
        let mut body = json!({
            "event_name": name,
            "timestamp": {".sv": "timestamp"},
        });
        if let Some(payload) = payload {
            body["payload"] = payload;
        }
        self.spawn_send(self.client.post(url).json(&body), name.to_string());
    }

    fn take_in_flight(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.in_flight.lock())
    }
}

pub fn get_event_sink(config: &EventLogConfig) -> Arc<dyn EventSink> {
    match config {
        EventLogConfig::Tracing => Arc::new(TracingEventSink),
        EventLogConfig::RealtimeDb { database_url } => {
            Arc::new(RealtimeDbEventSink::new(database_url))
        }
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
pub(crate) fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

//! One gate resolution run: config fetch joined with parameter collection,
//! then the backend call and reply decoding.

use crate::backend::{BackendResolver, decode_reply};
use crate::context::SessionContext;
use crate::errors::GateError;
use crate::events::EventSink;
use crate::params::ParamCollector;
use crate::payload;
use crate::remote_config::ConfigReader;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    FetchingConfig,
    CollectingParams,
    RequestingBackend,
    ParsingReply,
    Resolved,
    Failed,
    TimedOut,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::FetchingConfig => "fetching_config",
            Stage::CollectingParams => "collecting_params",
            Stage::RequestingBackend => "requesting_backend",
            Stage::ParsingReply => "parsing_reply",
            Stage::Resolved => "resolved",
            Stage::Failed => "failed",
            Stage::TimedOut => "timed_out",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Stage::Resolved | Stage::Failed | Stage::TimedOut)
    }
}

/// Stage tracking and event emission for a single run.
///
/// Once a terminal stage is reached every later transition and event is
/// dropped, so a pipeline finishing after the deadline stays silent.
pub struct RunLog {
    stage: Mutex<Stage>,
    events: Arc<dyn EventSink>,
    session_id: String,
}

impl RunLog {
    pub fn new(events: Arc<dyn EventSink>, session_id: impl Into<String>) -> Self {
        RunLog {
            stage: Mutex::new(Stage::Init),
            events,
            session_id: session_id.into(),
        }
    }

    pub fn current(&self) -> Stage {
        *self.stage.lock()
    }

    /// Moves to `next`. Returns false when the run already ended.
    pub fn enter(&self, next: Stage) -> bool {
        let previous = {
            let mut stage = self.stage.lock();
            if stage.is_terminal() {
                return false;
            }
            std::mem::replace(&mut *stage, next)
        };
        tracing::debug!(from = previous.as_str(), to = next.as_str(), "Gate stage");
        self.events.log_event(
            &self.session_id,
            "stage",
            Some(json!({"from": previous.as_str(), "to": next.as_str()})),
        );
        true
    }

    /// Emits `name` unless the run already ended.
    pub fn event(&self, name: &str, payload: Option<Value>) {
        if self.current().is_terminal() {
            return;
        }
        self.events.log_event(&self.session_id, name, payload);
    }

    /// Records the committed destination and moves to [`Stage::Resolved`].
    pub fn resolved(&self, url: &Url) {
        self.event("final_url_ready", Some(json!({"url": url.as_str()})));
        self.enter(Stage::Resolved);
    }

    /// Records the deadline firing and moves to [`Stage::TimedOut`].
    pub fn timed_out(&self) {
        self.event(
            "config_overall_timeout",
            Some(json!({"stage": self.current().as_str()})),
        );
        self.enter(Stage::TimedOut);
    }

    /// Emits `name` with the error, then moves to [`Stage::Failed`].
    pub fn fail(&self, name: &str, err: &GateError) {
        self.event(
            name,
            Some(json!({"error": err.kind(), "detail": err.to_string()})),
        );
        self.enter(Stage::Failed);
    }
}

pub struct Pipeline {
    config_reader: ConfigReader,
    collector: ParamCollector,
    backend: BackendResolver,
    context: Arc<SessionContext>,
}

impl Pipeline {
    pub fn new(
        config_reader: ConfigReader,
        collector: ParamCollector,
        backend: BackendResolver,
        context: Arc<SessionContext>,
    ) -> Self {
        Pipeline {
            config_reader,
            collector,
            backend,
            context,
        }
    }

    /// Runs every stage up to a decoded destination. Committing it, and the
    /// terminal `Resolved` transition, is left to the caller.
    pub async fn run(&self, log: &RunLog) -> Result<Url, GateError> {
        let config = async {
            log.enter(Stage::FetchingConfig);
            self.config_reader.fetch_config().await.inspect_err(|err| {
                let name = match err {
                    GateError::NoData => "config_no_data",
                    GateError::InvalidConfig => "config_invalid",
                    _ => "config_fetch_error",
                };
                log.fail(name, err);
            })
        };
        let params = async {
            log.enter(Stage::CollectingParams);
            Ok::<_, GateError>(self.collector.collect(&self.context).await)
        };
        let (endpoint, params) = tokio::try_join!(config, params)?;

        let payload = payload::encode(&params);
        log.enter(Stage::RequestingBackend);
        log.event(
            "backend_request",
            Some(json!({"url": BackendResolver::request_url(&endpoint, &payload).as_str()})),
        );

        let reply = self
            .backend
            .fetch_reply(&endpoint, &payload)
            .await
            .inspect_err(|err| {
                let name = match err {
                    GateError::InvalidConfig => "backend_invalid_json",
                    _ => "backend_error",
                };
                log.fail(name, err);
            })?;

        log.enter(Stage::ParsingReply);
        decode_reply(&reply).inspect_err(|err| {
            let parts = reply.values().filter(|v| v.is_string()).count();
            let name = if parts < 2 {
                "backend_insufficient_parts"
            } else {
                "final_url_invalid"
            };
            log.fail(name, err);
        })
    }
}

use crate::backend::BackendResolver;
use crate::cache::ResultCache;
use crate::collaborators::Collaborators;
use crate::config::GateConfig;
use crate::context::SessionContext;
use crate::errors::{GateError, SetupError};
use crate::events::{EventSink, get_event_sink};
use crate::identity::IdentityProvider;
use crate::metrics_defs::{OUTCOME, RESOLVE_DURATION};
use crate::params::ParamCollector;
use crate::pipeline::{Pipeline, RunLog};
use crate::remote_config::{ConfigReader, ConfigSource, RealtimeDbConfigSource};
use crate::store::{StateStore, get_state_store};
use crate::supervisor::DeadlineSupervisor;
use crate::transport::{HttpTransport, Transport};
use serde_json::json;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Terminal result of one launch. Produced exactly once per [`Gate::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Remote(Url),
    LocalFallback,
    Failed(GateError),
}

impl GateOutcome {
    pub fn destination(&self) -> Destination {
        match self {
            GateOutcome::Remote(url) => Destination::Remote(url.clone()),
            GateOutcome::LocalFallback | GateOutcome::Failed(_) => Destination::Local,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            GateOutcome::Remote(_) => "remote",
            GateOutcome::LocalFallback => "local_fallback",
            GateOutcome::Failed(err) => err.kind(),
        }
    }
}

/// What the presentation layer shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Remote(Url),
    Local,
}

pub trait Presenter: Send + Sync {
    fn on_resolved(&self, destination: Destination);
}

/// Decides where a launch goes. Built once at startup; every launch calls
/// [`Gate::launch`] (or [`Gate::resolve`]) on the same instance.
pub struct Gate {
    enabled: bool,
    context: Arc<SessionContext>,
    cache: ResultCache,
    pipeline: Arc<Pipeline>,
    events: Arc<dyn EventSink>,
    supervisor: DeadlineSupervisor,
}

impl Gate {
    /// Starts the attribution SDK, establishes the session and wires the
    /// pipeline from the given parts.
    pub fn new(
        config: &GateConfig,
        store: Arc<dyn StateStore>,
        config_source: Arc<dyn ConfigSource>,
        backend_transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
        collaborators: Collaborators,
    ) -> Self {
        collaborators.attribution.start();

        let identity = IdentityProvider::new(store.clone());
        let context = Arc::new(SessionContext::establish(
            &identity,
            collaborators.attribution_tokens.as_ref(),
            events.as_ref(),
        ));

        let collector = ParamCollector::new(
            collaborators.attribution,
            collaborators.installations,
            collaborators.push,
            config.device.clone(),
            config.timeouts.push_token(),
        );
        let pipeline = Pipeline::new(
            ConfigReader::new(config_source),
            collector,
            BackendResolver::new(backend_transport),
            context.clone(),
        );

        Gate {
            enabled: config.enabled,
            context,
            cache: ResultCache::new(store),
            pipeline: Arc::new(pipeline),
            events,
            supervisor: DeadlineSupervisor::new(config.timeouts.deadline()),
        }
    }

    /// Builds a gate talking to the configured Realtime Database and backend
    /// over HTTP.
    pub fn from_config(config: &GateConfig) -> Result<Self, SetupError> {
        config.validate()?;

        let config_transport = Arc::new(HttpTransport::new(config.timeouts.deadline())?);
        let config_source = RealtimeDbConfigSource::new(
            config_transport,
            &config.remote_config.database_url,
            &config.remote_config.path,
        )?;
        let backend_transport = Arc::new(HttpTransport::new(config.timeouts.backend())?);

        Ok(Gate::new(
            config,
            get_state_store(&config.state_store),
            Arc::new(config_source),
            backend_transport,
            get_event_sink(&config.event_log),
            Collaborators::from_config(&config.attribution),
        ))
    }

    pub fn session(&self) -> &SessionContext {
        &self.context
    }

    /// Resolves the outcome for this launch.
    pub async fn resolve(&self) -> GateOutcome {
        let started = Instant::now();
        let outcome = self.decide().await;

        histogram!(RESOLVE_DURATION).record(started.elapsed().as_secs_f64());
        counter!(OUTCOME, "outcome" => outcome.kind()).increment(1);
        tracing::info!(outcome = outcome.kind(), "Gate decided");
        outcome
    }

    async fn decide(&self) -> GateOutcome {
        if !self.enabled {
            tracing::info!("Gate disabled, using local experience");
            return GateOutcome::LocalFallback;
        }

        if let Some(url) = self.cache.load() {
            tracing::info!(url = %url, "Using cached final URL");
            return GateOutcome::Remote(url);
        }

        let log = Arc::new(RunLog::new(
            self.events.clone(),
            self.context.session_id.as_str(),
        ));

        let pipeline = self.pipeline.clone();
        let run_log = log.clone();
        let run = async move { pipeline.run(&run_log).await };

        let cache = self.cache.clone();
        let resolved_log = log.clone();
        let on_resolved = move |url: &Url| {
            cache.store(url);
            resolved_log.resolved(url);
        };

        let on_timeout = move || log.timed_out();

        self.supervisor.run(run, on_resolved, on_timeout).await
    }

    /// Resolves the outcome and hands the destination to `presenter`, exactly
    /// once.
    pub async fn launch(&self, presenter: &dyn Presenter) -> GateOutcome {
        let outcome = self.resolve().await;
        let destination = outcome.destination();

        let (name, payload) = match &destination {
            Destination::Remote(url) => ("open_webview", json!({"url": url.as_str()})),
            Destination::Local => ("open_app_fallback", json!({"reason": outcome.kind()})),
        };
        self.events
            .log_event(&self.context.session_id, name, Some(payload));

        presenter.on_resolved(destination);
        outcome
    }

    /// Waits up to `timeout` for event writes that are still in flight.
    pub async fn flush_events(&self, timeout: Duration) {
        let pending = self.events.take_in_flight();
        if pending.is_empty() {
            return;
        }
        let count = pending.len();
        let all = async {
            for task in pending {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(timeout, all).await.is_err() {
            tracing::warn!(count, "Gave up waiting for event writes");
        }
    }
}

//! Interfaces of the SDKs the gate depends on but does not own, plus static
//! stand-ins driven by configuration.

use crate::config::AttributionConfig;
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use std::sync::Arc;

/// Attribution network SDK. `install_id` is available synchronously once the
/// SDK has been started.
pub trait AttributionSdk: Send + Sync {
    fn start(&self);
    fn install_id(&self) -> String;
}

/// Per-install instance id issued by an async identity service.
#[async_trait]
pub trait InstallationIdService: Send + Sync {
    async fn installation_id(&self) -> Result<String, CollaboratorError>;
}

/// Push messaging token. The future may never complete, callers must bound
/// the wait.
#[async_trait]
pub trait PushTokenSource: Send + Sync {
    async fn current_token(&self) -> Option<String>;
}

/// Source of the platform attribution token recorded with the session.
pub trait AttributionTokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

pub struct StaticAttributionSdk {
    install_id: String,
}

impl StaticAttributionSdk {
    pub fn new(install_id: impl Into<String>) -> Self {
        StaticAttributionSdk {
            install_id: install_id.into(),
        }
    }
}

impl AttributionSdk for StaticAttributionSdk {
    fn start(&self) {
        tracing::debug!(install_id = %self.install_id, "Attribution SDK started");
    }

    fn install_id(&self) -> String {
        self.install_id.clone()
    }
}

/// Returns a fixed id, or fails when none was configured.
pub struct StaticInstallationId {
    id: Option<String>,
}

impl StaticInstallationId {
    pub fn new(id: Option<String>) -> Self {
        StaticInstallationId { id }
    }
}

#[async_trait]
impl InstallationIdService for StaticInstallationId {
    async fn installation_id(&self) -> Result<String, CollaboratorError> {
        self.id
            .clone()
            .ok_or_else(|| CollaboratorError("installation id unavailable".into()))
    }
}

/// Resolves to the configured token. Without one the token never arrives,
/// like a device that has not registered for push.
pub struct StaticPushToken {
    token: Option<String>,
}

impl StaticPushToken {
    pub fn new(token: Option<String>) -> Self {
        StaticPushToken { token }
    }
}

#[async_trait]
impl PushTokenSource for StaticPushToken {
    async fn current_token(&self) -> Option<String> {
        match &self.token {
            Some(token) => Some(token.clone()),
            None => std::future::pending().await,
        }
    }
}

pub struct StaticAttributionToken {
    token: Option<String>,
}

impl StaticAttributionToken {
    pub fn new(token: Option<String>) -> Self {
        StaticAttributionToken { token }
    }
}

impl AttributionTokenProvider for StaticAttributionToken {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// The full set of SDK collaborators handed to the gate.
#[derive(Clone)]
pub struct Collaborators {
    pub attribution: Arc<dyn AttributionSdk>,
    pub installations: Arc<dyn InstallationIdService>,
    pub push: Arc<dyn PushTokenSource>,
    pub attribution_tokens: Arc<dyn AttributionTokenProvider>,
}

impl Collaborators {
    /// Static stand-ins returning the configured values.
    pub fn from_config(config: &AttributionConfig) -> Self {
        Collaborators {
            attribution: Arc::new(StaticAttributionSdk::new(
                config.install_id.clone().unwrap_or_default(),
            )),
            installations: Arc::new(StaticInstallationId::new(config.installation_id.clone())),
            push: Arc::new(StaticPushToken::new(config.push_token.clone())),
            attribution_tokens: Arc::new(StaticAttributionToken::new(
                config.attribution_token.clone(),
            )),
        }
    }
}

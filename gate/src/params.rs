use crate::collaborators::{AttributionSdk, InstallationIdService, PushTokenSource};
use crate::config::DeviceInfo;
use crate::context::SessionContext;
use crate::metrics_defs::PUSH_TOKEN_TIMEOUT;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

/// Device and attribution values sent to the backend.
///
/// Optional values that could not be obtained are empty strings, except the
/// attribution token which is carried as absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectedParams {
    pub attribution_id: String,
    pub install_instance_id: String,
    pub session_id: String,
    pub os_version: String,
    pub device_model: String,
    pub bundle_id: String,
    pub push_token: String,
    pub attribution_token: Option<String>,
}

/// Gathers [`CollectedParams`] from the SDK collaborators.
///
/// Collection never fails: a missing push token or install-instance id must
/// not block gate resolution.
pub struct ParamCollector {
    attribution: Arc<dyn AttributionSdk>,
    installations: Arc<dyn InstallationIdService>,
    push: Arc<dyn PushTokenSource>,
    device: DeviceInfo,
    push_timeout: Duration,
}

impl ParamCollector {
    pub fn new(
        attribution: Arc<dyn AttributionSdk>,
        installations: Arc<dyn InstallationIdService>,
        push: Arc<dyn PushTokenSource>,
        device: DeviceInfo,
        push_timeout: Duration,
    ) -> Self {
        ParamCollector {
            attribution,
            installations,
            push,
            device,
            push_timeout,
        }
    }

    pub async fn collect(&self, context: &SessionContext) -> CollectedParams {
        let attribution_id = self.attribution.install_id();

        let installation = async {
            match self.installations.installation_id().await {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(error = %err, "Install-instance id unavailable");
                    String::new()
                }
            }
        };

        let push_token = async {
            match tokio::time::timeout(self.push_timeout, self.push.current_token()).await {
                Ok(token) => token.unwrap_or_default(),
                Err(_) => {
                    counter!(PUSH_TOKEN_TIMEOUT).increment(1);
                    tracing::warn!(
                        timeout_ms = self.push_timeout.as_millis() as u64,
                        "Push token wait timed out, continuing without it"
                    );
                    String::new()
                }
            }
        };

        let (install_instance_id, push_token) = tokio::join!(installation, push_token);

        CollectedParams {
            attribution_id,
            install_instance_id,
            session_id: context.session_id.clone(),
            os_version: self.device.os_version.clone(),
            device_model: self.device.model.clone(),
            bundle_id: self.device.bundle_id.clone(),
            push_token,
            attribution_token: context.attribution_token.clone(),
        }
    }
}

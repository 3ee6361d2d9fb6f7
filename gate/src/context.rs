use crate::collaborators::AttributionTokenProvider;
use crate::events::EventSink;
use crate::identity::IdentityProvider;

/// Per-install identity threaded through one gate run.
///
/// Built once at startup and shared read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub attribution_token: Option<String>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, attribution_token: Option<String>) -> Self {
        SessionContext {
            session_id: session_id.into(),
            attribution_token,
        }
    }

    /// Resolves the install id, reads the attribution token and records the
    /// session with the event sink.
    pub fn establish(
        identity: &IdentityProvider,
        tokens: &dyn AttributionTokenProvider,
        events: &dyn EventSink,
    ) -> Self {
        let context = SessionContext::new(identity.get_or_create_id(), tokens.token());
        events.log_session(&context.session_id, context.attribution_token.as_deref());
        tracing::info!(session_id = %context.session_id, "Session configured");
        context
    }
}

use thiserror::Error;

/// Reasons a gate resolution run can fail.
///
/// Every variant routes the launch to the local experience; none of them is
/// surfaced to the end user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("remote config record is absent or malformed")]
    NoData,

    #[error("could not build a valid URL from config or backend reply")]
    InvalidConfig,

    #[error("network error: {0}")]
    Network(String),

    #[error("overall deadline elapsed")]
    Timeout,
}

impl GateError {
    /// Short stable name, used as a metric tag and event payload value.
    pub const fn kind(&self) -> &'static str {
        match self {
            GateError::NoData => "no_data",
            GateError::InvalidConfig => "invalid_config",
            GateError::Network(_) => "network",
            GateError::Timeout => "timeout",
        }
    }
}

impl From<crate::transport::TransportError> for GateError {
    fn from(err: crate::transport::TransportError) -> Self {
        GateError::Network(err.to_string())
    }
}

/// Failure reported by one of the external SDK collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("collaborator error: {0}")]
pub struct CollaboratorError(pub String);

/// Failure to assemble a [`crate::Gate`] from configuration.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("invalid gate config: {0}")]
    Validation(#[from] crate::config::ValidationError),

    #[error("could not build HTTP transport: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("invalid remote config location: {0}")]
    ConfigLocation(#[from] url::ParseError),
}

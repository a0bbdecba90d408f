use thiserror::Error;

/// Failures surfaced by a dispatch call or its [`DispatchHandle`].
///
/// [`DispatchHandle`]: crate::DispatchHandle
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("action `{action}` returns a deferred update but no tokio runtime is running")]
    NoRuntime { action: String },

    #[error("action `{action}` failed: {source}")]
    Action {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("action `{action}` panicked while resolving")]
    Panicked { action: String },

    #[error("action `{action}` was cancelled before resolving")]
    Cancelled { action: String },

    #[error("{} actions failed", .0.len())]
    Multiple(Vec<DispatchError>),
}

impl DispatchError {
    /// Identifiers of the actions behind this error.
    pub fn actions(&self) -> Vec<&str> {
        match self {
            Self::NoRuntime { action }
            | Self::Action { action, .. }
            | Self::Panicked { action }
            | Self::Cancelled { action } => vec![action.as_str()],
            Self::Multiple(errors) => errors.iter().flat_map(DispatchError::actions).collect(),
        }
    }
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

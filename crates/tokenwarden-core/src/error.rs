use thiserror::Error;

/// Failures of a durable key-value backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Failures raised by the credential store on write paths.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to serialize credential: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Unexpected faults raised by the identity-provider collaborator.
///
/// Credential-level refusals are not faults: they arrive as a `ProviderResponse`
/// carrying an `error` code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Identity provider failed to initialize: {0}")]
    Init(String),

    #[error("Identity provider transport failure: {0}")]
    Transport(String),
}

/// Why a silent renewal did not produce a credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    #[error("Identity provider client is not initialized")]
    NotInitialized,

    #[error("Provider rejected silent renewal: {0}")]
    ProviderRejected(String),

    #[error("Provider returned no credential")]
    NoResponse,

    #[error("Identity provider fault: {0}")]
    Provider(String),

    #[error("Failed to persist renewed credential: {0}")]
    Storage(String),

    #[error("Session ended before the renewal completed")]
    SessionEnded,
}

impl RenewalError {
    /// The provider wants the user back in an interactive flow.
    ///
    /// `NoResponse` is treated the same as an explicit rejection.
    pub fn requires_interaction(&self) -> bool {
        matches!(self, RenewalError::ProviderRejected(_) | RenewalError::NoResponse)
    }

    /// Collaborator faults are the only renewal failures surfaced as errors to callers.
    pub fn is_fault(&self) -> bool {
        matches!(self, RenewalError::Provider(_))
    }
}

impl From<ProviderError> for RenewalError {
    fn from(err: ProviderError) -> Self {
        RenewalError::Provider(err.to_string())
    }
}

/// Errors escaping the session façade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Identity provider fault: {0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renewal_error_classification() {
        assert!(RenewalError::ProviderRejected("consent_required".into()).requires_interaction());
        assert!(RenewalError::NoResponse.requires_interaction());
        assert!(!RenewalError::NotInitialized.requires_interaction());
        assert!(RenewalError::Provider("boom".into()).is_fault());
        assert!(!RenewalError::Storage("disk full".into()).is_fault());
        assert!(!RenewalError::SessionEnded.is_fault());
        assert!(!RenewalError::SessionEnded.requires_interaction());
    }

    #[test]
    fn test_provider_error_converts_to_fault() {
        let err: RenewalError = ProviderError::Transport("connection reset".into()).into();
        assert_eq!(
            err,
            RenewalError::Provider("Identity provider transport failure: connection reset".into())
        );
    }
}

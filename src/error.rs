//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`Result<T>`], a typed alias over [`MfaError`].
//! The variant set mirrors the error taxonomy surfaced across the registration/service boundary:
//! contract violations by the caller, transport failures, biometric failures, and data corruption
//! are kept distinct so a host can decide per-class whether to retry, prompt again, or give up.

use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, MfaError>;

#[derive(Debug, Error)]
pub enum MfaError {
    #[error("failed to decode response data: {0}")]
    DataDecodingFailed(String),

    #[error("invalid registration data")]
    InvalidRegistrationData,

    #[error("invalid provider state")]
    InvalidState,

    #[error("invalid signing algorithm")]
    InvalidAlgorithm,

    #[error("no enrollable factors were advertised by the server")]
    NoEnrollableFactors,

    #[error("signature method not enabled: {0}")]
    SignatureMethodNotEnabled(String),

    #[error("factor enrollment failed: {0}")]
    EnrollmentFailed(String),

    #[error("failed to initialize registration data: {0}")]
    DataInitializationFailed(String),

    #[error("token response is missing an authenticator identifier")]
    MissingAuthenticatorIdentifier,

    #[error("biometric evaluation failed: {0}")]
    BiometryFailed(String),

    #[error("biometric verification failed: {0}")]
    FailedBiometryVerification(String),

    #[error("token not found")]
    TokenNotFound,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("unexpected key store data: {0}")]
    UnexpectedData(String),

    #[error("key store operation failed: {0}")]
    UnhandledError(String),

    #[error("transport error: status {status}, body: {body}")]
    Transport { status: u16, body: String },

    #[error(transparent)]
    UnderlyingError(#[from] anyhow::Error),
}

impl From<serde_json::Error> for MfaError {
    fn from(err: serde_json::Error) -> Self {
        MfaError::DataDecodingFailed(err.to_string())
    }
}

impl From<rsa::Error> for MfaError {
    fn from(err: rsa::Error) -> Self {
        MfaError::UnderlyingError(anyhow::anyhow!(err))
    }
}

impl From<rsa::pkcs8::Error> for MfaError {
    fn from(err: rsa::pkcs8::Error) -> Self {
        MfaError::UnderlyingError(anyhow::anyhow!(err))
    }
}

impl From<rsa::pkcs8::spki::Error> for MfaError {
    fn from(err: rsa::pkcs8::spki::Error) -> Self {
        MfaError::UnderlyingError(anyhow::anyhow!(err))
    }
}

impl From<url::ParseError> for MfaError {
    fn from(err: url::ParseError) -> Self {
        MfaError::DataDecodingFailed(err.to_string())
    }
}

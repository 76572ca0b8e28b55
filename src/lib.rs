//! Core registration and transaction-signing library for a mobile multi-factor authenticator.
//!
//! Given a bootstrap payload (scanned QR code or in-app initiation response), this crate drives
//! the cloud or on-premise registration flow, enrolls biometric/user-presence factors against the
//! host's local key store, and afterward lets the host poll and sign pending transactions against
//! whichever backend produced the resulting [`authenticator::Authenticator`].
//!
//! Everything platform-specific — HTTP transport, the secure key store, biometric evaluation, and
//! on-premise OAuth exchange — is modeled as a trait in [`capabilities`]; the host supplies real
//! implementations, this crate supplies none beyond its own test mocks.

pub mod algorithm;
pub mod authenticator;
pub mod capabilities;
pub mod crypto;
pub mod error;
pub mod factor;
pub mod logging;
pub mod otp;
pub mod registration;
pub mod service;
pub mod transaction;

pub use algorithm::SigningAlgorithm;
pub use authenticator::{Authenticator, CloudAuthenticator, OAuthToken, OnPremiseAuthenticator};
pub use error::{MfaError, Result};
pub use factor::{BiometricFactorInfo, Factor, FactorType, HOTPFactorInfo, TOTPFactorInfo, UserPresenceFactorInfo};
pub use otp::{parse_otpauth_uri, OtpAuthUri};
pub use registration::{
    BootstrapVersion, CloudBootstrap, CloudRegistrationProvider, OnPremiseBootstrap, OnPremiseRegistrationProvider,
    RegistrationController, RegistrationSession,
};
pub use service::{CloudService, MFAServiceController, MfaService, NextTransaction, OnPremiseService};
pub use transaction::{PendingTransaction, TransactionAction};

//! `SigningAlgorithm` — the alias-tolerant bridge between the server's many spellings of a hash
//! algorithm and a single internal identity.
//!
//! Servers name the same four hash algorithms differently depending on deployment: a cloud tenant
//! might send `"RSASHA256"`, an on-premise access manager `"SHA256withRSA"`, and an OTP URI plain
//! `"SHA256"`. [`SigningAlgorithm::parse`] accepts all of them; [`SigningAlgorithm::cloud_spelling`]
//! and [`SigningAlgorithm::onprem_spelling`] produce the two canonical outbound forms.

use crate::error::{MfaError, Result};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl SigningAlgorithm {
    /// Parse any of the server's spellings, case-insensitively. Unknown input fails.
    pub fn parse(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let algorithm = match upper.as_str() {
            "SHA1" | "HMACSHA1" | "RSASHA1" | "SHA1WITHRSA" => SigningAlgorithm::Sha1,
            "SHA256" | "HMACSHA256" | "RSASHA256" | "SHA256WITHRSA" => SigningAlgorithm::Sha256,
            "SHA384" | "HMACSHA384" | "RSASHA384" | "SHA384WITHRSA" => SigningAlgorithm::Sha384,
            "SHA512" | "HMACSHA512" | "RSASHA512" | "SHA512WITHRSA" => SigningAlgorithm::Sha512,
            _ => return Err(MfaError::InvalidAlgorithm),
        };
        Ok(algorithm)
    }

    /// Canonical cloud wire spelling. `sha1` is never emitted; it is silently substituted with
    /// `RSASHA256` because the cloud tenant never negotiates sha1 as a preferred algorithm.
    pub fn cloud_spelling(self) -> &'static str {
        match self {
            SigningAlgorithm::Sha1 => {
                tracing::debug!("substituting RSASHA256 for sha1 on cloud outbound spelling");
                "RSASHA256"
            }
            SigningAlgorithm::Sha256 => "RSASHA256",
            SigningAlgorithm::Sha384 => "RSASHA384",
            SigningAlgorithm::Sha512 => "RSASHA512",
        }
    }

    /// Canonical on-premise wire spelling, with the same sha1 substitution policy.
    pub fn onprem_spelling(self) -> &'static str {
        match self {
            SigningAlgorithm::Sha1 => {
                tracing::debug!("substituting SHA512withRSA for sha1 on on-premise outbound spelling");
                "SHA512withRSA"
            }
            SigningAlgorithm::Sha256 => "SHA256withRSA",
            SigningAlgorithm::Sha384 => "SHA384withRSA",
            SigningAlgorithm::Sha512 => "SHA512withRSA",
        }
    }

    /// Hash `bytes` with the digest this algorithm selects.
    pub fn hash(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            SigningAlgorithm::Sha1 => Sha1::digest(bytes).to_vec(),
            SigningAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            SigningAlgorithm::Sha384 => Sha384::digest(bytes).to_vec(),
            SigningAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIASES: &[(SigningAlgorithm, &[&str])] = &[
        (SigningAlgorithm::Sha1, &["SHA1", "HMACSHA1", "RSASHA1", "SHA1WITHRSA"]),
        (SigningAlgorithm::Sha256, &["SHA256", "HMACSHA256", "RSASHA256", "SHA256WITHRSA"]),
        (SigningAlgorithm::Sha384, &["SHA384", "HMACSHA384", "RSASHA384", "SHA384WITHRSA"]),
        (SigningAlgorithm::Sha512, &["SHA512", "HMACSHA512", "RSASHA512", "SHA512WITHRSA"]),
    ];

    #[test]
    fn parses_every_alias_case_insensitively() {
        for (algorithm, aliases) in ALIASES {
            for alias in *aliases {
                assert_eq!(SigningAlgorithm::parse(&alias.to_uppercase()).unwrap(), *algorithm);
                assert_eq!(SigningAlgorithm::parse(&alias.to_lowercase()).unwrap(), *algorithm);
            }
        }
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!(matches!(
            SigningAlgorithm::parse("INVALID"),
            Err(MfaError::InvalidAlgorithm)
        ));
    }

    #[test]
    fn cloud_spellings_substitute_sha1() {
        assert_eq!(SigningAlgorithm::Sha256.cloud_spelling(), "RSASHA256");
        assert_eq!(SigningAlgorithm::Sha384.cloud_spelling(), "RSASHA384");
        assert_eq!(SigningAlgorithm::Sha512.cloud_spelling(), "RSASHA512");
        assert_eq!(SigningAlgorithm::Sha1.cloud_spelling(), "RSASHA256");
    }

    #[test]
    fn onprem_spellings_substitute_sha1() {
        assert_eq!(SigningAlgorithm::Sha256.onprem_spelling(), "SHA256withRSA");
        assert_eq!(SigningAlgorithm::Sha384.onprem_spelling(), "SHA384withRSA");
        assert_eq!(SigningAlgorithm::Sha512.onprem_spelling(), "SHA512withRSA");
        assert_eq!(SigningAlgorithm::Sha1.onprem_spelling(), "SHA512withRSA");
    }

    #[test]
    fn round_trips_through_every_outbound_spelling() {
        for algorithm in [SigningAlgorithm::Sha256, SigningAlgorithm::Sha384, SigningAlgorithm::Sha512] {
            assert_eq!(SigningAlgorithm::parse(algorithm.cloud_spelling()).unwrap(), algorithm);
            assert_eq!(SigningAlgorithm::parse(algorithm.onprem_spelling()).unwrap(), algorithm);
        }
    }

    #[test]
    fn serializes_to_lowercase() {
        assert_eq!(serde_json::to_string(&SigningAlgorithm::Sha256).unwrap(), "\"sha256\"");
    }
}

//! The enrolled-factor tagged union and its single-key persisted form.
//!
//! A [`FactorType`] is encoded as a JSON object with exactly one key, the variant tag
//! (`"totp"`, `"hotp"`, `"biometric"`, `"userPresence"`), whose value is the variant's own
//! payload. Decoding an object with none of those keys — most commonly `{}` — fails with the
//! fixed diagnostic `"No valid factor type found."`, which callers may depend on for diagnostics.

use crate::algorithm::SigningAlgorithm;
use crate::error::{MfaError, Result};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Common capability exposed by every factor variant once its tag has been erased.
pub trait Factor {
    fn id(&self) -> &str;
    fn display_name(&self) -> &'static str;
    fn image_name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricFactorInfo {
    pub id: String,
    pub name: String,
    pub algorithm: SigningAlgorithm,
}

impl Factor for BiometricFactorInfo {
    fn id(&self) -> &str {
        &self.id
    }
    fn display_name(&self) -> &'static str {
        "Face ID"
    }
    fn image_name(&self) -> &'static str {
        "faceid"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPresenceFactorInfo {
    pub id: String,
    pub name: String,
    pub algorithm: SigningAlgorithm,
}

impl Factor for UserPresenceFactorInfo {
    fn id(&self) -> &str {
        &self.id
    }
    fn display_name(&self) -> &'static str {
        "User presence"
    }
    fn image_name(&self) -> &'static str {
        "hand.tap"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TOTPFactorInfo {
    pub id: String,
    pub secret: String,
    pub algorithm: SigningAlgorithm,
    pub digits: u8,
    pub period: u32,
}

impl TOTPFactorInfo {
    /// Construct with validation: `digits` must be 6 or 8, `period` must lie in `[10, 300]`.
    pub fn new(id: String, secret: String, algorithm: SigningAlgorithm, digits: u8, period: u32) -> Result<Self> {
        if digits != 6 && digits != 8 {
            return Err(MfaError::DataInitializationFailed(format!(
                "unsupported TOTP digit count: {digits}"
            )));
        }
        if !(10..=300).contains(&period) {
            return Err(MfaError::DataInitializationFailed(format!(
                "TOTP period out of range [10, 300]: {period}"
            )));
        }
        Ok(Self { id, secret, algorithm, digits, period })
    }
}

impl Factor for TOTPFactorInfo {
    fn id(&self) -> &str {
        &self.id
    }
    fn display_name(&self) -> &'static str {
        "Authenticator"
    }
    fn image_name(&self) -> &'static str {
        "clock"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HOTPFactorInfo {
    pub id: String,
    pub secret: String,
    pub algorithm: SigningAlgorithm,
    pub digits: u8,
    pub counter: u64,
}

impl HOTPFactorInfo {
    /// Construct with validation: `digits` must be 6 or 8. `counter` defaults to 1 when unset by
    /// the caller (see [`crate::otp`]).
    pub fn new(id: String, secret: String, algorithm: SigningAlgorithm, digits: u8, counter: u64) -> Result<Self> {
        if digits != 6 && digits != 8 {
            return Err(MfaError::DataInitializationFailed(format!(
                "unsupported HOTP digit count: {digits}"
            )));
        }
        Ok(Self { id, secret, algorithm, digits, counter })
    }
}

impl Factor for HOTPFactorInfo {
    fn id(&self) -> &str {
        &self.id
    }
    fn display_name(&self) -> &'static str {
        "Authenticator"
    }
    fn image_name(&self) -> &'static str {
        "clock"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FactorType {
    Totp(TOTPFactorInfo),
    Hotp(HOTPFactorInfo),
    Biometric(BiometricFactorInfo),
    UserPresence(UserPresenceFactorInfo),
}

impl FactorType {
    fn tag(&self) -> &'static str {
        match self {
            FactorType::Totp(_) => "totp",
            FactorType::Hotp(_) => "hotp",
            FactorType::Biometric(_) => "biometric",
            FactorType::UserPresence(_) => "userPresence",
        }
    }

    pub fn as_factor(&self) -> &dyn Factor {
        match self {
            FactorType::Totp(f) => f,
            FactorType::Hotp(f) => f,
            FactorType::Biometric(f) => f,
            FactorType::UserPresence(f) => f,
        }
    }

    pub fn id(&self) -> &str {
        self.as_factor().id()
    }

    pub fn display_name(&self) -> &'static str {
        self.as_factor().display_name()
    }

    pub fn image_name(&self) -> &'static str {
        self.as_factor().image_name()
    }

    /// The key-store label and signing hash, present only for biometric/userPresence factors —
    /// the sole handle callers need to locate the backing private key.
    pub fn name_and_algorithm(&self) -> Option<(String, SigningAlgorithm)> {
        match self {
            FactorType::Biometric(f) => Some((f.name.clone(), f.algorithm)),
            FactorType::UserPresence(f) => Some((f.name.clone(), f.algorithm)),
            FactorType::Totp(_) | FactorType::Hotp(_) => None,
        }
    }

    /// The key-store label, aka `name`. `None` for totp/hotp, which have no backing key.
    pub fn key_label(&self) -> Option<String> {
        self.name_and_algorithm().map(|(name, _)| name)
    }
}

impl Serialize for FactorType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            FactorType::Totp(f) => map.serialize_entry(self.tag(), f)?,
            FactorType::Hotp(f) => map.serialize_entry(self.tag(), f)?,
            FactorType::Biometric(f) => map.serialize_entry(self.tag(), f)?,
            FactorType::UserPresence(f) => map.serialize_entry(self.tag(), f)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FactorType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let object = value.as_object();

        let found = object.and_then(|object| {
            if let Some(v) = object.get("totp") {
                serde_json::from_value(v.clone()).ok().map(FactorType::Totp)
            } else if let Some(v) = object.get("hotp") {
                serde_json::from_value(v.clone()).ok().map(FactorType::Hotp)
            } else if let Some(v) = object.get("biometric") {
                serde_json::from_value(v.clone()).ok().map(FactorType::Biometric)
            } else if let Some(v) = object.get("userPresence") {
                serde_json::from_value(v.clone()).ok().map(FactorType::UserPresence)
            } else {
                None
            }
        });

        found.ok_or_else(|| de::Error::custom("No valid factor type found."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_factors() -> Vec<FactorType> {
        vec![
            FactorType::Totp(
                TOTPFactorInfo::new("t-1".into(), "JBSWY3DPEHPK3PXP".into(), SigningAlgorithm::Sha1, 6, 30).unwrap(),
            ),
            FactorType::Hotp(
                HOTPFactorInfo::new("h-1".into(), "JBSWY3DPEHPK3PXP".into(), SigningAlgorithm::Sha1, 6, 1).unwrap(),
            ),
            FactorType::Biometric(BiometricFactorInfo {
                id: "b-1".into(),
                name: "K-bio".into(),
                algorithm: SigningAlgorithm::Sha256,
            }),
            FactorType::UserPresence(UserPresenceFactorInfo {
                id: "u-1".into(),
                name: "K-up".into(),
                algorithm: SigningAlgorithm::Sha256,
            }),
        ]
    }

    #[test]
    fn round_trips_every_variant() {
        for factor in sample_factors() {
            let encoded = serde_json::to_value(&factor).unwrap();
            let decoded: FactorType = serde_json::from_value(encoded).unwrap();
            assert_eq!(decoded, factor);
        }
    }

    #[test]
    fn empty_object_fails_with_fixed_message() {
        let err = serde_json::from_value::<FactorType>(serde_json::json!({})).unwrap_err();
        assert!(err.to_string().contains("No valid factor type found."));
    }

    #[test]
    fn unrecognized_keys_fail_with_fixed_message() {
        let err = serde_json::from_value::<FactorType>(serde_json::json!({"unknown": {}})).unwrap_err();
        assert!(err.to_string().contains("No valid factor type found."));
    }

    #[test]
    fn biometric_encoding_omits_derived_fields() {
        let factor = FactorType::Biometric(BiometricFactorInfo {
            id: "b-1".into(),
            name: "K-bio".into(),
            algorithm: SigningAlgorithm::Sha256,
        });
        let encoded = serde_json::to_value(&factor).unwrap();
        let inner = encoded.get("biometric").unwrap().as_object().unwrap();
        let mut keys: Vec<&str> = inner.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["algorithm", "id", "name"]);
    }

    #[test]
    fn totp_rejects_out_of_range_period() {
        let err = TOTPFactorInfo::new("t-1".into(), "SECRET".into(), SigningAlgorithm::Sha1, 6, 5).unwrap_err();
        assert!(matches!(err, MfaError::DataInitializationFailed(_)));
    }

    #[test]
    fn name_and_algorithm_only_for_biometric_and_user_presence() {
        for factor in sample_factors() {
            match &factor {
                FactorType::Biometric(_) | FactorType::UserPresence(_) => {
                    assert!(factor.name_and_algorithm().is_some());
                }
                FactorType::Totp(_) | FactorType::Hotp(_) => {
                    assert!(factor.name_and_algorithm().is_none());
                }
            }
        }
    }
}

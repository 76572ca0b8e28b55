//! Ingestion of `otpauth://{totp|hotp}/{label}?...` URIs (typically scanned from a QR code) into
//! the factor model. Generating the rolling code from the ingested secret is out of scope; only
//! parsing the URI into a [`TOTPFactorInfo`]/[`HOTPFactorInfo`] is implemented here.

use crate::algorithm::SigningAlgorithm;
use crate::error::{MfaError, Result};
use crate::factor::{FactorType, HOTPFactorInfo, TOTPFactorInfo};
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

/// The factor parsed from an otpauth URI, plus the account/issuer names derived from its label.
#[derive(Debug, Clone)]
pub struct OtpAuthUri {
    pub factor: FactorType,
    pub account_name: String,
    pub issuer: Option<String>,
}

pub fn parse_otpauth_uri(uri: &str) -> Result<OtpAuthUri> {
    let url = Url::parse(uri).map_err(|_| MfaError::DataDecodingFailed("malformed otpauth URI".to_string()))?;

    if url.scheme() != "otpauth" {
        return Err(MfaError::DataDecodingFailed(format!("unsupported URI scheme: {}", url.scheme())));
    }

    let kind = url
        .host_str()
        .ok_or_else(|| MfaError::DataDecodingFailed("otpauth URI is missing a host".to_string()))?
        .to_ascii_lowercase();

    let label = percent_decode(url.path().trim_start_matches('/'));
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    let secret = query
        .get("secret")
        .ok_or_else(|| MfaError::DataDecodingFailed("otpauth URI is missing a secret".to_string()))?
        .clone();
    validate_base32_secret(&secret)?;

    let algorithm = match query.get("algorithm") {
        Some(value) => SigningAlgorithm::parse(value)?,
        None => SigningAlgorithm::Sha1,
    };

    let digits: u8 = match query.get("digits") {
        Some(value) => value
            .parse()
            .map_err(|_| MfaError::DataDecodingFailed(format!("invalid digits value: {value}")))?,
        None => 6,
    };

    let id = Uuid::new_v4().to_string();

    let factor = match kind.as_str() {
        "totp" => {
            let period: u32 = match query.get("period") {
                Some(value) => value
                    .parse()
                    .map_err(|_| MfaError::DataDecodingFailed(format!("invalid period value: {value}")))?,
                None => 30,
            };
            FactorType::Totp(TOTPFactorInfo::new(id, secret, algorithm, digits, period)?)
        }
        "hotp" => {
            let counter: u64 = match query.get("counter") {
                Some(value) => value
                    .parse()
                    .map_err(|_| MfaError::DataDecodingFailed(format!("invalid counter value: {value}")))?,
                None => 1,
            };
            FactorType::Hotp(HOTPFactorInfo::new(id, secret, algorithm, digits, counter)?)
        }
        other => return Err(MfaError::DataDecodingFailed(format!("unsupported otpauth host: {other}"))),
    };

    let issuer = query.get("issuer").cloned();
    let (account_name, issuer) = split_label(&label, issuer);

    Ok(OtpAuthUri { factor, account_name, issuer })
}

/// Splits a label on its first `:` only when the left side matches the `issuer` query parameter,
/// per the Google Authenticator Key URI convention this format follows.
fn split_label(label: &str, issuer: Option<String>) -> (String, Option<String>) {
    if let Some(idx) = label.find(':') {
        let (left, right) = label.split_at(idx);
        let right = right.trim_start_matches(':').trim().to_string();
        if issuer.as_deref() == Some(left) {
            return (right, Some(left.to_string()));
        }
    }
    (label.to_string(), issuer)
}

fn validate_base32_secret(secret: &str) -> Result<()> {
    base32::decode(base32::Alphabet::RFC4648 { padding: true }, secret)
        .map(|_| ())
        .ok_or_else(|| MfaError::DataDecodingFailed("secret is not valid Base-32".to_string()))
}

/// Minimal percent-decoder for the URI path component (`Url::path()` leaves it encoded).
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_totp_uri_with_defaults() {
        let parsed = parse_otpauth_uri("otpauth://totp/Example:alice@example.com?secret=JBSWY3DPEHPK3PXP&issuer=Example").unwrap();
        match parsed.factor {
            FactorType::Totp(info) => {
                assert_eq!(info.digits, 6);
                assert_eq!(info.period, 30);
                assert_eq!(info.algorithm, SigningAlgorithm::Sha1);
                assert_eq!(info.secret, "JBSWY3DPEHPK3PXP");
            }
            _ => panic!("expected totp"),
        }
        assert_eq!(parsed.account_name, "alice@example.com");
        assert_eq!(parsed.issuer.as_deref(), Some("Example"));
    }

    #[test]
    fn parses_hotp_uri_with_explicit_counter() {
        let parsed = parse_otpauth_uri("otpauth://hotp/alice?secret=JBSWY3DPEHPK3PXP&counter=5&digits=8").unwrap();
        match parsed.factor {
            FactorType::Hotp(info) => {
                assert_eq!(info.counter, 5);
                assert_eq!(info.digits, 8);
            }
            _ => panic!("expected hotp"),
        }
    }

    #[test]
    fn rejects_unparseable_algorithm() {
        let err = parse_otpauth_uri("otpauth://totp/alice?secret=JBSWY3DPEHPK3PXP&algorithm=MD5").unwrap_err();
        assert!(matches!(err, MfaError::InvalidAlgorithm));
    }

    #[test]
    fn rejects_period_out_of_range() {
        let err = parse_otpauth_uri("otpauth://totp/alice?secret=JBSWY3DPEHPK3PXP&period=5").unwrap_err();
        assert!(matches!(err, MfaError::DataInitializationFailed(_)));
    }

    #[test]
    fn rejects_invalid_base32_secret() {
        let err = parse_otpauth_uri("otpauth://totp/alice?secret=not-base32!").unwrap_err();
        assert!(matches!(err, MfaError::DataDecodingFailed(_)));
    }

    #[test]
    fn label_without_issuer_match_is_kept_whole() {
        let parsed = parse_otpauth_uri("otpauth://totp/bob@example.com?secret=JBSWY3DPEHPK3PXP&issuer=Example").unwrap();
        assert_eq!(parsed.account_name, "bob@example.com");
    }
}

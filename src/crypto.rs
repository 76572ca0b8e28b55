//! RSA key generation, challenge signing, and public-key encoding.
//!
//! The factor model only ever stores a key-store *label*; the raw private key material lives
//! here just long enough to be signed with and handed to the caller's key-store capability.
//! [`SigningKeyPair`] zeroizes on drop via `rsa`'s own `Drop` implementation for `RsaPrivateKey`.

use crate::algorithm::SigningAlgorithm;
use crate::error::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use signature::SignatureEncoding;
use signature::Signer;

/// Default RSA modulus size for freshly enrolled factors.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// A generated RSA key pair, retained only for the duration of a single enrollment.
pub struct SigningKeyPair {
    private_key: RsaPrivateKey,
}

impl SigningKeyPair {
    /// Generate a fresh 2048-bit RSA key pair.
    pub fn generate() -> Result<Self> {
        Self::generate_with_bits(DEFAULT_KEY_BITS)
    }

    pub fn generate_with_bits(bits: usize) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)?;
        Ok(Self { private_key })
    }

    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.private_key)
    }

    /// Encode the public key as a Base64 X.509 SubjectPublicKeyInfo DER document, the wire form
    /// both the cloud and on-premise enrollment bodies expect under `publicKey`.
    pub fn public_key_x509_base64(&self) -> Result<String> {
        let der = self.public_key().to_public_key_der()?;
        Ok(base64::engine::general_purpose::STANDARD.encode(der.as_bytes()))
    }

    /// Hash `data` with `algorithm`'s digest and RSA-PKCS1v15-sign it, returning the raw
    /// signature bytes (callers Base64URL-encode separately via [`encode_signature`]).
    pub fn sign(&self, algorithm: SigningAlgorithm, data: &[u8]) -> Vec<u8> {
        match algorithm {
            SigningAlgorithm::Sha1 => {
                SigningKey::<Sha1>::new(self.private_key.clone()).sign(data).to_vec()
            }
            SigningAlgorithm::Sha256 => {
                SigningKey::<Sha256>::new(self.private_key.clone()).sign(data).to_vec()
            }
            SigningAlgorithm::Sha384 => {
                SigningKey::<Sha384>::new(self.private_key.clone()).sign(data).to_vec()
            }
            SigningAlgorithm::Sha512 => {
                SigningKey::<Sha512>::new(self.private_key.clone()).sign(data).to_vec()
            }
        }
    }

    /// Convenience combining `sign` with the Base64URL encoding the wire protocols expect.
    pub fn sign_and_encode(&self, algorithm: SigningAlgorithm, data: &[u8]) -> String {
        encode_signature(&self.sign(algorithm, data))
    }

    /// Encode the private key as PKCS#8 DER for handoff to a key-store capability.
    pub fn private_key_pkcs8_der(&self) -> Result<Vec<u8>> {
        Ok(self.private_key.to_pkcs8_der()?.as_bytes().to_vec())
    }

    pub fn into_private_key(self) -> RsaPrivateKey {
        self.private_key
    }
}

/// Base64URL-encode (no padding) a raw signature, as every signed challenge on the wire expects.
pub fn encode_signature(signature: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(signature)
}

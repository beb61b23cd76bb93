//! Signing key management backing the `token` module's opaque bearer tokens.
//!
//! Grounded on the teacher's `Keys` (a `Parser`-derived `Options`, a
//! `Keys::new`/`sign`/`verify` shape, a `SharedKeys = Arc<Keys>` alias), with
//! the Ethereum wallet signer swapped for HMAC-SHA256 against an opaque
//! shared secret.

use clap::Parser;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, PartialEq, Eq, Parser)]
pub struct Options {
    /// Base64-encoded signing secret for bearer tokens. A random secret is
    /// generated at startup if none is given; this means tokens do not
    /// survive a restart unless a fixed secret is configured, which is the
    /// correct default for a single-process, single-coordinator service.
    #[clap(long, env)]
    pub token_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("couldn't sign the message")]
    SignatureCreation,
    #[error("signature is not valid base64")]
    InvalidEncoding,
    #[error("signature does not match the message")]
    InvalidSignature,
}

pub struct Keys {
    secret: Vec<u8>,
}

pub type SharedKeys = Arc<Keys>;

impl Keys {
    pub fn new(options: &Options) -> eyre::Result<Self> {
        let secret = match &options.token_secret {
            Some(encoded) => base64::decode(encoded)?,
            None => {
                use rand::RngCore;
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                bytes.to_vec()
            }
        };
        Ok(Self { secret })
    }

    #[cfg(test)]
    pub fn from_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, message: &str) -> Result<String, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| SignatureError::SignatureCreation)?;
        mac.update(message.as_bytes());
        Ok(base64::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, message: &str, signature: &str) -> Result<(), SignatureError> {
        let bytes = base64::decode(signature).map_err(|_| SignatureError::InvalidEncoding)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| SignatureError::SignatureCreation)?;
        mac.update(message.as_bytes());
        mac.verify_slice(&bytes)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let keys = Keys::from_secret(b"test-secret".to_vec());
        let message = r#"{"sub":"hello world","exp":200000000000}"#;
        let signature = keys.sign(message).unwrap();
        keys.verify(message, &signature).unwrap();
    }

    #[test]
    fn tampered_message_fails_verification() {
        let keys = Keys::from_secret(b"test-secret".to_vec());
        let signature = keys.sign("original").unwrap();
        assert!(keys.verify("tampered", &signature).is_err());
    }

    #[test]
    fn different_secrets_disagree() {
        let a = Keys::from_secret(b"secret-a".to_vec());
        let b = Keys::from_secret(b"secret-b".to_vec());
        let signature = a.sign("message").unwrap();
        assert!(b.verify("message", &signature).is_err());
    }
}

//! C2 TokenIssuer: opaque bearer tokens binding `(sessionId, role, subject, exp)`.
//!
//! A token is `base64(payload_json) + "." + base64(hmac_signature)`, grounded
//! on the teacher's `Receipt`/`SignedReceipt` envelope shape in `jwt.rs`
//! (a payload plus a detached signature) but carrying the claims this
//! system's §4.8 connection handshake actually needs instead of an identity
//! OAuth receipt. Tokens are opaque to clients: nothing says a client may
//! decode the payload itself, only that the server can verify it.

use crate::errors::{AppError, AppErrorCode};
use crate::keys::SharedKeys;
use serde::{Deserialize, Serialize};

/// The role a connection authenticates as (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Participant,
    Controller,
    Bigscreen,
    Tester,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    session_id: String,
    role: Role,
    subject: String,
    /// Unix millis after which the token is no longer accepted.
    exp: i64,
}

#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub session_id: String,
    pub role: Role,
    pub subject: String,
}

pub struct TokenIssuer {
    keys: SharedKeys,
}

impl TokenIssuer {
    pub fn new(keys: SharedKeys) -> Self {
        Self { keys }
    }

    /// Issue a token valid until `now_millis + ttl_millis`.
    pub fn issue(
        &self,
        session_id: &str,
        role: Role,
        subject: &str,
        now_millis: i64,
        ttl_millis: i64,
    ) -> Result<String, AppError> {
        let claims = Claims {
            session_id: session_id.to_owned(),
            role,
            subject: subject.to_owned(),
            exp: now_millis + ttl_millis,
        };
        let payload = serde_json::to_vec(&claims)
            .map_err(|_| AppError::new(AppErrorCode::Internal))?;
        let payload_b64 = base64::encode(&payload);
        let signature = self
            .keys
            .sign(&payload_b64)
            .map_err(|_| AppError::new(AppErrorCode::Internal))?;
        Ok(format!("{payload_b64}.{signature}"))
    }

    /// Verify a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str, now_millis: i64) -> Result<VerifiedClaims, AppError> {
        let (payload_b64, signature) = token
            .split_once('.')
            .ok_or_else(|| AppError::new(AppErrorCode::MissingToken))?;

        self.keys
            .verify(payload_b64, signature)
            .map_err(|_| AppError::new(AppErrorCode::MissingToken))?;

        let payload = base64::decode(payload_b64)
            .map_err(|_| AppError::new(AppErrorCode::MissingToken))?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|_| AppError::new(AppErrorCode::MissingToken))?;

        if claims.exp <= now_millis {
            return Err(AppError::new(AppErrorCode::ExpiredToken));
        }

        Ok(VerifiedClaims {
            session_id: claims.session_id,
            role: claims.role,
            subject: claims.subject,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keys;
    use std::sync::Arc;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(Arc::new(Keys::from_secret(b"test-secret".to_vec())))
    }

    #[test]
    fn issues_and_verifies_a_token() {
        let issuer = issuer();
        let token = issuer
            .issue("session-1", Role::Participant, "participant-1", 1_000, 60_000)
            .unwrap();
        let claims = issuer.verify(&token, 1_500).unwrap();
        assert_eq!(claims.session_id, "session-1");
        assert_eq!(claims.subject, "participant-1");
        assert_eq!(claims.role, Role::Participant);
    }

    #[test]
    fn rejects_expired_token() {
        let issuer = issuer();
        let token = issuer
            .issue("session-1", Role::Controller, "host-1", 1_000, 1_000)
            .unwrap();
        let err = issuer.verify(&token, 5_000).unwrap_err();
        assert_eq!(err.code, AppErrorCode::ExpiredToken);
    }

    #[test]
    fn rejects_tampered_token() {
        let issuer = issuer();
        let mut token = issuer
            .issue("session-1", Role::Bigscreen, "display-1", 1_000, 60_000)
            .unwrap();
        token.push('x');
        assert!(issuer.verify(&token, 1_500).is_err());
    }

    #[test]
    fn rejects_malformed_token() {
        let issuer = issuer();
        assert!(issuer.verify("not-a-token", 1_500).is_err());
    }
}

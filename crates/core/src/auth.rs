//! Bearer tokens binding a request to the user who owns it.
//!
//! Format: `{user_id}.{hex(hmac_sha256(secret, user_id))}`. The user id may
//! itself contain dots; the signature is always the part after the last one.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

use crate::domain::action::UserId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("authorization header is missing")]
    Missing,
    #[error("authorization header must use the Bearer scheme")]
    WrongScheme,
    #[error("bearer token is malformed")]
    Malformed,
    #[error("bearer token signature does not match")]
    BadSignature,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: SecretString,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("secret", &"[REDACTED]").finish()
    }
}

impl TokenSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn issue(&self, user_id: &UserId) -> String {
        format!("{}.{}", user_id.0, hex(&self.signature(&user_id.0)))
    }

    pub fn verify(&self, token: &str) -> Result<UserId, TokenError> {
        let (user_id, signature) = token.trim().rsplit_once('.').ok_or(TokenError::Malformed)?;
        if user_id.is_empty() || signature.is_empty() {
            return Err(TokenError::Malformed);
        }
        let signature = decode_hex(signature).ok_or(TokenError::Malformed)?;

        let mut mac = self.mac();
        mac.update(user_id.as_bytes());
        mac.verify_slice(&signature).map_err(|_| TokenError::BadSignature)?;

        Ok(UserId(user_id.to_string()))
    }

    /// Accepts a raw `Authorization` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<UserId, TokenError> {
        let header = header.map(str::trim).filter(|value| !value.is_empty());
        let header = header.ok_or(TokenError::Missing)?;
        let (scheme, token) = header.split_once(' ').ok_or(TokenError::WrongScheme)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(TokenError::WrongScheme);
        }
        self.verify(token)
    }

    fn signature(&self, user_id: &str) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(user_id.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail.
        match HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("hmac accepts keys of any length"),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 || !value.is_ascii() {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&value[index..index + 2], 16).ok())
        .collect()
}

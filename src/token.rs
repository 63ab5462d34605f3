//! Signed credential encoding
//!
//! The engine treats signing and verification as a trusted external
//! primitive behind the [`TokenCodec`] trait. [`JwtCodec`] is the
//! default implementation, using HS256 JWTs. Verification is
//! stateless: signature plus expiry, no mutable server state.

use crate::error::{AccessError, Result};
use crate::role::{Namespace, Role};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// The signed payload carried across the request boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Actor identifier.
    pub sub: String,
    /// The actor's role.
    pub role: Role,
    /// Credential namespace (tenant vs super-admin trust domain).
    pub ns: Namespace,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Token ID, rotated on renewal.
    pub jti: String,
}

/// Why a token failed verification. An expected, frequent outcome —
/// not an error condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Structurally valid signature, but past its expiry.
    Expired,
    /// Malformed, unsigned, or signed with the wrong key.
    Malformed,
}

/// Sign/verify seam for session credentials.
pub trait TokenCodec: Send + Sync {
    /// Sign `claims` into a portable token string.
    fn sign(&self, claims: &Claims) -> Result<String>;

    /// Verify a token and recover its claims. Rejection is a value,
    /// not an error: malformed and expired tokens are routine inputs.
    fn verify(&self, token: &str) -> std::result::Result<Claims, TokenRejection>;
}

/// HS256 JWT codec.
pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtCodec {
    /// Build a codec from a shared HS256 secret.
    pub fn hs256(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenCodec for JwtCodec {
    fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AccessError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str) -> std::result::Result<Claims, TokenRejection> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenRejection::Expired,
                _ => TokenRejection::Malformed,
            })
    }
}

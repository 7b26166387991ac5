/// Token Issuer
///
/// Mints access/refresh credential pairs and validates presented tokens.
/// Access and refresh credentials are signed JWTs with independently
/// configured secrets and lifetimes. Refresh credentials additionally carry
/// a high-entropy `jti`; the session store keys records by the SHA-256
/// fingerprint of the encoded token, never the plaintext.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Length of the `jti` claim in characters
const JTI_LENGTH: usize = 64;

/// The issuance result: one access credential and one refresh credential
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Generate a unique token identifier for a refresh credential
///
/// 64 alphanumeric characters from a CSPRNG; unguessability of the refresh
/// credential rests on this value.
fn generate_jti() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JTI_LENGTH)
        .map(char::from)
        .collect()
}

/// Compute the storage fingerprint of a token
///
/// SHA-256 hex of the encoded token. Plaintext tokens are never persisted;
/// lookups compare fingerprints by exact match.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Mint a new access/refresh credential pair for an identity
///
/// # Errors
/// Returns error only if the signing capability fails (treated as fatal)
pub fn issue_token_pair(
    user_id: Uuid,
    name: &str,
    email: &str,
    config: &JwtSettings,
) -> Result<TokenPair, AppError> {
    let access_claims = AccessClaims::new(
        user_id,
        name.to_string(),
        email.to_string(),
        config.access_token_expiry,
        config.issuer.clone(),
    );

    let refresh_claims = RefreshClaims::new(
        user_id,
        name.to_string(),
        email.to_string(),
        generate_jti(),
        config.refresh_token_expiry,
        config.issuer.clone(),
    );

    let access_token = encode(
        &Header::default(),
        &access_claims,
        &EncodingKey::from_secret(config.access_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

    let refresh_token = encode(
        &Header::default(),
        &refresh_claims,
        &EncodingKey::from_secret(config.refresh_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Validate an access token and extract its claims
///
/// # Errors
/// Returns error if the token is invalid, expired, or tampered with
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<AccessClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.access_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("Access token validation error: {}", e);
        AppError::Auth(AuthError::TokenInvalid)
    })
}

/// Decode a refresh token and extract its claims
///
/// Signature, expiry, and issuer are all checked; a token that fails here
/// carries no resolvable identity.
///
/// # Errors
/// Returns error if the token is invalid, expired, or tampered with
pub fn decode_refresh_token(token: &str, config: &JwtSettings) -> Result<RefreshClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.refresh_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("Refresh token validation error: {}", e);
        AppError::Auth(AuthError::TokenInvalid)
    })
}

/// Credential Verifier
///
/// Checks a presented email/password pair against stored user records. The
/// failure path is constant-shape: an unknown email still performs a full
/// bcrypt verification (against a dummy hash) before failing, and the
/// resulting error never distinguishes "unknown email" from "wrong
/// password".

use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::password::{verify_password, DUMMY_HASH};
use crate::error::{AppError, AuthError};

/// An authenticated principal
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Verify an email/password pair and return the owning identity
///
/// # Errors
/// - `InvalidCredentials` if the email is unknown or the password does not
///   match (one indistinguishable error for both)
/// - `AccountInactive` if the password matched but the account is disabled
pub async fn verify_credentials(
    pool: &PgPool,
    email: &str,
    candidate_password: &str,
) -> Result<Identity, AppError> {
    let user = sqlx::query_as::<_, (Uuid, String, String, String, bool)>(
        "SELECT id, email, name, password_hash, is_active FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    let (user_id, user_email, user_name, password_hash, is_active) = match user {
        Some(row) => row,
        None => {
            // Burn the same bcrypt work as the found path before failing.
            let _ = verify_password(candidate_password, &DUMMY_HASH);
            return Err(AppError::Auth(AuthError::InvalidCredentials));
        }
    };

    if !verify_password(candidate_password, &password_hash)? {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    // Only reported after the password matched, so the flag leaks nothing
    // to guessers.
    if !is_active {
        return Err(AppError::Auth(AuthError::AccountInactive));
    }

    Ok(Identity {
        id: user_id,
        email: user_email,
        name: user_name,
    })
}

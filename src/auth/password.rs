/// Password Hashing and Verification
///
/// Wraps bcrypt behind hash/verify functions and enforces the password
/// strength policy at hashing time.

use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    /// Hash verified against when the looked-up account does not exist, so
    /// the missing-account path costs the same bcrypt work as a real
    /// verification. Computed once at first use.
    pub static ref DUMMY_HASH: String =
        hash("sessiond-dummy-password-1A", DEFAULT_COST).expect("bcrypt self-hash cannot fail");
}

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if the password fails the strength policy or hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a candidate password against a stored hash
///
/// Argument order matters and is fixed here once: candidate first, stored
/// hash second, per bcrypt's contract. Callers never invoke bcrypt directly.
///
/// # Errors
/// Returns error if the stored hash is malformed
pub fn verify_password(candidate: &str, stored_hash: &str) -> Result<bool, AppError> {
    verify(candidate, stored_hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Password strength requirements:
/// - 8 to 128 characters
/// - at least one digit, one lowercase letter, and one uppercase letter
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // Upper bound is both a bcrypt limitation and DoS prevention
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

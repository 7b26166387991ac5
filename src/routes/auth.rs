/// Authentication Routes
///
/// The thin composition layer: maps registration, login, token refresh,
/// logout, and current-user lookup onto the credential verifier, the
/// rotation engine, and the user table. No rotation or verification logic
/// lives here.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{hash_password, verify_credentials, AccessClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, ErrorContext};
use crate::session::RotationEngine;
use crate::validators::{is_valid_email, is_valid_name};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh / logout request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: String,
}

/// POST /auth/register
///
/// Register a new user with email, password, and name. Opens a first
/// session and returns its token pair.
///
/// # Errors
/// - 400: Validation errors (invalid email/password/name)
/// - 409: Email already registered (duplicate)
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    engine: web::Data<RotationEngine>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let email = is_valid_email(&form.email)?;
    let name = is_valid_name(&form.name)?;
    let password_hash = hash_password(&form.password)?;

    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&name)
    .bind(&password_hash)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    let pair = engine.open_session(user_id, &name, &email).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /auth/login
///
/// Authenticate with email and password; opens a new session (one record
/// per login, so concurrent devices each hold their own).
///
/// # Errors
/// - 400: Validation error (invalid email format)
/// - 401: Invalid credentials (unknown email or wrong password, one error)
/// - 403: Account is inactive
/// - 500: Internal server error
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    engine: web::Data<RotationEngine>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = is_valid_email(&form.email)?;

    let identity = verify_credentials(pool.get_ref(), &email, &form.password).await?;

    let pair = engine
        .open_session(identity.id, &identity.name, &identity.email)
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %identity.id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a new pair. One-shot: a token that was
/// already exchanged never works twice, and replaying a consumed token
/// revokes every session of the account (theft response). The response for
/// a replayed token is indistinguishable from any other bad credential.
///
/// # Errors
/// - 401: Invalid, expired, consumed, or revoked refresh token
/// - 500: Internal server error
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    engine: web::Data<RotationEngine>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let pair = engine.rotate(&form.refresh_token).await?;

    tracing::info!(
        request_id = %context.request_id,
        "Token refreshed successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /auth/logout
///
/// Close the session identified by the refresh token. Idempotent: logging
/// out a token that is already gone (rotated, revoked, or never issued)
/// still returns 200.
pub async fn logout(
    form: web::Json<RefreshRequest>,
    engine: web::Data<RotationEngine>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout");

    engine.logout(&form.refresh_token).await?;

    tracing::info!(request_id = %context.request_id, "Logout processed");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out"
    })))
}

/// POST /auth/logout-all
///
/// Close every session of the authenticated user.
/// **Requires valid access token** in Authorization header.
pub async fn logout_all(
    claims: web::ReqData<AccessClaims>,
    engine: web::Data<RotationEngine>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout_all");

    let user_id = claims.user_id()?;
    let revoked = engine.logout_all(user_id).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        revoked_sessions = revoked,
        "All sessions closed"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "revoked_sessions": revoked
    })))
}

/// GET /auth/me
///
/// Get the authenticated user's information.
/// **Requires valid access token** in Authorization header.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 404: User not found (deleted since the token was minted)
pub async fn get_current_user(
    claims: web::ReqData<AccessClaims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, (Uuid, String, String, chrono::DateTime<Utc>)>(
        "SELECT id, email, name, created_at FROM users WHERE id = $1 AND is_active = true",
    )
    .bind(user_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.0.to_string(),
        email: user.1,
        name: user.2,
        created_at: user.3.to_rfc3339(),
    }))
}

/// Rotation Engine
///
/// The security state machine behind the refresh endpoint. Each refresh
/// credential is conceptually Live, Rotated, or Revoked; only Live is
/// materialized as a store record, so an absent fingerprint forces a policy
/// decision:
///
/// - absent + identity unresolvable (bad signature, expired, garbage):
///   plain `InvalidCredentials`, nothing to revoke;
/// - absent + identity resolvable from the signed credential: the token
///   was rotated or revoked and is being replayed. Treated as theft: every
///   session of that identity is revoked before failing. The blast radius
///   is deliberate; forcing a full re-login on every device is the price of
///   detecting compromise at first replay.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{decode_refresh_token, issue_token_pair, token_fingerprint, TokenPair};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::session::store::{SessionStore, SessionStoreError};

pub struct RotationEngine {
    store: Arc<dyn SessionStore>,
    jwt: JwtSettings,
}

fn store_error(err: SessionStoreError) -> AppError {
    match err {
        // Fingerprint collisions cannot happen under correct jti
        // generation; if one does, fail loudly rather than corrupt state.
        SessionStoreError::Conflict => {
            AppError::Internal("refresh token fingerprint collision".to_string())
        }
        SessionStoreError::NotFound => {
            AppError::Database(DatabaseError::NotFound("session record".to_string()))
        }
        SessionStoreError::Unavailable(msg) => {
            AppError::Database(DatabaseError::ConnectionPool(msg))
        }
    }
}

impl RotationEngine {
    pub fn new(store: Arc<dyn SessionStore>, jwt: JwtSettings) -> Self {
        Self { store, jwt }
    }

    /// Mint a token pair and record its refresh credential as a new live
    /// session (login/register path). Every call creates exactly one
    /// independently revocable record.
    pub async fn open_session(
        &self,
        user_id: Uuid,
        name: &str,
        email: &str,
    ) -> Result<TokenPair, AppError> {
        let pair = issue_token_pair(user_id, name, email, &self.jwt)?;

        let fingerprint = token_fingerprint(&pair.refresh_token);
        let expires_at = Utc::now() + Duration::seconds(self.jwt.refresh_token_expiry);

        self.store
            .create(user_id, &fingerprint, expires_at)
            .await
            .map_err(store_error)?;

        Ok(pair)
    }

    /// Exchange a live refresh credential for a successor pair.
    ///
    /// The presented credential is consumed: of two concurrent calls with
    /// the same token, exactly one receives a successor; the other lands in
    /// the reuse branch. One-shot rotation is the store's atomic-replace
    /// guarantee, not a best-effort check.
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, AppError> {
        let claims = match decode_refresh_token(presented, &self.jwt) {
            Ok(claims) => claims,
            // No resolvable identity, indistinguishable from garbage.
            Err(_) => return Err(AppError::Auth(AuthError::InvalidCredentials)),
        };
        let user_id = claims
            .user_id()
            .map_err(|_| AppError::Auth(AuthError::InvalidCredentials))?;

        let fingerprint = token_fingerprint(presented);

        let record = match self.store.find(&fingerprint).await.map_err(store_error)? {
            Some(record) => record,
            None => return self.respond_to_reuse(user_id).await,
        };

        if record.user_id != user_id {
            // A live record keyed by this fingerprint that belongs to a
            // different identity should be impossible; treat the claimed
            // identity as compromised.
            return self.respond_to_reuse(user_id).await;
        }

        if record.expires_at < Utc::now() {
            // Lazy expiry. An expired session is a liveness event, not a
            // theft signal: drop the stale row, no mass revocation.
            self.store
                .revoke_one(&fingerprint)
                .await
                .map_err(store_error)?;
            return Err(AppError::Auth(AuthError::InvalidCredentials));
        }

        let pair = issue_token_pair(user_id, &claims.name, &claims.email, &self.jwt)?;
        let new_fingerprint = token_fingerprint(&pair.refresh_token);
        let expires_at = Utc::now() + Duration::seconds(self.jwt.refresh_token_expiry);

        match self
            .store
            .replace(&fingerprint, &new_fingerprint, expires_at)
            .await
        {
            Ok(_) => Ok(pair),
            // Lost the race: someone consumed the record between our lookup
            // and the swap. Same policy as finding it already gone.
            Err(SessionStoreError::NotFound) => self.respond_to_reuse(user_id).await,
            Err(e) => Err(store_error(e)),
        }
    }

    /// Close the single session identified by the presented credential.
    ///
    /// Keyed by token value only. Idempotent: logging out an absent
    /// (already rotated or revoked) token is a no-op, not an error, and
    /// deliberately does not trigger mass revocation.
    pub async fn logout(&self, presented: &str) -> Result<(), AppError> {
        let fingerprint = token_fingerprint(presented);

        let removed = self
            .store
            .revoke_one(&fingerprint)
            .await
            .map_err(store_error)?;

        if !removed {
            tracing::debug!("Logout of a refresh token that was no longer live");
        }

        Ok(())
    }

    /// Close every session of the identity. Returns the number revoked.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.store.revoke_all(user_id).await.map_err(store_error)?;

        tracing::info!(user_id = %user_id, count = revoked, "All sessions revoked for user");

        Ok(revoked)
    }

    /// The reuse response: revoke everything the identity holds, then fail
    /// with the internal reuse signal (externally identical to bad
    /// credentials).
    async fn respond_to_reuse(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let revoked = self.store.revoke_all(user_id).await.map_err(store_error)?;

        tracing::warn!(
            user_id = %user_id,
            revoked_sessions = revoked,
            "Stale refresh token replayed, all sessions revoked"
        );

        Err(AppError::Auth(AuthError::ReuseDetected))
    }
}

//! Authentication extractor.
//!
//! `AuthUser` validates the `Bearer` JWT (HS256, shared secret), resolves
//! the account, and rejects deactivated accounts before any handler runs.
//! Token issuance lives in the auth service; this side only validates.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use tally_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated user extracted from a JWT token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,

    /// Account email, from the account record.
    pub email: String,
}

/// JWT claims carried by end-user tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration time (Unix seconds).
    pub exp: i64,
    /// Issued at (Unix seconds).
    pub iat: i64,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            // Extract the Authorization header
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            // Extract the Bearer token
            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            let key = DecodingKey::from_secret(state.config.jwt_secret.as_bytes());
            let data = jsonwebtoken::decode::<JwtClaims>(token, &key, &Validation::default())
                .map_err(|_| ApiError::Unauthorized)?;

            let user_id = data
                .claims
                .sub
                .parse::<UserId>()
                .map_err(|_| ApiError::Unauthorized)?;

            // Deactivated accounts may not act, even with a valid token.
            let account = state
                .store
                .get_account(&user_id)?
                .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

            if !account.is_active {
                return Err(ApiError::Forbidden("Account is deactivated".into()));
            }

            Ok(AuthUser {
                user_id,
                email: account.email,
            })
        })
    }
}

/// An authenticated user that may not have an account yet.
///
/// Used only by account registration, which has to accept a valid token
/// for a user the store hasn't seen.
#[derive(Debug, Clone)]
pub struct AuthSubject {
    /// The user ID from the token.
    pub user_id: UserId,
}

impl FromRequestParts<Arc<AppState>> for AuthSubject {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            let key = DecodingKey::from_secret(state.config.jwt_secret.as_bytes());
            let data = jsonwebtoken::decode::<JwtClaims>(token, &key, &Validation::default())
                .map_err(|_| ApiError::Unauthorized)?;

            let user_id = data
                .claims
                .sub
                .parse::<UserId>()
                .map_err(|_| ApiError::Unauthorized)?;

            Ok(AuthSubject { user_id })
        })
    }
}

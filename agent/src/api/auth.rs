//! Authentication and authorization extractors

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::AppState;

use super::ApiError;

/// User id reported for requests made with the static admin token
const ADMIN_USER: &str = "admin";

/// JWT claims for user authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Is admin user
    #[serde(default)]
    pub admin: bool,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub user_id: String,
    pub is_admin: bool,
}

/// Admin-only authentication
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub user_id: String,
}

/// `?token=` fallback for browser WebSocket clients, which cannot set headers
#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string());

        let token = match header {
            Some(token) => token,
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(query)| query.token)
                .filter(|token| !token.is_empty())
                .ok_or(ApiError::Unauthorized)?,
        };

        authenticate(&token, state)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_auth = UserAuth::from_request_parts(parts, state).await?;

        if !user_auth.is_admin {
            return Err(ApiError::Forbidden);
        }

        Ok(AdminAuth {
            user_id: user_auth.user_id,
        })
    }
}

/// Accept the static admin token or a valid JWT
fn authenticate(token: &str, state: &AppState) -> Result<UserAuth, ApiError> {
    if let Some(ref admin_token) = state.config.security.admin_token {
        if !admin_token.is_empty() && token == admin_token {
            return Ok(UserAuth {
                user_id: ADMIN_USER.to_string(),
                is_admin: true,
            });
        }
    }

    let claims = decode_jwt(token, &state.config.security.jwt_secret)?;
    Ok(UserAuth {
        user_id: claims.sub,
        is_admin: claims.admin,
    })
}

/// Decode and validate a JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            ApiError::Unauthorized
        })
}

/// Create a JWT token for a user
pub fn create_jwt(
    user_id: &str,
    is_admin: bool,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + expiration_secs,
        iat: now,
        admin: is_admin,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key)
}

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::{
    find_user_by_id, find_user_by_username, insert_user, RegisterRequest, TokenObtainRequest,
    TokenPairResponse, TokenRefreshRequest, TokenRefreshResponse, User, UserResponse,
};
use crate::{AppState, DbPool};

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_username};
use super::ApiJson;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Validate password strength
/// Returns None if valid, or Some(error_message) if invalid
pub fn validate_password_strength(password: &str, username: &str) -> Option<String> {
    if password.chars().count() < 8 {
        return Some("This password is too short. It must contain at least 8 characters.".to_string());
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        return Some("This password is entirely numeric.".to_string());
    }

    if !username.is_empty() && password.to_lowercase().contains(&username.to_lowercase()) {
        return Some("The password is too similar to the username.".to_string());
    }

    let common_passwords = [
        "password", "password1", "12345678", "qwertyui", "iloveyou", "letmein1", "welcome1",
    ];
    if common_passwords.contains(&password.to_lowercase().as_str()) {
        return Some("This password is too common.".to_string());
    }

    None
}

// -------------------------------------------------------------------------
// JWT issuing and verification
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    pub token_type: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token is invalid or expired")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("Token has wrong type")]
    WrongType,
    #[error("Token contained no recognizable user identification")]
    BadSubject,
}

/// Signing keys and lifetimes for access/refresh tokens
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_lifetime: chrono::Duration,
    refresh_lifetime: chrono::Duration,
}

impl JwtKeys {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            access_lifetime: chrono::Duration::seconds(config.access_token_lifetime),
            refresh_lifetime: chrono::Duration::seconds(config.refresh_token_lifetime),
        }
    }

    /// Sign a token of the given type for `user`
    pub fn issue(&self, user: &User, token_type: TokenType) -> Result<String, TokenError> {
        let lifetime = match token_type {
            TokenType::Access => self.access_lifetime,
            TokenType::Refresh => self.refresh_lifetime,
        };
        let now = chrono::Utc::now();

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            token_type,
            jti: uuid::Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify signature and expiry, and require the given token type
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        if data.claims.token_type != expected {
            return Err(TokenError::WrongType);
        }
        Ok(data.claims)
    }

    /// User id carried by a valid access token
    pub fn access_user_id(&self, token: &str) -> Result<i64, TokenError> {
        self.verify(token, TokenType::Access)?
            .sub
            .parse()
            .map_err(|_| TokenError::BadSubject)
    }
}

/// Extract a bearer token from request headers.
///
/// `Ok(None)` means no credentials were sent; a malformed header is an error.
pub fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header."))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(Some(token.trim()))
        }
        _ => Err(ApiError::unauthorized(
            "Authorization header must contain two space-delimited values",
        )),
    }
}

/// Resolve the active user behind an access token
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let user_id = state.jwt.access_user_id(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        ApiError::unauthorized("Given token not valid for any token type")
    })?;

    let user = find_user_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized("User is inactive"));
    }

    Ok(user)
}

/// Extractor for getting the current authenticated user from a request
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)?.ok_or_else(ApiError::not_authenticated)?;
        authenticate(state, token).await
    }
}

/// The caller if credentials were sent, `None` for anonymous requests.
/// Invalid credentials are still rejected.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match extract_bearer(&parts.headers)? {
            Some(token) => Ok(MaybeUser(Some(authenticate(state, token).await?))),
            None => Ok(MaybeUser(None)),
        }
    }
}

/// An authenticated staff member; 401 for anonymous callers, 403 otherwise
pub struct StaffUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for StaffUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = User::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(ApiError::forbidden(
                "You do not have permission to perform this action.",
            ));
        }
        Ok(StaffUser(user))
    }
}

// -------------------------------------------------------------------------
// Endpoints
// -------------------------------------------------------------------------

/// Exchange credentials for an access/refresh pair
pub async fn obtain_token_pair(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TokenObtainRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let invalid = || ApiError::unauthorized("No active account found with the given credentials");

    let user = find_user_by_username(&state.db, &request.username)
        .await?
        .ok_or_else(invalid)?;

    if !user.is_active || !verify_password(&request.password, &user.password_hash) {
        return Err(invalid());
    }

    let access = state.jwt.issue(&user, TokenType::Access).map_err(token_issue_error)?;
    let refresh = state.jwt.issue(&user, TokenType::Refresh).map_err(token_issue_error)?;

    tracing::info!(user_id = user.id, username = %user.username, "Issued token pair");

    Ok(Json(TokenPairResponse {
        refresh,
        access,
        username: user.username,
    }))
}

/// Exchange a refresh token for a new access token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TokenRefreshRequest>,
) -> Result<Json<TokenRefreshResponse>, ApiError> {
    let claims = state
        .jwt
        .verify(&request.refresh, TokenType::Refresh)
        .map_err(|_| ApiError::unauthorized("Token is invalid or expired"))?;

    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| ApiError::unauthorized("Token is invalid or expired"))?;

    let user = find_user_by_id(&state.db, user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let access = state.jwt.issue(&user, TokenType::Access).map_err(token_issue_error)?;
    Ok(Json(TokenRefreshResponse { access }))
}

fn token_issue_error(err: TokenError) -> ApiError {
    tracing::error!(error = %err, "Failed to sign token");
    ApiError::internal("Failed to issue token")
}

/// Self-service registration
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("username", validate_username(&request.username));
    errors.check("email", validate_email(&request.email));
    if let Some(error) = validate_password_strength(&request.password, &request.username) {
        errors.add("password", error);
    }
    errors.finish()?;

    if find_user_by_username(&state.db, &request.username).await?.is_some() {
        return Err(ApiError::validation_field(
            "username",
            "A user with that username already exists.",
        ));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = insert_user(&state.db, &request.username, &request.email, &password_hash, false).await?;

    tracing::info!(user_id = user.id, username = %user.username, "Registered user");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// The authenticated caller
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Create the configured bootstrap staff account if it does not exist yet
pub async fn ensure_admin_user(db: &DbPool, config: &AuthConfig) -> anyhow::Result<()> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    if find_user_by_username(db, username).await?.is_some() {
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    insert_user(db, username, "", &password_hash, true).await?;

    tracing::info!("Created admin user: {}", username);
    Ok(())
}

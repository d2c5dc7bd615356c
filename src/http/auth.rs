//! Bearer-token auth: a single operator credential (argon2-hashed password,
//! checked via an env-configured hash) exchanged for a signed JWT, which
//! then guards the mutating endpoints. Mirrors the original's
//! `AuthService`/`/auth/token` pair, minus the multi-user store — this
//! crate has exactly one operator account.

use crate::config::EnvConfig;
use crate::error::AppError;
use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Checks the submitted credentials against the single configured operator
/// account and, on success, signs a JWT valid for `jwt_expire_minutes`.
pub fn issue_token(config: &EnvConfig, username: &str, password: &str) -> Result<String, AppError> {
    if username != config.operator_username {
        return Err(AppError::Auth("unknown username".into()));
    }
    let hash = PasswordHash::new(&config.operator_password_hash)
        .map_err(|_| AppError::Auth("operator password hash not configured".into()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .map_err(|_| AppError::Auth("incorrect password".into()))?;

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let claims = Claims { sub: username.to_string(), exp: now + config.jwt_expire_minutes * 60 };
    let header = Header::new(parse_algorithm(&config.jwt_algorithm));
    encode(&header, &claims, &EncodingKey::from_secret(config.jwt_secret_key.as_bytes()))
        .map_err(|e| AppError::Auth(format!("failed to sign token: {e}")))
}

fn parse_algorithm(name: &str) -> jsonwebtoken::Algorithm {
    name.parse().unwrap_or(jsonwebtoken::Algorithm::HS256)
}

fn verify_token(config: &EnvConfig, token: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(parse_algorithm(&config.jwt_algorithm));
    decode::<Claims>(token, &DecodingKey::from_secret(config.jwt_secret_key.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| AppError::Auth(format!("invalid token: {e}")))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Auth("missing or malformed Authorization header".into()))
}

pub async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> Response {
    match issue_token(&state.config, &req.username, &req.password) {
        Ok(token) => Json(LoginResponse { access_token: token, token_type: "bearer" }).into_response(),
        Err(err) => (StatusCode::UNAUTHORIZED, Json(err)).into_response(),
    }
}

pub async fn require_bearer_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let result = bearer_token(&headers).and_then(|token| verify_token(&state.config, token));
    match result {
        Ok(_claims) => next.run(request).await,
        Err(err) => (StatusCode::UNAUTHORIZED, Json(err)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};

    fn config_with_password(password: &str) -> EnvConfig {
        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
        let hash = Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string();
        EnvConfig {
            database_uri: String::new(),
            database_name: String::new(),
            capture_interface: String::new(),
            min_queue_size: 1,
            max_queue_size: 1,
            max_workers: 1,
            start_batch_size: 1,
            growth_factor: 1.5,
            shrink_factor: 0.5,
            backend_host: "0.0.0.0".into(),
            backend_port: 0,
            jwt_secret_key: "test-secret".into(),
            jwt_algorithm: "HS256".into(),
            jwt_expire_minutes: 60,
            operator_username: "admin".into(),
            operator_password_hash: hash,
            backend_cors_origins: vec!["*".into()],
            maxmind_license_key: None,
            geoip_db_abs_path: String::new(),
            log_level: "info".into(),
        }
    }

    #[test]
    fn test_issue_token_succeeds_with_correct_credentials() {
        let config = config_with_password("correct-horse");
        assert!(issue_token(&config, "admin", "correct-horse").is_ok());
    }

    #[test]
    fn test_issue_token_rejects_wrong_password() {
        let config = config_with_password("correct-horse");
        assert!(issue_token(&config, "admin", "wrong").is_err());
    }

    #[test]
    fn test_issue_token_rejects_unknown_username() {
        let config = config_with_password("correct-horse");
        assert!(issue_token(&config, "someone-else", "correct-horse").is_err());
    }

    #[test]
    fn test_verify_token_round_trips_issued_token() {
        let config = config_with_password("correct-horse");
        let token = issue_token(&config, "admin", "correct-horse").unwrap();
        let claims = verify_token(&config, &token).unwrap();
        assert_eq!(claims.sub, "admin");
    }

    #[test]
    fn test_verify_token_rejects_garbage() {
        let config = config_with_password("correct-horse");
        assert!(verify_token(&config, "not-a-jwt").is_err());
    }

    #[test]
    fn test_bearer_token_requires_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_err());
    }
}

//! Identity: password hashing, bearer tokens, auth endpoints, and the
//! middleware that resolves the acting user for every protected route.
//!
//! Tokens are stateless JWTs. Logout doesn't revoke anything — tokens
//! simply expire — and the middleware re-reads the user from the store on
//! each request, so a deleted account locks out immediately.

use crate::api::{internal_error, reject, validation_failed};
use crate::config::Config;
use crate::store::TaskStore;
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

// ── Users and auth payloads ────────────────────────────────────

/// An account. The password hash is an argon2 PHC string; it stays in the
/// store and never goes out in a response (see UserResponse).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// ── JWT ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // user id
    pub username: String,
    pub exp: usize,       // expiry timestamp
    pub iat: usize,       // issued at
}

// ── Shared state ───────────────────────────────────────────────

pub struct AppState {
    pub store: TaskStore,
    pub config: Config,
}

pub type SharedState = Arc<AppState>;

// ── Helpers ────────────────────────────────────────────────────

pub fn create_token(
    user: &User,
    secret: &[u8],
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiry = now + Duration::hours(ttl_hours);

    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        exp: expiry.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

// ── Handlers ───────────────────────────────────────────────────

pub async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let mut errors = serde_json::Map::new();

    let username = payload.username.unwrap_or_default();
    if username.is_empty() {
        errors.insert("username".into(), json!(["The username field is required."]));
    } else if username.chars().count() > 255 {
        errors.insert(
            "username".into(),
            json!(["The username may not be greater than 255 characters."]),
        );
    }

    let password = payload.password.unwrap_or_default();
    if password.is_empty() {
        errors.insert("password".into(), json!(["The password field is required."]));
    } else if password.chars().count() < 4 {
        errors.insert(
            "password".into(),
            json!(["The password must be at least 4 characters."]),
        );
    }

    if !errors.is_empty() {
        return Err(validation_failed(Value::Object(errors)));
    }

    let password_hash = hash_password(&password).map_err(internal_error)?;
    let user = User {
        id: Uuid::new_v4(),
        username,
        password_hash,
        created_at: Utc::now(),
    };

    let created = state.store.create_user(&user).map_err(internal_error)?;
    if !created {
        return Err(validation_failed(json!({
            "username": ["The username has already been taken."],
        })));
    }

    let token = create_token(
        &user,
        state.config.token_secret.as_bytes(),
        state.config.token_ttl_hours,
    )
    .map_err(internal_error)?;

    tracing::info!(username = %user.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful",
            "username": user.username,
            "token": token,
        })),
    ))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut errors = serde_json::Map::new();

    let username = payload.username.unwrap_or_default();
    if username.is_empty() {
        errors.insert("username".into(), json!(["The username field is required."]));
    }
    let password = payload.password.unwrap_or_default();
    if password.is_empty() {
        errors.insert("password".into(), json!(["The password field is required."]));
    }
    if !errors.is_empty() {
        return Err(validation_failed(Value::Object(errors)));
    }

    let user = state
        .store
        .get_user_by_username(&username)
        .map_err(internal_error)?
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Invalid credentials"))?;

    if !verify_password(&password, &user.password_hash) {
        return Err(reject(StatusCode::UNAUTHORIZED, "Invalid credentials"));
    }

    let token = create_token(
        &user,
        state.config.token_secret.as_bytes(),
        state.config.token_ttl_hours,
    )
    .map_err(internal_error)?;

    tracing::info!(username = %user.username, "user logged in");

    Ok(Json(json!({
        "message": "Login successful",
        "username": user.username,
        "token": token,
    })))
}

pub async fn logout() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn current_user(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse {
        id: user.id,
        username: user.username,
        created_at: user.created_at,
    })
}

// ── Middleware ─────────────────────────────────────────────────

pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        _ => return Err(reject(StatusCode::UNAUTHORIZED, "Missing or invalid token")),
    };

    let claims = verify_token(token, state.config.token_secret.as_bytes())
        .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid token"))?;

    let user = state
        .store
        .get_user(claims.sub)
        .map_err(internal_error)?
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "User not found"))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// ── Tests ──────────────────────────────────────────────────────

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use lazy_static::lazy_static;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use regex::Regex;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info};

use crate::db::{Database, User};
use crate::routes::{ApiError, AppState};

pub const SESSION_COOKIE: &str = "session_id";

const HASH_SCHEME: &str = "pbkdf2-sha256";
const HASH_ITERATIONS: u32 = 10_000;
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 128;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+$").unwrap();

    /// Checked against when the email is unknown, so a miss costs as much as a wrong password.
    static ref DUMMY_DIGEST: String = hash_password("not-a-real-password");
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Emails are matched case-insensitively and without surrounding whitespace.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Field-level problems with a sign-up request, in display order.
pub fn validate_registration(registration: &Registration) -> Vec<String> {
    let mut errors = Vec::new();
    let email = normalize_email(&registration.email);

    if email.is_empty() {
        errors.push("Email can't be blank".to_string());
    } else if !is_valid_email(&email) {
        errors.push("Email is invalid".to_string());
    }

    let password_len = registration.password.chars().count();
    if password_len == 0 {
        errors.push("Password can't be blank".to_string());
    } else if password_len < PASSWORD_MIN {
        errors.push(format!(
            "Password is too short (minimum is {} characters)",
            PASSWORD_MIN
        ));
    } else if password_len > PASSWORD_MAX {
        errors.push(format!(
            "Password is too long (maximum is {} characters)",
            PASSWORD_MAX
        ));
    }

    if let Some(confirmation) = &registration.password_confirmation {
        if confirmation != &registration.password {
            errors.push("Password confirmation doesn't match Password".to_string());
        }
    }

    errors
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; DIGEST_LEN] {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut digest);
    digest
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Digest format: `pbkdf2-sha256$<iterations>$<salt hex>$<digest hex>`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = derive(password.as_bytes(), &salt, HASH_ITERATIONS);

    format!(
        "{}${}${}${}",
        HASH_SCHEME,
        HASH_ITERATIONS,
        to_hex(&salt),
        to_hex(&digest)
    )
}

/// Malformed stored digests never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    if scheme != HASH_SCHEME {
        return false;
    }
    let (Ok(iterations), Some(salt), Some(expected)) =
        (iterations.parse::<u32>(), from_hex(salt), from_hex(expected))
    else {
        return false;
    };
    if iterations == 0 {
        return false;
    }

    constant_time_eq(&derive(password.as_bytes(), &salt, iterations), &expected)
}

/// Creates the account described by `registration`.
pub async fn register(db: &Database, registration: &Registration) -> Result<User, ApiError> {
    let mut errors = validate_registration(registration);
    let email = normalize_email(&registration.email);

    if errors.is_empty() && db.find_user_by_email(&email).await?.is_some() {
        errors.push("Email has already been taken".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::unprocessable("User couldn't be created.", errors));
    }

    let password = registration.password.clone();
    let digest = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(anyhow::Error::from)?;

    match db.create_user(&email, &digest).await? {
        Some(user) => Ok(user),
        // Lost a race with a concurrent sign-up for the same address
        None => Err(ApiError::unprocessable(
            "User couldn't be created.",
            vec!["Email has already been taken".to_string()],
        )),
    }
}

/// The user owning these credentials, if they are valid.
pub async fn authenticate(db: &Database, credentials: &Credentials) -> anyhow::Result<Option<User>> {
    let email = normalize_email(&credentials.email);
    let password_len = credentials.password.chars().count();
    // No account can hold a password outside these bounds, so skip the hashing.
    if email.is_empty() || password_len == 0 || password_len > PASSWORD_MAX {
        return Ok(None);
    }

    let user = db.find_user_by_email(&email).await?;
    let digest = match &user {
        Some(user) => user.password_digest.clone(),
        None => DUMMY_DIGEST.clone(),
    };
    let password = credentials.password.clone();
    let verified =
        tokio::task::spawn_blocking(move || verify_password(&password, &digest)).await?;

    Ok(user.filter(|_| verified))
}

/// Reads the session token from the request's `Cookie` headers.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str, ttl: chrono::Duration) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds().max(0)
    )
}

pub fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    )
}

/// The signed-in user. Rejects with 401 when there is no live session.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(ApiError::Unauthenticated)?;
        let user = state
            .db
            .find_session_user(&token)
            .await?
            .ok_or(ApiError::Unauthenticated)?;
        Ok(CurrentUser(user))
    }
}

/// Periodically deletes sessions whose expiry has passed.
pub async fn start_session_purge(db: Arc<Database>, interval_minutes: u64) {
    let interval = std::time::Duration::from_secs(interval_minutes * 60);

    loop {
        match db.purge_expired_sessions().await {
            Ok(0) => {}
            Ok(purged) => info!("Purged {} expired sessions", purged),
            Err(e) => error!("Session purge failed: {}", e),
        }
        tokio::time::sleep(interval).await;
    }
}

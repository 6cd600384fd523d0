use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::article::Article;
use crate::auth::{self, Credentials, CurrentUser, Registration};
use crate::db::{Database, Keyword};
use crate::news::{NewsService, DEFAULT_LIMIT};

pub struct AppState {
    pub db: Arc<Database>,
    pub news: Arc<NewsService>,
    pub session_ttl: chrono::Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("You need to sign in or sign up before continuing.")]
    Unauthenticated,

    #[error("Invalid Email or password.")]
    InvalidCredentials,

    #[error("Couldn't find an active session.")]
    NoActiveSession,

    #[error("You are not authorized to access this page.")]
    Forbidden,

    #[error("Record not found.")]
    NotFound,

    #[error("{message}")]
    Unprocessable { message: String, errors: Vec<String> },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// A 422 whose message ends with the individual errors as a sentence.
    pub fn unprocessable(prefix: &str, errors: Vec<String>) -> Self {
        ApiError::Unprocessable {
            message: format!("{} {}", prefix, to_sentence(&errors)),
            errors,
        }
    }
}

/// `["a"]` → `a`, `["a", "b"]` → `a and b`, `["a", "b", "c"]` → `a, b, and c`.
fn to_sentence(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

fn status_body(code: StatusCode, message: &str) -> Value {
    json!({ "status": { "code": code.as_u16(), "message": message } })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (code, body) = match self {
            ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, json!({ "error": message }))
            }
            ApiError::InvalidCredentials => {
                let mut body = status_body(StatusCode::UNAUTHORIZED, &message);
                body["error"] = json!(message);
                (StatusCode::UNAUTHORIZED, body)
            }
            ApiError::NoActiveSession => (
                StatusCode::UNAUTHORIZED,
                status_body(StatusCode::UNAUTHORIZED, &message),
            ),
            ApiError::Forbidden => {
                let mut body = status_body(StatusCode::FORBIDDEN, "Access denied.");
                body["error"] = json!(message);
                (StatusCode::FORBIDDEN, body)
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                status_body(StatusCode::NOT_FOUND, &message),
            ),
            ApiError::Unprocessable { errors, .. } => {
                let mut body = status_body(StatusCode::UNPROCESSABLE_ENTITY, &message);
                body["errors"] = json!(errors);
                (StatusCode::UNPROCESSABLE_ENTITY, body)
            }
            ApiError::Internal(err) => {
                error!("Request failed: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    status_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error."),
                )
            }
        };

        (code, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/up", get(health))
        .route("/users", post(sign_up))
        .route("/users/sign_in", post(sign_in))
        .route("/users/sign_out", delete(sign_out))
        .route("/keywords", get(list_keywords).post(create_keyword))
        .route("/keywords/:id", delete(destroy_keyword))
        .route("/articles", get(articles))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Credentialed CORS for the browser client. `None` when no origins are configured.
pub fn cors_layer(allowed_origins: &[String]) -> anyhow::Result<Option<CorsLayer>> {
    if allowed_origins.is_empty() {
        return Ok(None);
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .allow_credentials(true),
    ))
}

fn signed_in_response(message: &str, email: &str, cookie: String) -> Response {
    let mut body = status_body(StatusCode::OK, message);
    body["data"] = json!({ "email": email });
    (StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(body)).into_response()
}

// Route handlers
pub async fn welcome() -> Json<Value> {
    Json(json!({ "message": "welcome to news app" }))
}

pub async fn health() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub user: Registration,
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignUpRequest>,
) -> Result<Response, ApiError> {
    let user = auth::register(&state.db, &request.user).await?;
    let token = state.db.create_session(user.id, state.session_ttl).await?;
    info!("Registered user {}", user.id);

    Ok(signed_in_response(
        "Signed up successfully.",
        &user.email,
        auth::session_cookie(&token, state.session_ttl),
    ))
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub user: Credentials,
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignInRequest>,
) -> Result<Response, ApiError> {
    let user = auth::authenticate(&state.db, &request.user)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;
    let token = state.db.create_session(user.id, state.session_ttl).await?;
    info!("User {} signed in", user.id);

    Ok(signed_in_response(
        "Logged in successfully.",
        &user.email,
        auth::session_cookie(&token, state.session_ttl),
    ))
}

pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = auth::session_token(&headers).ok_or(ApiError::NoActiveSession)?;
    if !state.db.delete_session(&token).await? {
        return Err(ApiError::NoActiveSession);
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, auth::clear_session_cookie())],
        Json(status_body(StatusCode::OK, "Logged out successfully.")),
    )
        .into_response())
}

pub async fn list_keywords(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Keyword>>, ApiError> {
    let keywords = state.db.list_keywords(user.id).await?;
    Ok(Json(keywords))
}

#[derive(Deserialize)]
pub struct KeywordParams {
    #[serde(default)]
    pub keyword: String,
}

#[derive(Deserialize)]
pub struct CreateKeywordRequest {
    pub keyword: KeywordParams,
}

pub async fn create_keyword(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateKeywordRequest>,
) -> Result<(StatusCode, Json<Keyword>), ApiError> {
    let text = request.keyword.keyword;
    let errors = Keyword::validate_text(&text);
    if !errors.is_empty() {
        return Err(ApiError::unprocessable("Keyword couldn't be created.", errors));
    }

    let keyword = state
        .db
        .create_keyword(user.id, &text)
        .await?
        .ok_or_else(|| {
            ApiError::unprocessable(
                "Keyword couldn't be created.",
                vec!["Keyword already exists for this user".to_string()],
            )
        })?;

    Ok((StatusCode::CREATED, Json(keyword)))
}

pub async fn destroy_keyword(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(keyword_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let keyword = state
        .db
        .get_keyword(keyword_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if keyword.user_id != user.id {
        warn!(
            "User {} tried to delete keyword {} owned by user {}",
            user.id, keyword.id, keyword.user_id
        );
        return Err(ApiError::Forbidden);
    }

    state.db.delete_keyword(keyword.id).await?;
    Ok(Json(status_body(StatusCode::OK, "Keyword deleted successfully.")))
}

#[derive(Deserialize)]
pub struct ArticlesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

pub async fn articles(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ArticlesQuery>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let keywords = state.db.keyword_texts_for_user(user.id).await?;
    let articles = state.news.fetch_articles(&keywords, query.limit).await;
    Ok(Json(articles))
}

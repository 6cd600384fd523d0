use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::article::ProviderPayload;
use crate::config::NewsApiConfig;

const EVERYTHING_PATH: &str = "/v2/everything";

#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {code}: {message}")]
    Provider {
        status: u16,
        code: String,
        message: String,
    },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Query parameters for the provider's "everything" search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EverythingRequest {
    pub q: String,
    #[serde(rename = "sortBy")]
    pub sort_by: &'static str,
    pub language: &'static str,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
}

impl EverythingRequest {
    /// Most recent English-language articles first.
    pub fn recent(q: String, page_size: usize) -> Self {
        Self {
            q,
            sort_by: "publishedAt",
            language: "en",
            page_size,
        }
    }
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn get_everything(&self, request: &EverythingRequest)
        -> Result<ProviderPayload, NewsError>;
}

pub struct NewsApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NewsApiClient {
    pub fn new(config: &NewsApiConfig, api_key: &str) -> Result<Self, NewsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("KeywordNews/1.0 (News Aggregator)")
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn status_error(status: StatusCode) -> NewsError {
        NewsError::Provider {
            status: status.as_u16(),
            code: "http".to_string(),
            message: status.to_string(),
        }
    }

    /// Provider error bodies look like `{"status":"error","code":"...","message":"..."}`.
    fn error_from_body(status: u16, body: &Value) -> Option<NewsError> {
        if body.get("status").and_then(Value::as_str) != Some("error") {
            return None;
        }

        let field = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };

        Some(NewsError::Provider {
            status,
            code: field("code"),
            message: field("message"),
        })
    }
}

#[async_trait]
impl NewsProvider for NewsApiClient {
    async fn get_everything(
        &self,
        request: &EverythingRequest,
    ) -> Result<ProviderPayload, NewsError> {
        let url = format!("{}{}", self.base_url, EVERYTHING_PATH);
        debug!("Querying news provider: q={:?} pageSize={}", request.q, request.page_size);

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(request)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        let body: Value = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(NewsError::Malformed(e.to_string())),
            Err(_) => return Err(Self::status_error(status)),
        };

        if let Some(err) = Self::error_from_body(status.as_u16(), &body) {
            return Err(err);
        }
        if !status.is_success() {
            return Err(Self::status_error(status));
        }

        Ok(ProviderPayload::from_json(body))
    }
}

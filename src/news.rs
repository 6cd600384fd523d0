use std::sync::Arc;

use tracing::{error, info};

use crate::article::Article;
use crate::config::NewsApiConfig;
use crate::provider::{EverythingRequest, NewsApiClient, NewsError, NewsProvider};

pub const DEFAULT_LIMIT: usize = 20;

/// Keyword texts are combined conjunctively: an article must match all of them.
pub const KEYWORD_JOIN: &str = " AND ";

/// Builds the provider query from keyword texts. `None` when there are no keywords.
pub fn build_query<S: AsRef<str>>(keywords: &[S]) -> Option<String> {
    if keywords.is_empty() {
        return None;
    }

    let parts: Vec<&str> = keywords.iter().map(|k| k.as_ref()).collect();
    Some(parts.join(KEYWORD_JOIN))
}

/// Fetches recent articles for a set of keywords.
///
/// A service without a provider (no credential configured) never makes an
/// outbound call and always answers with no articles.
pub struct NewsService {
    provider: Option<Arc<dyn NewsProvider>>,
    max_page_size: usize,
}

impl NewsService {
    pub fn new(provider: Option<Arc<dyn NewsProvider>>, max_page_size: usize) -> Self {
        Self {
            provider,
            max_page_size,
        }
    }

    /// A service that never calls out.
    pub fn disabled() -> Self {
        Self::new(None, DEFAULT_LIMIT)
    }

    pub fn from_config(config: &NewsApiConfig) -> Result<Self, NewsError> {
        let provider: Option<Arc<dyn NewsProvider>> = match config.credential() {
            Some(key) => Some(Arc::new(NewsApiClient::new(config, key)?)),
            None => {
                info!("No news provider key configured, article fetching disabled");
                None
            }
        };

        Ok(Self::new(provider, config.max_page_size))
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Caps a caller-supplied limit at the provider's page size.
    pub fn effective_limit(&self, limit: usize) -> usize {
        limit.min(self.max_page_size)
    }

    /// Fetch articles, surfacing provider failures.
    ///
    /// Missing keywords, a missing credential or a zero limit are not errors:
    /// they produce `Ok` with no articles and no outbound call.
    pub async fn try_fetch_articles<S: AsRef<str>>(
        &self,
        keywords: &[S],
        limit: usize,
    ) -> Result<Vec<Article>, NewsError> {
        let Some(provider) = &self.provider else {
            return Ok(Vec::new());
        };
        let limit = self.effective_limit(limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(query) = build_query(keywords) else {
            return Ok(Vec::new());
        };

        let request = EverythingRequest::recent(query, limit);
        let payload = provider.get_everything(&request).await?;

        Ok(payload.normalize(limit))
    }

    /// Fetch articles, treating any provider failure as "no articles".
    pub async fn fetch_articles<S: AsRef<str>>(&self, keywords: &[S], limit: usize) -> Vec<Article> {
        match self.try_fetch_articles(keywords, limit).await {
            Ok(articles) => articles,
            Err(e) => {
                error!("News provider request failed: {:#}", anyhow::Error::from(e));
                Vec::new()
            }
        }
    }
}

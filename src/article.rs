//! Article records and normalization of provider payloads.
//!
//! The provider may answer with an envelope (`{"articles": [...]}`), a bare
//! list, or something else entirely, and individual articles may be plain
//! JSON objects or typed records exposing accessors. Each shape is a variant
//! here and is mapped to [`Article`] exactly once.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A normalized news item. Absent fields serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub author: Option<String>,
    pub source: Option<Source>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: Option<String>,
}

/// A provider article exposed through accessors rather than as a JSON object.
///
/// Every accessor defaults to `None`, so implementors only provide the fields
/// they actually carry.
pub trait ArticleAccessors: Send + Sync {
    fn title(&self) -> Option<String> {
        None
    }

    fn description(&self) -> Option<String> {
        None
    }

    fn url(&self) -> Option<String> {
        None
    }

    fn url_to_image(&self) -> Option<String> {
        None
    }

    fn published_at(&self) -> Option<String> {
        None
    }

    fn author(&self) -> Option<String> {
        None
    }

    /// `None` means the record has no source at all; `Some(None)` means a
    /// source without a name.
    fn source_name(&self) -> Option<Option<String>> {
        None
    }
}

pub enum RawArticle {
    Fields(Value),
    Accessors(Box<dyn ArticleAccessors>),
}

impl RawArticle {
    pub fn normalize(&self) -> Article {
        match self {
            RawArticle::Fields(value) => from_fields(value),
            RawArticle::Accessors(record) => from_accessors(record.as_ref()),
        }
    }
}

impl From<Value> for RawArticle {
    fn from(value: Value) -> Self {
        RawArticle::Fields(value)
    }
}

/// The top-level shape of a provider response.
pub enum ProviderPayload {
    Envelope(Vec<RawArticle>),
    List(Vec<RawArticle>),
    Unrecognized,
}

impl ProviderPayload {
    /// Classify a decoded JSON body.
    pub fn from_json(body: Value) -> Self {
        match body {
            Value::Object(mut map) => match map.remove("articles") {
                Some(Value::Array(items)) => {
                    ProviderPayload::Envelope(items.into_iter().map(RawArticle::from).collect())
                }
                _ => ProviderPayload::Unrecognized,
            },
            Value::Array(items) => {
                ProviderPayload::List(items.into_iter().map(RawArticle::from).collect())
            }
            _ => ProviderPayload::Unrecognized,
        }
    }

    pub fn into_articles(self) -> Vec<RawArticle> {
        match self {
            ProviderPayload::Envelope(items) | ProviderPayload::List(items) => items,
            ProviderPayload::Unrecognized => Vec::new(),
        }
    }

    /// Normalize every article, keeping provider order, and keep at most `limit`.
    pub fn normalize(self, limit: usize) -> Vec<Article> {
        self.into_articles()
            .iter()
            .take(limit)
            .map(RawArticle::normalize)
            .collect()
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn from_fields(value: &Value) -> Article {
    let Some(map) = value.as_object() else {
        return Article::default();
    };

    let source = match map.get("source") {
        Some(Value::Object(source)) => Some(Source {
            name: text_field(source, "name"),
        }),
        _ => None,
    };

    Article {
        title: text_field(map, "title"),
        description: text_field(map, "description"),
        url: text_field(map, "url"),
        url_to_image: text_field(map, "urlToImage"),
        published_at: text_field(map, "publishedAt"),
        author: text_field(map, "author"),
        source,
    }
}

fn from_accessors(record: &dyn ArticleAccessors) -> Article {
    Article {
        title: record.title(),
        description: record.description(),
        url: record.url(),
        url_to_image: record.url_to_image(),
        published_at: record.published_at(),
        author: record.author(),
        source: record.source_name().map(|name| Source { name }),
    }
}

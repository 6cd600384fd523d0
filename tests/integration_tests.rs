//! Integration tests for the keyword-news backend
//!
//! These tests exercise configuration loading, on-disk persistence, the news
//! provider client against a mock HTTP server, and the full HTTP session flow.

use std::io::Write;
use tempfile::NamedTempFile;

mod common {
    use std::sync::Arc;

    use keyword_news::config::NewsApiConfig;
    use keyword_news::db::Database;
    use keyword_news::news::NewsService;
    use keyword_news::routes::{router, AppState};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    /// Create a temporary directory for test databases
    pub fn create_temp_dir() -> TempDir {
        tempfile::tempdir().expect("Failed to create temp directory")
    }

    /// Create a test database path
    pub fn create_db_path(temp_dir: &TempDir) -> String {
        let db_path = temp_dir.path().join("test.db");
        format!("sqlite:{}?mode=rwc", db_path.display())
    }

    /// Provider settings pointing at a mock server.
    pub fn provider_config(base_url: &str, api_key: Option<&str>) -> NewsApiConfig {
        NewsApiConfig {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            ..NewsApiConfig::default()
        }
    }

    pub fn sample_article(n: usize) -> Value {
        json!({
            "source": { "id": null, "name": format!("Source {}", n) },
            "author": format!("Author {}", n),
            "title": format!("Article {}", n),
            "description": format!("Description {}", n),
            "url": format!("https://example.com/article{}", n),
            "urlToImage": format!("https://example.com/image{}.jpg", n),
            "publishedAt": "2024-01-01T00:00:00Z",
            "content": "..."
        })
    }

    pub async fn create_app(news: NewsService) -> axum::Router {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();

        let state = Arc::new(AppState {
            db: Arc::new(db),
            news: Arc::new(news),
            session_ttl: chrono::Duration::hours(1),
        });

        router(state)
    }
}

#[cfg(test)]
mod config_integration_tests {
    use super::*;
    use keyword_news::config::Config;

    #[test]
    fn test_load_actual_news_config() {
        // Test loading the actual news.toml from the project
        let config = Config::load("news.toml");
        assert!(config.is_ok(), "Failed to load news.toml: {:?}", config.err());

        let config = config.unwrap();
        assert_eq!(config.news_api.base_url, "https://newsapi.org");
        assert!(config.news_api.credential().is_none(), "news.toml must not ship a key");
        assert!(config.session_ttl_hours > 0, "session_ttl_hours should be positive");
        assert!(!config.allowed_origins.is_empty());
    }

    #[test]
    fn test_config_file_round_trip() {
        let toml_content = r#"
            bind_address = "127.0.0.1:8080"
            session_ttl_hours = 48
            allowed_origins = ["https://news.example.com", "http://localhost:5173"]

            [news_api]
            base_url = "http://localhost:9999"
            api_key = "file-key"
            timeout_secs = 3
            max_page_size = 50
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.session_ttl(), chrono::Duration::hours(48));
        assert_eq!(config.allowed_origins.len(), 2);
        assert_eq!(config.news_api.base_url, "http://localhost:9999");
        assert_eq!(config.news_api.credential(), Some("file-key"));
        assert_eq!(config.news_api.timeout_secs, 3);
        assert_eq!(config.news_api.max_page_size, 50);
    }
}

#[cfg(test)]
mod database_integration_tests {
    use super::common::*;
    use keyword_news::db::Database;

    #[tokio::test]
    async fn test_database_persistence() {
        let temp_dir = create_temp_dir();
        let db_url = create_db_path(&temp_dir);

        // Create database and add data
        let token = {
            let db = Database::new(&db_url).await.unwrap();
            db.initialize().await.unwrap();

            let user = db
                .create_user("persistent@example.com", "digest")
                .await
                .unwrap()
                .unwrap();
            db.create_keyword(user.id, "technology").await.unwrap();
            db.create_keyword(user.id, "AI").await.unwrap();
            db.create_session(user.id, chrono::Duration::hours(1))
                .await
                .unwrap()
        };

        // Reopen database and verify data persists
        {
            let db = Database::new(&db_url).await.unwrap();
            // Initializing again must not disturb existing rows
            db.initialize().await.unwrap();

            let user = db
                .find_user_by_email("persistent@example.com")
                .await
                .unwrap()
                .unwrap();
            let texts = db.keyword_texts_for_user(user.id).await.unwrap();
            assert_eq!(texts, vec!["technology".to_string(), "AI".to_string()]);

            let session_user = db.find_session_user(&token).await.unwrap().unwrap();
            assert_eq!(session_user.id, user.id);
        }
    }

    #[tokio::test]
    async fn test_keywords_isolated_per_user() {
        let temp_dir = create_temp_dir();
        let db = Database::new(&create_db_path(&temp_dir)).await.unwrap();
        db.initialize().await.unwrap();

        let alice = db.create_user("alice@example.com", "d").await.unwrap().unwrap();
        let bob = db.create_user("bob@example.com", "d").await.unwrap().unwrap();

        for i in 1..=10 {
            db.create_keyword(alice.id, &format!("alice-{}", i)).await.unwrap();
        }
        db.create_keyword(bob.id, "alice-1").await.unwrap();

        let alice_keywords = db.list_keywords(alice.id).await.unwrap();
        assert_eq!(alice_keywords.len(), 10);
        assert_eq!(alice_keywords[0].keyword, "alice-10"); // Most recent first
        assert!(alice_keywords.iter().all(|k| k.user_id == alice.id));

        assert_eq!(db.list_keywords(bob.id).await.unwrap().len(), 1);
    }
}

#[cfg(test)]
mod provider_integration_tests {
    use super::common::*;
    use keyword_news::news::NewsService;
    use keyword_news::provider::{EverythingRequest, NewsApiClient, NewsError, NewsProvider};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(query_param("q", "technology AND AI"))
            .and(query_param("sortBy", "publishedAt"))
            .and(query_param("language", "en"))
            .and(query_param("pageSize", "20"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "totalResults": 2,
                "articles": [sample_article(1), sample_article(2)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let news =
            NewsService::from_config(&provider_config(&server.uri(), Some("test-key"))).unwrap();
        let articles = news.fetch_articles(&["technology", "AI"], 20).await;

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title.as_deref(), Some("Article 1"));
        assert_eq!(articles[0].author.as_deref(), Some("Author 1"));
        assert_eq!(
            articles[1].source.as_ref().and_then(|s| s.name.as_deref()),
            Some("Source 2")
        );
    }

    #[tokio::test]
    async fn test_bare_list_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([sample_article(1)])),
            )
            .mount(&server)
            .await;

        let news =
            NewsService::from_config(&provider_config(&server.uri(), Some("test-key"))).unwrap();
        let articles = news.fetch_articles(&["technology"], 20).await;

        assert_eq!(articles.len(), 1);
        assert_eq!(
            articles[0].url_to_image.as_deref(),
            Some("https://example.com/image1.jpg")
        );
    }

    #[tokio::test]
    async fn test_results_truncated_to_limit() {
        let server = MockServer::start().await;
        let items: Vec<_> = (1..=25).map(sample_article).collect();
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status": "ok", "articles": items })),
            )
            .mount(&server)
            .await;

        let news =
            NewsService::from_config(&provider_config(&server.uri(), Some("test-key"))).unwrap();
        let articles = news.fetch_articles(&["technology"], 20).await;

        assert_eq!(articles.len(), 20);
        assert_eq!(articles[19].title.as_deref(), Some("Article 20"));
    }

    #[tokio::test]
    async fn test_server_error_yields_no_articles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(2)
            .mount(&server)
            .await;

        let news =
            NewsService::from_config(&provider_config(&server.uri(), Some("test-key"))).unwrap();

        let err = news.try_fetch_articles(&["technology"], 20).await.unwrap_err();
        assert!(matches!(err, NewsError::Provider { status: 500, .. }));
        assert!(news.fetch_articles(&["technology"], 20).await.is_empty());
    }

    #[tokio::test]
    async fn test_error_body_yields_no_articles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status": "error",
                "code": "apiKeyInvalid",
                "message": "Your API key is invalid or incorrect."
            })))
            .mount(&server)
            .await;

        let client =
            NewsApiClient::new(&provider_config(&server.uri(), None), "bad-key").unwrap();
        let request = EverythingRequest::recent("technology".to_string(), 20);

        match client.get_everything(&request).await {
            Err(NewsError::Provider { status, code, .. }) => {
                assert_eq!(status, 401);
                assert_eq!(code, "apiKeyInvalid");
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("expected a provider error"),
        }

        let news =
            NewsService::from_config(&provider_config(&server.uri(), Some("bad-key"))).unwrap();
        assert!(news.fetch_articles(&["technology"], 20).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_yields_no_articles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let news =
            NewsService::from_config(&provider_config(&server.uri(), Some("test-key"))).unwrap();

        let err = news.try_fetch_articles(&["technology"], 20).await.unwrap_err();
        assert!(matches!(err, NewsError::Malformed(_)));
        assert!(news.fetch_articles(&["technology"], 20).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "articles": [] })))
            .expect(0)
            .mount(&server)
            .await;

        for key in [None, Some(""), Some("   ")] {
            let news = NewsService::from_config(&provider_config(&server.uri(), key)).unwrap();
            assert!(!news.is_enabled());
            assert!(news.fetch_articles(&["technology"], 20).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_no_keywords_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "articles": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let news =
            NewsService::from_config(&provider_config(&server.uri(), Some("test-key"))).unwrap();
        let keywords: [&str; 0] = [];

        assert!(news.fetch_articles(&keywords, 20).await.is_empty());
    }
}

#[cfg(test)]
mod http_integration_tests {
    use super::common::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use keyword_news::news::NewsService;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_full_session_flow() {
        let provider = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(query_param("q", "technology AND AI"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "articles": [sample_article(1), sample_article(2)]
            })))
            .expect(1)
            .mount(&provider)
            .await;

        let news =
            NewsService::from_config(&provider_config(&provider.uri(), Some("test-key"))).unwrap();
        let server = TestServer::new(create_app(news).await).unwrap();

        // Sign up
        let response = server
            .post("/users")
            .json(&json!({
                "user": {
                    "email": "reader@example.com",
                    "password": "password123",
                    "password_confirmation": "password123"
                }
            }))
            .await;
        response.assert_status_ok();
        let cookie = response.cookie("session_id");

        // Add keywords
        for keyword in ["technology", "AI"] {
            let response = server
                .post("/keywords")
                .add_cookie(cookie.clone())
                .json(&json!({ "keyword": { "keyword": keyword } }))
                .await;
            assert_eq!(response.status_code(), StatusCode::CREATED);
        }

        let keywords: Value = server
            .get("/keywords")
            .add_cookie(cookie.clone())
            .await
            .json();
        assert_eq!(keywords.as_array().unwrap().len(), 2);
        assert_eq!(keywords[0]["keyword"], "AI");

        // Articles for both keywords
        let response = server.get("/articles").add_cookie(cookie.clone()).await;
        response.assert_status_ok();
        let articles: Value = response.json();
        assert_eq!(articles.as_array().unwrap().len(), 2);
        assert_eq!(articles[0]["title"], "Article 1");
        assert_eq!(articles[0]["source"]["name"], "Source 1");

        // Sign out ends the session
        let response = server
            .delete("/users/sign_out")
            .add_cookie(cookie.clone())
            .await;
        response.assert_status_ok();

        let response = server.get("/keywords").add_cookie(cookie).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sign_in_after_sign_up() {
        let server = TestServer::new(create_app(NewsService::disabled()).await).unwrap();

        server
            .post("/users")
            .json(&json!({
                "user": { "email": "reader@example.com", "password": "password123" }
            }))
            .await
            .assert_status_ok();

        let response = server
            .post("/users/sign_in")
            .json(&json!({
                "user": { "email": "Reader@Example.com", "password": "password123" }
            }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"]["message"], "Logged in successfully.");

        let cookie = response.cookie("session_id");
        server
            .get("/articles")
            .add_cookie(cookie)
            .await
            .assert_status_ok();
    }
}

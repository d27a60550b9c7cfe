use crate::config::FetchConfig;
use crate::error::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Reads content bytes from a caller-supplied URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// GET `url` and return the full body
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `RemoteFetcher` over plain HTTP(S)
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(FetchError::TooLarge(limit));
        }

        // Content-Length may be absent or wrong, so count while reading
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge(limit));
            }
            body.extend_from_slice(&chunk);
        }
        debug!(size_bytes = body.len(), "Fetched remote content");

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let base = serve(Router::new().route("/cat.jpg", get(|| async { "meow" }))).await;
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();

        let body = fetcher.fetch(&format!("{base}/cat.jpg")).await.unwrap();
        assert_eq!(body, b"meow");
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status() {
        let base = serve(Router::new().route(
            "/gone",
            get(|| async { (StatusCode::GONE, "gone") }),
        ))
        .await;
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();

        let result = fetcher.fetch(&format!("{base}/gone")).await;
        assert!(matches!(result, Err(FetchError::Status(410))));

        let result = fetcher.fetch(&format!("{base}/missing")).await;
        assert!(matches!(result, Err(FetchError::Status(404))));
    }

    #[tokio::test]
    async fn test_fetch_caps_body_size() {
        let base = serve(
            Router::new()
                .route("/small", get(|| async { vec![1u8; 16] }))
                .route("/large", get(|| async { vec![1u8; 64] })),
        )
        .await;
        let fetcher = HttpFetcher::new(&FetchConfig {
            max_body_bytes: 16,
            ..FetchConfig::default()
        })
        .unwrap();

        let body = fetcher.fetch(&format!("{base}/small")).await.unwrap();
        assert_eq!(body.len(), 16);

        let result = fetcher.fetch(&format!("{base}/large")).await;
        assert!(matches!(result, Err(FetchError::TooLarge(16))));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let result = fetcher.fetch("not a url").await;
        assert!(matches!(result, Err(FetchError::Request(_))));
    }
}

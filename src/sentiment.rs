//! Sentiment lookups
//!
//! Read-only scores from an external analyzer. Model internals live
//! elsewhere; this side only asks for a number and treats every failure as
//! "no score yet".

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Result of a sentiment lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SentimentScore {
    /// Score in [-1.0, 1.0]
    Score(f64),
    /// No score available right now (unknown asset, timeout, upstream error)
    Unavailable,
}

/// Trait for sentiment providers
#[async_trait]
pub trait SentimentFeed: Send + Sync {
    async fn score(&self, asset_id: &str) -> SentimentScore;
}

/// Sentiment client construction errors
#[derive(Debug, Error)]
pub enum SentimentError {
    #[error("Invalid sentiment endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Sentiment client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f64,
}

/// HTTP analyzer client: `GET {endpoint}/score/{asset_id}` → `{"score": f64}`
pub struct HttpSentimentFeed {
    endpoint: Url,
    client: Client,
}

impl HttpSentimentFeed {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SentimentError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SentimentError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(SentimentError::InvalidEndpoint(endpoint.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, client })
    }

    /// Asset ids are percent-encoded as a single path segment
    fn score_url(&self, asset_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("score").push(asset_id);
        }
        url
    }

    async fn fetch(&self, asset_id: &str) -> Result<Option<f64>, reqwest::Error> {
        let response = self.client.get(self.score_url(asset_id)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ScoreResponse = response.error_for_status()?.json().await?;
        Ok(Some(body.score))
    }
}

#[async_trait]
impl SentimentFeed for HttpSentimentFeed {
    async fn score(&self, asset_id: &str) -> SentimentScore {
        match self.fetch(asset_id).await {
            Ok(Some(score)) if score.is_finite() => SentimentScore::Score(score.clamp(-1.0, 1.0)),
            Ok(_) => SentimentScore::Unavailable,
            Err(e) => {
                tracing::debug!(asset_id, error = %e, "Sentiment lookup failed");
                SentimentScore::Unavailable
            }
        }
    }
}

/// Fixed scores, with an optional fallback for unknown assets
#[derive(Default)]
pub struct StaticSentimentFeed {
    scores: RwLock<HashMap<String, f64>>,
    fallback: Option<f64>,
}

impl StaticSentimentFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unknown asset scores `score`
    pub fn with_fallback(score: f64) -> Self {
        Self {
            scores: RwLock::default(),
            fallback: Some(score),
        }
    }

    pub async fn set(&self, asset_id: impl Into<String>, score: f64) {
        self.scores.write().await.insert(asset_id.into(), score);
    }
}

#[async_trait]
impl SentimentFeed for StaticSentimentFeed {
    async fn score(&self, asset_id: &str) -> SentimentScore {
        let known = self.scores.read().await.get(asset_id).copied();
        match known.or(self.fallback) {
            Some(score) => SentimentScore::Score(score),
            None => SentimentScore::Unavailable,
        }
    }
}

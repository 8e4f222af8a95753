//! NASA APOD collaborator.
//!
//! Read-only client for the astronomy-picture-of-the-day service. The rest
//! of the system talks to it through the `MediaLookup` trait so tests can
//! substitute a fake; no retry or backoff beyond the client timeout.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.nasa.gov/planetary/apod";
/// Feed screens never show more than this many entries at once.
const RECENT_CAP: usize = 25;

#[derive(Error, Debug)]
pub enum ApodError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Upstream error: {0}")]
    Upstream(String),
}

pub type ApodResult<T> = Result<T, ApodError>;

/// One day's entry as the upstream API returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apod {
    pub date: String,
    pub title: String,
    #[serde(default)]
    pub explanation: String,
    pub url: String,
    pub media_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdurl: Option<String>,
}

impl Apod {
    pub fn is_image(&self) -> bool {
        self.media_type == "image"
    }
}

/// Seam for anything that resolves a post id (APOD date) to its media.
#[async_trait]
pub trait MediaLookup: Send + Sync {
    async fn media_for_date(&self, date: &str) -> ApodResult<Option<Apod>>;
}

pub struct ApodClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApodClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_env() -> Self {
        let base_url =
            std::env::var("NASA_APOD_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("NASA_API_KEY").unwrap_or_else(|_| "DEMO_KEY".to_string());
        Self::new(base_url, api_key)
    }

    /// Fetch a single day's entry. Upstream rejections (bad date, rate
    /// limit) degrade to None rather than failing the caller's operation.
    pub async fn fetch_by_date(&self, date: &str) -> ApodResult<Option<Apod>> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("api_key", self.api_key.as_str()), ("date", date)])
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("APOD fetch for {} failed: {}", date, response.status());
            return Ok(None);
        }

        let apod = response.json::<Apod>().await?;
        Ok(Some(apod))
    }

    /// Fetch an inclusive date range, oldest first as upstream returns it.
    pub async fn fetch_range(&self, start_date: &str, end_date: &str) -> ApodResult<Vec<Apod>> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("start_date", start_date),
                ("end_date", end_date),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApodError::Upstream(format!(
                "range {}..{} rejected: {}",
                start_date,
                end_date,
                response.status()
            )));
        }

        let entries = response.json::<Vec<Apod>>().await?;
        Ok(entries)
    }

    /// The feed window: last `days` days, images only, newest first,
    /// capped at 25 entries.
    pub async fn recent_window(&self, days: i64) -> ApodResult<Vec<Apod>> {
        let today = Utc::now().date_naive();
        let start = today - Duration::days(days);
        let mut entries = self
            .fetch_range(
                &start.format("%Y-%m-%d").to_string(),
                &today.format("%Y-%m-%d").to_string(),
            )
            .await?;

        entries.retain(|a| a.is_image());
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries.truncate(RECENT_CAP);
        Ok(entries)
    }
}

#[async_trait]
impl MediaLookup for ApodClient {
    async fn media_for_date(&self, date: &str) -> ApodResult<Option<Apod>> {
        self.fetch_by_date(date).await
    }
}

//! YouTube Data API v3 metrics adapter
//!
//! One GET per clip: `videos?part=statistics&id=<video_id>`. Counters come
//! back as decimal strings and shares are not exposed at all.

use super::{error_for_status, MetricsAdapter, PlatformError};
use crate::models::{ClipMetrics, Platform};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Clone)]
pub struct YoutubeAdapter {
    client: Client,
    base_url: String,
}

impl YoutubeAdapter {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to build YouTube client")?;

        Ok(Self {
            client,
            base_url: YOUTUBE_API_BASE.to_string(),
        })
    }
}

#[async_trait]
impl MetricsAdapter for YoutubeAdapter {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn parse_content_id(&self, url: &str) -> Result<String, PlatformError> {
        extract_video_id(url).ok_or_else(|| {
            PlatformError::InvalidUrl(format!("Not a recognizable YouTube video URL: {}", url))
        })
    }

    async fn fetch_metrics(
        &self,
        content_id: &str,
        access_token: &str,
    ) -> Result<ClipMetrics, PlatformError> {
        let url = format!("{}/videos", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("part", "statistics"), ("id", content_id)])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| PlatformError::Upstream(format!("GET /videos failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        let parsed = resp
            .json::<VideoListResponse>()
            .await
            .map_err(|e| PlatformError::Upstream(format!("Failed to parse videos response: {}", e)))?;

        // Deleted and private videos come back as an empty item list, not 404
        let Some(item) = parsed.items.into_iter().next() else {
            return Err(PlatformError::NotFound(format!(
                "Video {} not visible to the API",
                content_id
            )));
        };

        Ok(item.statistics.into_metrics())
    }
}

/// Pull the 11-character video id out of the URL shapes creators paste:
/// watch?v=, youtu.be/, shorts/ and embed/.
pub fn extract_video_id(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))?;
    let host_and_path = without_scheme
        .strip_prefix("www.")
        .or_else(|| without_scheme.strip_prefix("m."))
        .unwrap_or(without_scheme);

    let candidate = if let Some(rest) = host_and_path.strip_prefix("youtu.be/") {
        rest
    } else if let Some(rest) = host_and_path.strip_prefix("youtube.com/watch") {
        let query = rest.strip_prefix('?')?;
        query.split('&').find_map(|pair| pair.strip_prefix("v="))?
    } else if let Some(rest) = host_and_path.strip_prefix("youtube.com/shorts/") {
        rest
    } else if let Some(rest) = host_and_path.strip_prefix("youtube.com/embed/") {
        rest
    } else {
        return None;
    };

    let id: String = candidate
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    // Video ids are exactly 11 URL-safe base64 characters
    if id.len() == 11 {
        Some(id)
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    #[serde(default)]
    statistics: VideoStatistics,
}

/// Counters arrive as decimal strings per the Data API contract
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default)]
    view_count: Option<String>,
    #[serde(default)]
    like_count: Option<String>,
    #[serde(default)]
    comment_count: Option<String>,
}

impl VideoStatistics {
    fn into_metrics(self) -> ClipMetrics {
        ClipMetrics {
            views: self.view_count.as_deref().and_then(|s| s.parse().ok()),
            likes: self.like_count.as_deref().and_then(|s| s.parse().ok()),
            comments: self.comment_count.as_deref().and_then(|s| s.parse().ok()),
            // The Data API has no share counter
            shares: None,
        }
    }
}

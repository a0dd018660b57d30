//! TikTok Display API metrics adapter
//!
//! Metrics come from `POST /v2/video/query/` with a `video_ids` filter.
//! TikTok signals most application errors inside a 200 response envelope,
//! so the error code has to be checked alongside the HTTP status.

use super::{error_for_status, MetricsAdapter, PlatformError};
use crate::models::{ClipMetrics, Platform};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const TIKTOK_API_BASE: &str = "https://open.tiktokapis.com/v2";

const QUERY_FIELDS: &str = "id,view_count,like_count,comment_count,share_count";

#[derive(Clone)]
pub struct TiktokAdapter {
    client: Client,
    base_url: String,
}

impl TiktokAdapter {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to build TikTok client")?;

        Ok(Self {
            client,
            base_url: TIKTOK_API_BASE.to_string(),
        })
    }
}

#[async_trait]
impl MetricsAdapter for TiktokAdapter {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn parse_content_id(&self, url: &str) -> Result<String, PlatformError> {
        extract_video_id(url).ok_or_else(|| {
            PlatformError::InvalidUrl(format!("Not a recognizable TikTok video URL: {}", url))
        })
    }

    async fn fetch_metrics(
        &self,
        content_id: &str,
        access_token: &str,
    ) -> Result<ClipMetrics, PlatformError> {
        let url = format!("{}/video/query/", self.base_url);
        let body = serde_json::json!({
            "filters": { "video_ids": [content_id] }
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("fields", QUERY_FIELDS)])
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Upstream(format!("POST /video/query failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        let parsed = resp
            .json::<QueryResponse>()
            .await
            .map_err(|e| PlatformError::Upstream(format!("Failed to parse query response: {}", e)))?;

        if let Some(err) = parsed.error {
            if err.code != "ok" {
                return Err(match err.code.as_str() {
                    "access_token_invalid" | "access_token_expired" => PlatformError::AuthExpired,
                    "rate_limit_exceeded" => PlatformError::RateLimited,
                    _ => PlatformError::Upstream(format!(
                        "TikTok error {}: {}",
                        err.code, err.message
                    )),
                });
            }
        }

        let Some(video) = parsed.data.videos.into_iter().next() else {
            return Err(PlatformError::NotFound(format!(
                "Video {} not visible to the API",
                content_id
            )));
        };

        Ok(ClipMetrics {
            views: video.view_count,
            likes: video.like_count,
            comments: video.comment_count,
            shares: video.share_count,
        })
    }
}

/// Pull the numeric video id out of a TikTok URL. Share links look like
/// `https://www.tiktok.com/@handle/video/7310000000000000000`; shortened
/// `vm.tiktok.com` links need a redirect hop we deliberately do not make,
/// so they are rejected here.
pub fn extract_video_id(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))?;
    let (host, path) = without_scheme.split_once('/')?;
    if host != "tiktok.com" && !host.ends_with(".tiktok.com") {
        return None;
    }

    let marker = path.find("video/")?;
    let digits: String = path[marker + "video/".len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: QueryData,
    #[serde(default)]
    error: Option<ApiStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    videos: Vec<VideoRecord>,
}

#[derive(Debug, Deserialize)]
struct VideoRecord {
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    like_count: Option<u64>,
    #[serde(default)]
    comment_count: Option<u64>,
    #[serde(default)]
    share_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

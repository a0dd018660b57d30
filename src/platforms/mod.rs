//! Platform metrics adapters
//!
//! One adapter per platform behind a shared trait, so the sync engine does
//! not care which API a clip lives on.

use crate::models::{ClipMetrics, Platform};
use async_trait::async_trait;

pub mod tiktok;
pub mod youtube;

pub use tiktok::TiktokAdapter;
pub use youtube::YoutubeAdapter;

/// Why a metrics fetch did not produce counters
#[derive(Debug, Clone)]
pub enum PlatformError {
    /// The submission URL cannot be parsed into a content id. Permanent,
    /// retrying will not help.
    InvalidUrl(String),
    /// The platform rejected our access token
    AuthExpired,
    /// The platform is throttling or quota-limiting us
    RateLimited,
    /// The clip is gone or not visible to the API
    NotFound(String),
    /// Timeout, 5xx or transport failure
    Upstream(String),
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(url) => write!(f, "Invalid content URL: {}", url),
            Self::AuthExpired => write!(f, "Platform access token rejected"),
            Self::RateLimited => write!(f, "Platform rate limit hit"),
            Self::NotFound(detail) => write!(f, "Content not found: {}", detail),
            Self::Upstream(detail) => write!(f, "Platform unavailable: {}", detail),
        }
    }
}

impl std::error::Error for PlatformError {}

/// Map an HTTP error status onto the adapter error taxonomy. YouTube
/// reports quota exhaustion as 403, so both 403 and 429 count as
/// rate limiting.
pub(crate) fn error_for_status(status: reqwest::StatusCode, body: &str) -> PlatformError {
    match status.as_u16() {
        401 => PlatformError::AuthExpired,
        403 | 429 => PlatformError::RateLimited,
        404 => PlatformError::NotFound(format!("HTTP 404: {}", body)),
        _ => PlatformError::Upstream(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
pub trait MetricsAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Extract the platform content id from a submission URL
    fn parse_content_id(&self, url: &str) -> Result<String, PlatformError>;

    /// Fetch the current engagement counters for a clip
    async fn fetch_metrics(
        &self,
        content_id: &str,
        access_token: &str,
    ) -> Result<ClipMetrics, PlatformError>;
}

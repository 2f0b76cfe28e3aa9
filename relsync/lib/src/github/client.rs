//! GitHub REST client.
//!
//! Every request goes through the shared [`RequestGate`], so concurrency is
//! bounded and a rate-limit response pauses all fetching until the reset time
//! GitHub announces. The rate-limited request is re-issued once the gate
//! reopens, up to [`MAX_ATTEMPTS`] times.

use super::gate::RequestGate;
use super::types::{ProjectInfo, RawRelease, RawTag, TagObject};
use super::url::RepoRef;
use crate::BoxFuture;
use crate::error::{Result, SyncError};
use crate::release_set::ReleaseSource;
use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default base URL for the GitHub REST API.
pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";

/// Attempts per request before a rate limit is reported as an error.
pub const MAX_ATTEMPTS: u32 = 5;

/// Backoff used when a rate-limit response announces no reset time.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Releases per page; the API maximum.
const RELEASES_PER_PAGE: u32 = 100;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: String,
    token: Option<String>,
    gate: Arc<RequestGate>,
}

impl GitHubClient {
    /// Creates a client for the given API base URL.
    ///
    /// ## Errors
    ///
    /// Returns `SyncError::Http` if the HTTP client cannot be built.
    pub fn new(api_base: impl Into<String>, user_agent: &str, gate: Arc<RequestGate>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: None,
            gate,
        })
    }

    /// Authenticates every request with the given token.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// GETs `url` and decodes the JSON body.
    ///
    /// ## Errors
    ///
    /// - `SyncError::NotFound` on 404
    /// - `SyncError::RateLimited` when still limited after [`MAX_ATTEMPTS`]
    /// - `SyncError::UnexpectedStatus` for any other non-success status
    /// - `SyncError::Http` / `SyncError::JsonParse` for transport and decoding failures
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut last_delay = DEFAULT_BACKOFF;

        for attempt in 1..=MAX_ATTEMPTS {
            let response = {
                let _permit = self.gate.acquire().await;
                let mut request = self
                    .http
                    .get(url)
                    .header(ACCEPT, "application/vnd.github+json");
                if let Some(token) = &self.token {
                    request = request.header(AUTHORIZATION, format!("Bearer {}", token));
                }
                request.send().await?
            };

            let status = response.status();
            let headers = response.headers().clone();
            debug!(url, status = status.as_u16(), attempt, "GitHub response");

            if status.is_success() {
                // The quota is used up but this response is fine: stop others early.
                if header_u64(&headers, "x-ratelimit-remaining") == Some(0)
                    && let Some(delay) = reset_delay(&headers)
                {
                    self.gate.suspend_for(delay);
                }
                let body = response.text().await?;
                return Ok(serde_json::from_str(&body)?);
            }

            if status == StatusCode::NOT_FOUND {
                return Err(SyncError::NotFound(url.to_string()));
            }

            let body = response.text().await.unwrap_or_default();
            if let Some(delay) = rate_limit_delay(status, &headers, &body) {
                warn!(url, attempt, ?delay, "GitHub rate limit hit");
                self.gate.suspend_for(delay);
                last_delay = delay;
                continue;
            }

            return Err(SyncError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body: body.chars().take(200).collect(),
            });
        }

        Err(SyncError::RateLimited {
            reset_after: last_delay,
        })
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Time until `X-RateLimit-Reset` (epoch seconds), at least one second.
fn reset_delay(headers: &HeaderMap) -> Option<Duration> {
    let reset = header_u64(headers, "x-ratelimit-reset")?;
    let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
    Some(Duration::from_secs(reset.saturating_sub(now).max(1)))
}

/// Decides whether a failed response is a (primary or secondary) rate limit
/// and how long to back off.
fn rate_limit_delay(status: StatusCode, headers: &HeaderMap, body: &str) -> Option<Duration> {
    let retry_after = header_u64(headers, RETRY_AFTER.as_str()).map(Duration::from_secs);
    let exhausted = header_u64(headers, "x-ratelimit-remaining") == Some(0);
    let abuse = {
        let body = body.to_lowercase();
        body.contains("rate limit") || body.contains("abuse")
    };

    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && (exhausted || retry_after.is_some() || abuse));
    if !limited {
        return None;
    }
    Some(
        retry_after
            .or_else(|| reset_delay(headers))
            .unwrap_or(DEFAULT_BACKOFF),
    )
}

impl ReleaseSource for GitHubClient {
    fn project_info<'a>(&'a self, repo: &'a RepoRef) -> BoxFuture<'a, Result<ProjectInfo>> {
        Box::pin(async move { self.get_json(&repo.api_url(&self.api_base)).await })
    }

    fn releases_page<'a>(
        &'a self,
        repo: &'a RepoRef,
        page: u32,
    ) -> BoxFuture<'a, Result<Vec<RawRelease>>> {
        Box::pin(async move {
            let url = format!(
                "{}/releases?per_page={}&page={}",
                repo.api_url(&self.api_base),
                RELEASES_PER_PAGE,
                page
            );
            self.get_json(&url).await
        })
    }

    fn tags<'a>(&'a self, repo: &'a RepoRef) -> BoxFuture<'a, Result<Vec<RawTag>>> {
        Box::pin(async move {
            let url = format!("{}/git/refs/tags", repo.api_url(&self.api_base));
            self.get_json(&url).await
        })
    }

    fn tag_object<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<TagObject>> {
        Box::pin(async move { self.get_json(url).await })
    }
}

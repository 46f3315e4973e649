use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::DEFAULT_API_URL;
use crate::error::{Error, Result};
use crate::github::paginator::Paginator;
use crate::github::rate_limiter::RateLimiter;
use crate::models::{Branch, ContentEntry, Contributor, GitTree, RepoAttributes, RepoId};

pub struct GitHubClient {
    client: Client,
    rate_limiter: RateLimiter,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if !token.is_empty() {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("repoclass/0.1"),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub async fn get_repository(&self, repo: &RepoId) -> Result<RepoAttributes> {
        let url = format!("{}/repos/{}/{}", self.base_url, repo.owner, repo.name);
        tracing::debug!("Fetching repository: {}", repo);
        self.get_json(&url, &repo.to_string()).await
    }

    pub async fn get_branches(&self, repo: &RepoId) -> Result<Vec<Branch>> {
        let url = format!("{}/repos/{}/{}/branches", self.base_url, repo.owner, repo.name);
        self.paginator().fetch_all(&url, 100).await
    }

    pub async fn get_contributors(&self, repo: &RepoId) -> Result<Vec<Contributor>> {
        let url = format!(
            "{}/repos/{}/{}/contributors?anon=1",
            self.base_url, repo.owner, repo.name
        );
        self.paginator().fetch_all(&url, 100).await
    }

    /// Fetches a git tree. With `recursive` set the API flattens all subtrees
    /// into one listing and marks it `truncated` once its entry limit is hit.
    pub async fn get_tree(&self, repo: &RepoId, reference: &str, recursive: bool) -> Result<GitTree> {
        let mut url = format!(
            "{}/repos/{}/{}/git/trees/{}",
            self.base_url, repo.owner, repo.name, reference
        );
        if recursive {
            url.push_str("?recursive=1");
        }
        tracing::debug!("Fetching tree {} of {} (recursive: {})", reference, repo, recursive);
        self.get_json(&url, &format!("tree {} of {}", reference, repo)).await
    }

    pub async fn get_dir_contents(&self, repo: &RepoId, path: &str) -> Result<Vec<ContentEntry>> {
        let path = path.trim_matches('/');
        let url = if path.is_empty() {
            format!("{}/repos/{}/{}/contents", self.base_url, repo.owner, repo.name)
        } else {
            format!(
                "{}/repos/{}/{}/contents/{}",
                self.base_url, repo.owner, repo.name, path
            )
        };
        self.get_json(&url, &format!("contents '{}' of {}", path, repo)).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        self.rate_limiter.wait().await;
        let response = self.client.get(url).send().await?;
        self.rate_limiter.update_from_response(&response);

        let response = ensure_success(response, what, &self.rate_limiter).await?;
        // Decode separately so a malformed body is not mistaken for a network failure
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn paginator(&self) -> Paginator<'_> {
        Paginator::new(&self.client, &self.rate_limiter)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

/// Maps non-success responses onto the crate's error taxonomy.
///
/// Not-found and access errors become `NotFound`, an exhausted rate limit
/// becomes `RateLimited`, anything else is a generic `GitHubApi` failure.
pub(crate) async fn ensure_success(
    response: Response,
    what: &str,
    rate_limiter: &RateLimiter,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "0")
        .unwrap_or(false);

    match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if rate_exhausted => {
            Err(Error::RateLimited(rate_limiter.reset_in().unwrap_or(60)))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited(60)),
        // 409 is returned for trees and contents of empty repositories
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::CONFLICT => {
            Err(Error::NotFound(what.to_string()))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(Error::GitHubApi(format!(
                "Request for {} failed: {} - {}",
                what, status, body
            )))
        }
    }
}

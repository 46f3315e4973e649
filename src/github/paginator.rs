use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::github::client::ensure_success;
use crate::github::rate_limiter::RateLimiter;

/// Follows `Link: rel="next"` headers until a collection is exhausted.
pub struct Paginator<'a> {
    client: &'a Client,
    rate_limiter: &'a RateLimiter,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a Client, rate_limiter: &'a RateLimiter) -> Self {
        Self {
            client,
            rate_limiter,
        }
    }

    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        base_url: &str,
        per_page: u32,
    ) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut page = 1;

        loop {
            self.rate_limiter.wait().await;

            let separator = if base_url.contains('?') { "&" } else { "?" };
            let url = format!("{}{}per_page={}&page={}", base_url, separator, per_page, page);

            tracing::debug!("Fetching: {}", url);
            let response = self.client.get(&url).send().await?;
            self.rate_limiter.update_from_response(&response);

            // Empty repositories answer some collection endpoints with 204
            if response.status() == StatusCode::NO_CONTENT {
                break;
            }
            let response = ensure_success(response, base_url, self.rate_limiter).await?;

            let has_next = response
                .headers()
                .get("link")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.contains("rel=\"next\""))
                .unwrap_or(false);

            let body = response.text().await?;
            let items: Vec<T> = serde_json::from_str(&body)?;
            let items_count = items.len();
            all_items.extend(items);

            if !has_next || items_count < per_page as usize {
                break;
            }

            page += 1;
        }

        Ok(all_items)
    }
}

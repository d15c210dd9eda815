//! Admin API client: one GraphQL list query per fetch.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::shopify::errors::UpstreamError;
use crate::shopify::json::parse_json_with_context;
use crate::shopify::middleware::TransactionLogMiddleware;
use crate::shopify::query::{build_request, extract_records};
use crate::sync::entity::EntityType;
use crate::sync::fetcher::UpstreamSource;

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Longest error body kept in [`UpstreamError::Status`].
const MAX_ERROR_BODY: usize = 512;

pub struct AdminApi {
    http: ClientWithMiddleware,
    url: String,
    access_token: String,
    limiter: DefaultDirectRateLimiter,
}

impl AdminApi {
    pub fn new(
        url: String,
        access_token: String,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let http = ClientBuilder::new(client)
            .with(TransactionLogMiddleware)
            .build();
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            url,
            access_token,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }

    async fn post(&self, payload: &impl serde::Serialize) -> Result<Value, UpstreamError> {
        self.limiter.until_ready().await;

        let response = self
            .http
            .post(&self.url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        parse_json_with_context(&body).map_err(|source| UpstreamError::ParseFailed {
            url: self.url.clone(),
            source,
        })
    }
}

#[async_trait]
impl UpstreamSource for AdminApi {
    async fn fetch_records(
        &self,
        entity_type: EntityType,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let descriptor = entity_type.descriptor();
        let request = build_request(descriptor, limit);
        debug!(%entity_type, limit, "querying upstream");
        let body = self.post(&request).await?;
        extract_records(descriptor, body)
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn zero_rate_limit_still_builds() {
        let api = AdminApi::new(
            "http://localhost:9/graphql".into(),
            "token".into(),
            Duration::from_secs(1),
            0,
        );
        assert!(api.is_ok());
    }
}

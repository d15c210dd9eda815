//! HTTP middleware for the Admin API client.

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::time::Instant;
use tracing::{trace, warn};

use crate::utils::fmt_duration;

/// Logs every upstream request at trace level and non-success responses as warnings.
pub struct TransactionLogMiddleware;

#[async_trait::async_trait]
impl Middleware for TransactionLogMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        let start = Instant::now();

        let response = next.run(req, extensions).await;
        let duration = fmt_duration(start.elapsed());

        match &response {
            Ok(resp) if resp.status().is_success() => {
                trace!(%method, path = url.path(), status = resp.status().as_u16(), duration, "upstream request");
            }
            Ok(resp) => {
                warn!(%method, path = url.path(), status = resp.status().as_u16(), duration, "upstream request returned error status");
            }
            Err(e) => {
                warn!(%method, path = url.path(), error = %e, duration, "upstream request failed");
            }
        }

        response
    }
}

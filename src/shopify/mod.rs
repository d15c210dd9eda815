//! Client for the commerce platform's GraphQL Admin API.

pub mod api;
pub mod errors;
pub mod ids;
pub mod json;
pub mod middleware;
pub mod query;

pub use api::AdminApi;
pub use errors::UpstreamError;

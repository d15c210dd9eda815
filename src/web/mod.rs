//! HTTP surface: sync triggers, status and health.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod status;
pub mod sync;

pub use routes::*;

//! Mirror commerce-platform entities (products, collections, customers,
//! orders, promotions) into a local Postgres store.

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod fmt;
pub mod logging;
pub mod shopify;
pub mod state;
pub mod sync;
pub mod utils;
pub mod web;

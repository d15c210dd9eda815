//! Application state shared across the web server and the CLI runner.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::data::store::{EntityStore, SyncLogSink};
use crate::sync::SyncRunner;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<SyncRunner>,
    pub store: Arc<dyn EntityStore>,
    pub logs: Arc<dyn SyncLogSink>,
    /// Cancelled on shutdown; in-flight runs stop at the next item boundary.
    pub shutdown: CancellationToken,
    /// Default page size for triggers that don't pass `limit`.
    pub page_size: u32,
}

impl AppState {
    pub fn new(
        runner: Arc<SyncRunner>,
        store: Arc<dyn EntityStore>,
        logs: Arc<dyn SyncLogSink>,
        shutdown: CancellationToken,
    ) -> Self {
        let page_size = runner.settings().page_size;
        Self {
            runner,
            store,
            logs,
            shutdown,
            page_size,
        }
    }
}

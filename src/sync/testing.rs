//! Scripted upstream used by engine and web tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::shopify::UpstreamError;
use crate::sync::entity::EntityType;
use crate::sync::fetcher::UpstreamSource;

#[derive(Debug, Clone)]
enum Script {
    Records(Vec<Value>),
    Fail(String),
}

/// Returns whatever was last scripted per entity type; unscripted types yield
/// an empty page.
#[derive(Default)]
pub(crate) struct FakeUpstream {
    scripts: Mutex<HashMap<EntityType, Script>>,
    calls: Mutex<HashMap<EntityType, (usize, u32)>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, entity_type: EntityType, records: Vec<Value>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(entity_type, Script::Records(records));
    }

    pub fn fail(&self, entity_type: EntityType, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(entity_type, Script::Fail(message.to_owned()));
    }

    /// Hold every response for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, entity_type: EntityType) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&entity_type)
            .map_or(0, |(n, _)| *n)
    }

    pub fn last_limit(&self, entity_type: EntityType) -> Option<u32> {
        self.calls
            .lock()
            .unwrap()
            .get(&entity_type)
            .map(|(_, limit)| *limit)
    }
}

#[async_trait]
impl UpstreamSource for FakeUpstream {
    async fn fetch_records(
        &self,
        entity_type: EntityType,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(entity_type).or_insert((0, limit));
            entry.0 += 1;
            entry.1 = limit;
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.scripts.lock().unwrap().get(&entity_type).cloned();
        match script {
            None => Ok(Vec::new()),
            Some(Script::Records(records)) => {
                Ok(records.into_iter().take(limit as usize).collect())
            }
            Some(Script::Fail(message)) => Err(UpstreamError::Graphql(message)),
        }
    }
}

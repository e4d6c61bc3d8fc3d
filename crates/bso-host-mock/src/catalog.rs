// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Scripted catalog host

use async_trait::async_trait;
use bso_host_api::{CatalogHost, CatalogResponse, EntityKey, HostError, HostResult};
use serde::Deserialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct CatalogState {
    registered: BTreeSet<EntityKey>,
    script: VecDeque<HostResult<u16>>,
    submissions: Vec<String>,
}

/// Catalog fake
///
/// Without a script, a submission registers every entity of the descriptor
/// and answers 201, or 409 when all of them were already registered. Scripted
/// answers are consumed first, one per submission.
#[derive(Debug)]
pub struct ScriptedCatalog {
    endpoint: String,
    state: Mutex<CatalogState>,
}

impl Default for ScriptedCatalog {
    fn default() -> Self {
        Self::new("https://backstage.test")
    }
}

impl ScriptedCatalog {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            state: Mutex::new(CatalogState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, key: EntityKey) {
        self.lock().registered.insert(key);
    }

    /// Queue an HTTP status for the next submission
    pub fn script_status(&self, status: u16) {
        self.lock().script.push_back(Ok(status));
    }

    /// Queue a transport-level failure for the next submission
    pub fn script_error(&self, error: HostError) {
        self.lock().script.push_back(Err(error));
    }

    pub fn is_registered(&self, key: &EntityKey) -> bool {
        self.lock().registered.contains(key)
    }

    pub fn registered(&self) -> Vec<EntityKey> {
        self.lock().registered.iter().cloned().collect()
    }

    pub fn submissions(&self) -> Vec<String> {
        self.lock().submissions.clone()
    }
}

#[derive(Deserialize)]
struct Metadata {
    name: String,
    namespace: Option<String>,
}

#[derive(Deserialize)]
struct Entity {
    kind: String,
    metadata: Metadata,
}

fn entity_keys(yaml: &str) -> Vec<EntityKey> {
    serde_yaml::Deserializer::from_str(yaml)
        .filter_map(|doc| Entity::deserialize(doc).ok())
        .map(|e| {
            EntityKey::new(
                e.kind,
                e.metadata.namespace.unwrap_or_else(|| "default".to_string()),
                e.metadata.name,
            )
        })
        .collect()
}

#[async_trait]
impl CatalogHost for ScriptedCatalog {
    async fn submit_descriptor(&self, descriptor_yaml: &str) -> HostResult<CatalogResponse> {
        let mut state = self.lock();
        state.submissions.push(descriptor_yaml.to_string());
        let keys = entity_keys(descriptor_yaml);

        let status = match state.script.pop_front() {
            Some(scripted) => scripted?,
            None if !keys.is_empty() && keys.iter().all(|k| state.registered.contains(k)) => 409,
            None => 201,
        };
        if status == 200 || status == 201 {
            state.registered.extend(keys);
        }
        Ok(CatalogResponse {
            status,
            body: String::new(),
        })
    }

    async fn entity_exists(&self, key: &EntityKey) -> HostResult<bool> {
        Ok(self.lock().registered.contains(key))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = "apiVersion: backstage.io/v1alpha1\nkind: Component\nmetadata:\n  name: widgets\n---\napiVersion: backstage.io/v1alpha1\nkind: API\nmetadata:\n  name: widgets-api\n";

    #[tokio::test]
    async fn test_repeat_submission_answers_conflict() {
        let catalog = ScriptedCatalog::default();
        let first = catalog.submit_descriptor(DESCRIPTOR).await.unwrap();
        assert_eq!(first.status, 201);
        assert!(catalog.is_registered(&EntityKey::new("API", "default", "widgets-api")));

        let second = catalog.submit_descriptor(DESCRIPTOR).await.unwrap();
        assert_eq!(second.status, 409);
        assert_eq!(catalog.registered().len(), 2);
    }

    #[tokio::test]
    async fn test_script_is_consumed_first() {
        let catalog = ScriptedCatalog::default();
        catalog.script_status(503);
        catalog.script_error(HostError::Transport("reset".into()));
        assert_eq!(catalog.submit_descriptor(DESCRIPTOR).await.unwrap().status, 503);
        assert!(catalog.submit_descriptor(DESCRIPTOR).await.is_err());
        assert_eq!(catalog.submit_descriptor(DESCRIPTOR).await.unwrap().status, 201);
        assert_eq!(catalog.submissions().len(), 3);
    }
}

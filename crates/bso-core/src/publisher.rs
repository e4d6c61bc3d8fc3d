// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Catalog Publisher
//!
//! Registers a merged descriptor with the catalog host. A descriptor that
//! fails the client-side schema check is never sent. An "already exists"
//! answer counts as success, so publishing the same descriptor twice is
//! harmless.

use crate::config::RetryPolicy;
use crate::error::PublishError;
use crate::scanner::wait_for_reset;
use crate::schema::validate_descriptor_yaml;
use bso_host_api::{CatalogHost, HostError};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishOutcome {
    Registered,
    /// The catalog already knew the location (HTTP 409)
    AlreadyRegistered,
}

pub struct CatalogPublisher {
    catalog: Arc<dyn CatalogHost>,
    retry: RetryPolicy,
}

impl CatalogPublisher {
    pub fn new(catalog: Arc<dyn CatalogHost>, retry: RetryPolicy) -> Self {
        Self { catalog, retry }
    }

    /// Submit `yaml` for registration
    ///
    /// 5xx answers and transport failures are retried with exponential
    /// backoff; other client errors fail immediately.
    #[tracing::instrument(skip(self, yaml))]
    pub async fn publish(&self, yaml: &str) -> Result<PublishOutcome, PublishError> {
        let keys = validate_descriptor_yaml(yaml)?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_status = None;
        let mut detail = String::new();

        for attempt in 1..=max_attempts {
            match self.catalog.submit_descriptor(yaml).await {
                Ok(response) => match response.status {
                    200 | 201 => {
                        tracing::info!(entities = keys.len(), "Registered descriptor");
                        return Ok(PublishOutcome::Registered);
                    }
                    409 => {
                        tracing::info!("Descriptor already registered");
                        return Ok(PublishOutcome::AlreadyRegistered);
                    }
                    status if status >= 500 => {
                        last_status = Some(status);
                        detail = format!("HTTP {}: {}", status, response.body);
                    }
                    status => {
                        return Err(PublishError::Rejected {
                            status,
                            body: response.body,
                        });
                    }
                },
                Err(HostError::RateLimited { reset_at }) => {
                    detail = "rate limited".to_string();
                    wait_for_reset(reset_at).await;
                    continue;
                }
                Err(e) if e.is_transient() => {
                    if let HostError::Http { status, .. } = &e {
                        last_status = Some(*status);
                    }
                    detail = e.to_string();
                }
                Err(e) => return Err(PublishError::Host(e)),
            }

            if attempt < max_attempts {
                let delay = self.retry.backoff_for(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, detail = %detail, "Catalog submission failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        Err(PublishError::Exhausted {
            attempts: max_attempts,
            last_status,
            detail,
        })
    }
}

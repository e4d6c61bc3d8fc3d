// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Backstage catalog API client

use bso_host_api::{CatalogResponse, EntityKey};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, StatusCode};
use url::Url;

use crate::auth::AuthConfig;
use crate::error::{RestClientError, RestClientResult};

const USER_AGENT: &str = "Backstage-Automation";

/// Client for the catalog endpoints of a Backstage instance
#[derive(Debug, Clone)]
pub struct BackstageClient {
    http_client: HttpClient,
    base_url: Url,
    auth: AuthConfig,
}

impl BackstageClient {
    pub fn new(base_url: Url, auth: AuthConfig) -> RestClientResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http_client,
            base_url,
            auth,
        })
    }

    pub fn from_url(base_url: &str, auth: AuthConfig) -> RestClientResult<Self> {
        Self::new(Url::parse(base_url)?, auth)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn locations_url(&self) -> RestClientResult<Url> {
        Ok(self.base_url.join("/api/catalog/locations")?)
    }

    fn entity_url(&self, key: &EntityKey) -> RestClientResult<Url> {
        let path = format!(
            "/api/catalog/entities/by-name/{}/{}/{}",
            key.kind.to_ascii_lowercase(),
            key.namespace,
            key.name
        );
        Ok(self.base_url.join(&path)?)
    }

    /// POST the descriptor YAML; every HTTP answer is returned as-is
    pub async fn register(&self, descriptor_yaml: &str) -> RestClientResult<CatalogResponse> {
        let url = self.locations_url()?;
        let response = self
            .http_client
            .post(url.clone())
            .headers(self.auth.headers()?)
            .header(CONTENT_TYPE, "application/yaml")
            .body(descriptor_yaml.to_string())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(url = %url, status, "Catalog registration answered");
        Ok(CatalogResponse { status, body })
    }

    pub async fn exists(&self, key: &EntityKey) -> RestClientResult<bool> {
        let url = self.entity_url(key)?;
        let response = self
            .http_client
            .get(url)
            .headers(self.auth.headers()?)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(RestClientError::Status {
                status,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locations_url() {
        let client =
            BackstageClient::from_url("https://backstage.example.com", AuthConfig::none()).unwrap();
        assert_eq!(
            client.locations_url().unwrap().as_str(),
            "https://backstage.example.com/api/catalog/locations"
        );
    }

    #[test]
    fn test_entity_url_lowercases_kind() {
        let client =
            BackstageClient::from_url("https://backstage.example.com/", AuthConfig::none()).unwrap();
        let url = client
            .entity_url(&EntityKey::new("Component", "default", "widgets"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://backstage.example.com/api/catalog/entities/by-name/component/default/widgets"
        );
    }
}

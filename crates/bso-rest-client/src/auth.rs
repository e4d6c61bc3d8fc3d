// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Authorization header handling

use crate::error::{RestClientError, RestClientResult};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

/// Scheme used when none is configured
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Token and scheme sent as `Authorization: <scheme> <token>`
#[derive(Clone, Default)]
pub struct AuthConfig {
    scheme: Option<String>,
    token: Option<String>,
}

impl AuthConfig {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::with_scheme(DEFAULT_TOKEN_TYPE, token)
    }

    pub fn with_scheme(scheme: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            scheme: Some(scheme.into()),
            token: Some(token.into()),
        }
    }

    /// No authorization header at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn headers(&self) -> RestClientResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let scheme = self.scheme.as_deref().unwrap_or(DEFAULT_TOKEN_TYPE);
            let mut value = HeaderValue::from_str(&format!("{} {}", scheme, token))
                .map_err(|e| RestClientError::Auth(format!("invalid token characters: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("scheme", &self.scheme)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_scheme_header() {
        let auth = AuthConfig::with_scheme("Token", "abc");
        let headers = auth.headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap().to_str().unwrap(), "Token abc");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn test_no_token_no_header() {
        assert!(AuthConfig::none().headers().unwrap().is_empty());
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", AuthConfig::bearer("ghp_secret"));
        assert!(!rendered.contains("ghp_secret"));
    }
}

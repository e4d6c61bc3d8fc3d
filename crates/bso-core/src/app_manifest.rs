// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! GitHub App manifest for running the automation as an app

use serde::Serialize;
use std::collections::BTreeMap;

pub const WEBHOOK_PATH: &str = "/api/github/webhook";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookAttributes {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppManifest {
    pub name: String,
    pub url: String,
    pub hook_attributes: HookAttributes,
    pub permissions: BTreeMap<String, String>,
    pub events: Vec<String>,
}

impl AppManifest {
    /// Manifest with the permissions the engine needs
    ///
    /// `administration: write` is what lets force-merge lift branch protection.
    pub fn new(name: &str, webhook_url: &str) -> Self {
        let base = webhook_url.trim_end_matches('/');
        let permissions = [
            ("contents", "write"),
            ("metadata", "read"),
            ("pull_requests", "write"),
            ("issues", "write"),
            ("administration", "write"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            name: name.to_string(),
            url: base.to_string(),
            hook_attributes: HookAttributes {
                url: format!("{}{}", base, WEBHOOK_PATH),
            },
            permissions,
            events: ["issues", "issue_comment", "pull_request"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

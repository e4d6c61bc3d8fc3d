// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Catalog descriptor model and generator
//!
//! [`generate`] turns [`RepoFacts`] into a [`CatalogDescriptor`] and its YAML
//! form. Generation is pure: identical facts always give byte-identical YAML,
//! which is what makes hash comparison against an existing descriptor
//! meaningful.

use crate::config::EngineSettings;
use crate::error::ValidationError;
use crate::facts::{ApiSpecFile, RepoFacts};
use bso_host_api::EntityKey;
use chrono::Duration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

pub const API_VERSION: &str = "backstage.io/v1alpha1";

/// Separator between documents of a multi-entity descriptor
pub const DOCUMENT_SEPARATOR: &str = "\n---\n";

/// Longest entity name the catalog accepts
pub const MAX_NAME_LEN: usize = 63;

/// Repositories younger than this are `experimental`
const EXPERIMENTAL_AGE_DAYS: i64 = 90;
/// Commit count above which an unprotected repository is `production`
const PRODUCTION_COMMITS: u64 = 100;

const SERVICE_MARKERS: [&str; 5] = [
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "k8s",
    "kubernetes",
];
const WEBSITE_MARKERS: [&str; 2] = ["package.json", "index.html"];
const LIBRARY_MARKERS: [&str; 4] = ["setup.py", "composer.json", "go.mod", "Cargo.toml"];

pub mod annotations {
    pub const PROJECT_SLUG: &str = "github.com/project-slug";
    pub const PROJECT_VISIBILITY: &str = "github.com/project-visibility";
    pub const SOURCE_LOCATION: &str = "backstage.io/source-location";
    pub const TECHDOCS_REF: &str = "backstage.io/techdocs-ref";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum EntityKind {
    Component,
    #[serde(rename = "API")]
    Api,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Component => "Component",
            EntityKind::Api => "API",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityMetadata {
    #[schemars(length(min = 1, max = 63))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// API definition kept out of line, resolved by the catalog relative to the descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiDefinition {
    #[serde(rename = "$text")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntitySpec {
    #[serde(rename = "type")]
    #[schemars(length(min = 1))]
    pub entity_type: String,
    #[schemars(length(min = 1))]
    pub lifecycle: String,
    #[schemars(length(min = 1))]
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides_apis: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<ApiDefinition>,
}

/// One catalog entity document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[schemars(regex(pattern = r"^backstage\.io/v1(alpha1|beta1)?$"))]
    pub api_version: String,
    pub kind: EntityKind,
    pub metadata: EntityMetadata,
    pub spec: EntitySpec,
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(
            self.kind.as_str(),
            self.metadata.namespace.as_deref().unwrap_or("default"),
            &self.metadata.name,
        )
    }
}

/// The Component entity of a repository plus its API entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDescriptor {
    pub component: Entity,
    pub apis: Vec<Entity>,
}

impl CatalogDescriptor {
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        std::iter::once(&self.component).chain(self.apis.iter())
    }

    pub fn keys(&self) -> Vec<EntityKey> {
        self.entities().map(Entity::key).collect()
    }

    /// Whether the repository exposes at least one API
    pub fn is_api_bearing(&self) -> bool {
        !self.apis.is_empty()
    }

    /// Multi-document YAML, component first
    pub fn to_yaml(&self) -> Result<String, ValidationError> {
        let mut docs = Vec::with_capacity(1 + self.apis.len());
        for entity in self.entities() {
            let doc = serde_yaml::to_string(entity).map_err(|e| ValidationError::Yaml(e.to_string()))?;
            docs.push(doc.trim_end().to_string());
        }
        let mut out = docs.join(DOCUMENT_SEPARATOR);
        out.push('\n');
        Ok(out)
    }
}

/// A descriptor together with its serialized form and hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDescriptor {
    pub descriptor: CatalogDescriptor,
    pub yaml: String,
    pub content_hash: String,
}

impl GeneratedDescriptor {
    pub fn name(&self) -> &str {
        &self.descriptor.component.metadata.name
    }

    /// Whether `existing` has the same content
    pub fn matches(&self, existing: &str) -> bool {
        content_hash(existing) == self.content_hash
    }
}

/// Lowercase hex SHA-256 of descriptor content
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Normalize a string to the catalog's entity-name rules
///
/// Runs of `[a-z0-9]` joined by single `-`, `_` or `.`, at most 63 chars.
pub fn entity_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep: Option<char> = None;
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if let Some(sep) = pending_sep.take() {
                if !out.is_empty() {
                    out.push(sep);
                }
            }
            out.push(c);
        } else if pending_sep.is_none() {
            pending_sep = Some(if matches!(c, '-' | '_' | '.') { c } else { '-' });
        }
    }
    if out.len() > MAX_NAME_LEN {
        out.truncate(MAX_NAME_LEN);
        while out.ends_with(['-', '_', '.']) {
            out.pop();
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Tag form of a free-text label
fn tag(raw: &str) -> Option<String> {
    let tag: String = raw
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    (!tag.is_empty()).then_some(tag)
}

fn component_type(facts: &RepoFacts) -> &'static str {
    let any = |markers: &[&str]| markers.iter().any(|m| facts.has_root_entry(m));
    if any(&SERVICE_MARKERS) {
        "service"
    } else if any(&WEBSITE_MARKERS) {
        "website"
    } else if any(&LIBRARY_MARKERS) {
        "library"
    } else {
        "service"
    }
}

fn lifecycle(facts: &RepoFacts) -> &'static str {
    let repo = &facts.repository;
    if repo.archived {
        "deprecated"
    } else if facts.default_branch_protected {
        "production"
    } else if facts.as_of - repo.created_at < Duration::days(EXPERIMENTAL_AGE_DAYS) {
        "experimental"
    } else if facts.commit_count > PRODUCTION_COMMITS {
        "production"
    } else {
        "development"
    }
}

fn owner(facts: &RepoFacts, settings: &EngineSettings) -> Result<String, ValidationError> {
    if let Some(team) = &facts.codeowners_team {
        return Ok(team.clone());
    }
    if let Some(team) = &facts.contributor_team {
        return Ok(team.clone());
    }
    if let Some(login) = &facts.top_contributor {
        return Ok(format!("user:{}", login));
    }
    settings
        .default_owner
        .clone()
        .filter(|o| !o.trim().is_empty())
        .ok_or_else(|| ValidationError::MissingOwner(facts.repository.full_name()))
}

fn api_names(component: &str, count: usize) -> Vec<String> {
    if count == 1 {
        return vec![suffixed(component, "-api")];
    }
    (1..=count)
        .map(|n| suffixed(component, &format!("-api-{}", n)))
        .collect()
}

/// `base` + `suffix`, shortening `base` so the result stays a valid name
fn suffixed(base: &str, suffix: &str) -> String {
    let room = MAX_NAME_LEN.saturating_sub(suffix.len());
    let mut head = base[..base.len().min(room)].to_string();
    while head.ends_with(['-', '_', '.']) {
        head.pop();
    }
    format!("{}{}", head, suffix)
}

fn api_entity(
    name: String,
    spec: &ApiSpecFile,
    facts: &RepoFacts,
    component: &Entity,
) -> Entity {
    let repo = &facts.repository;
    let mut annotations = BTreeMap::new();
    annotations.insert(annotations::PROJECT_SLUG.to_string(), repo.full_name());
    annotations.insert(
        annotations::SOURCE_LOCATION.to_string(),
        format!("url:{}/blob/{}/{}", repo.html_url, repo.default_branch, spec.path),
    );
    Entity {
        api_version: API_VERSION.to_string(),
        kind: EntityKind::Api,
        metadata: EntityMetadata {
            name,
            namespace: component.metadata.namespace.clone(),
            description: Some(format!("{} API for {}", spec.kind.as_str(), repo.name)),
            annotations,
            tags: Vec::new(),
        },
        spec: EntitySpec {
            entity_type: spec.kind.as_str().to_string(),
            lifecycle: component.spec.lifecycle.clone(),
            owner: component.spec.owner.clone(),
            system: component.spec.system.clone(),
            provides_apis: Vec::new(),
            definition: Some(ApiDefinition {
                text: format!("./{}", spec.path),
            }),
        },
    }
}

/// Build the descriptor of a repository
///
/// Fails with [`ValidationError`] when no entity name or owner can be derived.
pub fn generate(
    facts: &RepoFacts,
    settings: &EngineSettings,
) -> Result<GeneratedDescriptor, ValidationError> {
    let repo = &facts.repository;
    let name = entity_name(&repo.name).ok_or_else(|| ValidationError::MissingName(repo.name.clone()))?;
    let owner = owner(facts, settings)?;

    let mut annotations = BTreeMap::new();
    annotations.insert(annotations::PROJECT_SLUG.to_string(), repo.full_name());
    annotations.insert(
        annotations::PROJECT_VISIBILITY.to_string(),
        if repo.private { "private" } else { "public" }.to_string(),
    );
    annotations.insert(
        annotations::SOURCE_LOCATION.to_string(),
        format!("url:{}", repo.html_url),
    );
    if facts.has_docs() {
        annotations.insert(annotations::TECHDOCS_REF.to_string(), "dir:.".to_string());
    }

    let tags: BTreeSet<String> = repo
        .language
        .iter()
        .chain(repo.topics.iter())
        .filter_map(|t| tag(t))
        .collect();

    let system = repo
        .topics
        .first()
        .and_then(|t| entity_name(t))
        .unwrap_or_else(|| settings.default_system.clone());

    let namespace = (settings.namespace != "default").then(|| settings.namespace.clone());

    let mut component = Entity {
        api_version: API_VERSION.to_string(),
        kind: EntityKind::Component,
        metadata: EntityMetadata {
            name: name.clone(),
            namespace,
            description: Some(
                repo.description
                    .clone()
                    .unwrap_or_else(|| format!("Auto-generated component for {}", repo.name)),
            ),
            annotations,
            tags: tags.into_iter().collect(),
        },
        spec: EntitySpec {
            entity_type: component_type(facts).to_string(),
            lifecycle: lifecycle(facts).to_string(),
            owner,
            system: Some(system),
            provides_apis: Vec::new(),
            definition: None,
        },
    };

    let names = api_names(&name, facts.api_specs.len());
    let apis: Vec<Entity> = names
        .into_iter()
        .zip(facts.api_specs.iter())
        .map(|(api_name, spec)| api_entity(api_name, spec, facts, &component))
        .collect();
    component.spec.provides_apis = apis.iter().map(|a| a.metadata.name.clone()).collect();

    let descriptor = CatalogDescriptor { component, apis };
    let yaml = descriptor.to_yaml()?;
    let content_hash = content_hash(&yaml);
    Ok(GeneratedDescriptor {
        descriptor,
        yaml,
        content_hash,
    })
}

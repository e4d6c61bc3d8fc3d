// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Client-side check of descriptor documents against the entity schema

use crate::descriptor::Entity;
use crate::error::ValidationError;
use bso_host_api::EntityKey;
use serde::Deserialize;
use std::sync::OnceLock;

fn compiled_schema() -> Result<&'static jsonschema::JSONSchema, ValidationError> {
    use schemars::schema_for;

    static COMPILED_SCHEMA: OnceLock<std::result::Result<jsonschema::JSONSchema, String>> =
        OnceLock::new();

    let compiled = COMPILED_SCHEMA.get_or_init(|| {
        let schema = schema_for!(Entity);
        let schema_json = serde_json::to_value(&schema)
            .map_err(|e| format!("Failed to serialize schema: {}", e))?;
        jsonschema::JSONSchema::compile(&schema_json)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    compiled
        .as_ref()
        .map_err(|err| ValidationError::Schema(format!("schema compilation failed: {}", err)))
}

/// Validate every document of a descriptor and return the entity keys it declares
pub fn validate_descriptor_yaml(yaml: &str) -> Result<Vec<EntityKey>, ValidationError> {
    let schema = compiled_schema()?;
    let mut keys = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let value = serde_json::Value::deserialize(document)
            .map_err(|e| ValidationError::Yaml(format!("document {}: {}", index + 1, e)))?;
        if value.is_null() {
            continue;
        }

        if let Err(errors) = schema.validate(&value) {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(ValidationError::Schema(format!(
                "document {}: {}",
                index + 1,
                messages.join(", ")
            )));
        }

        let entity: Entity = serde_json::from_value(value)
            .map_err(|e| ValidationError::Schema(format!("document {}: {}", index + 1, e)))?;
        keys.push(entity.key());
    }

    if keys.is_empty() {
        return Err(ValidationError::Empty);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::descriptor::generate;
    use crate::facts::{ApiKind, ApiSpecFile, RepoFacts};
    use bso_host_api::Repository;
    use chrono::{TimeZone, Utc};

    fn generated_yaml() -> String {
        let repository = Repository {
            owner: "acme".into(),
            name: "widgets".into(),
            default_branch: "main".into(),
            description: None,
            language: None,
            topics: vec![],
            archived: false,
            private: false,
            html_url: "https://github.com/acme/widgets".into(),
            homepage: None,
            stargazers_count: 0,
            forks_count: 0,
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            pushed_at: None,
        };
        let mut facts = RepoFacts::bare(repository, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        facts.codeowners_team = Some("acme/core".into());
        facts.api_specs = vec![ApiSpecFile {
            path: "openapi.yaml".into(),
            kind: ApiKind::OpenApi,
        }];
        generate(&facts, &EngineSettings::default()).unwrap().yaml
    }

    #[test]
    fn test_generated_descriptor_passes() {
        let keys = validate_descriptor_yaml(&generated_yaml()).unwrap();
        assert_eq!(
            keys,
            vec![
                EntityKey::new("Component", "default", "widgets"),
                EntityKey::new("API", "default", "widgets-api"),
            ]
        );
    }

    #[test]
    fn test_missing_owner_is_rejected() {
        let yaml = "apiVersion: backstage.io/v1alpha1\nkind: Component\nmetadata:\n  name: widgets\nspec:\n  type: service\n  lifecycle: production\n";
        assert!(matches!(validate_descriptor_yaml(yaml), Err(ValidationError::Schema(_))));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let yaml = "apiVersion: backstage.io/v1alpha1\nkind: Group\nmetadata:\n  name: team\nspec:\n  type: team\n  lifecycle: production\n  owner: me\n";
        assert!(matches!(validate_descriptor_yaml(yaml), Err(ValidationError::Schema(_))));
    }

    #[test]
    fn test_broken_yaml_and_empty_input() {
        assert!(matches!(
            validate_descriptor_yaml("kind: [unclosed"),
            Err(ValidationError::Yaml(_))
        ));
        assert_eq!(validate_descriptor_yaml(""), Err(ValidationError::Empty));
    }
}

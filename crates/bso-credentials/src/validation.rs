// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Validation routines for organization names used as vault file names

use crate::error::{Error, Result};
use regex::Regex;

/// Validate an organization name
///
/// Organization logins are 1-39 characters of alphanumerics and single
/// hyphens, and may not start or end with a hyphen. Anything else could
/// escape the storage directory once used as a file name.
pub fn validate_org_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidOrgName(
            "organization name cannot be empty".to_string(),
        ));
    }

    if name.len() > 39 {
        return Err(Error::InvalidOrgName(format!(
            "organization name cannot be longer than 39 characters: {}",
            name
        )));
    }

    static NAME_REGEX: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let regex = NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]+(?:-[a-zA-Z0-9]+)*$").expect("static regex is valid")
    });

    if !regex.is_match(name) {
        return Err(Error::InvalidOrgName(format!(
            "organization name must contain only alphanumerics and single hyphens: {}",
            name
        )));
    }

    Ok(())
}

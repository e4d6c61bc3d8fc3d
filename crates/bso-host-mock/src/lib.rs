// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory implementations of the host capabilities
//!
//! [`InMemoryScm`] behaves like a small GitHub: branches carry files, pull
//! requests merge head files into the base branch, protected branches refuse
//! merges. [`ScriptedCatalog`] remembers registered entities and answers 409
//! for repeated registrations. Both record every call and accept one-shot
//! injected faults so tests can exercise failure paths.

pub mod catalog;
pub mod scm;

pub use catalog::ScriptedCatalog;
pub use scm::{Call, InMemoryScm, sample_repository};

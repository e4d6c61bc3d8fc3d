// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Onboarding engine for the Backstage catalog.
//!
//! The engine decides, for every repository of an organization, which catalog
//! action is needed and performs it idempotently against the source-control
//! host and the catalog host. Both hosts are injected as capability traits
//! from `bso-host-api`; they are the only system of record, so every run
//! re-derives repository state from live queries.
//!
//! Control flow per repository: [`scanner`] classifies, [`descriptor`]
//! generates, [`proposer`] opens or updates the onboarding pull request,
//! [`publisher`] registers merged descriptors, and [`report`] aggregates the
//! outcome. [`canary`] gates scheduled runs; [`force_merge`] is an independent
//! side channel triggered from tracking-issue comments.

pub mod app_manifest;
pub mod canary;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod facts;
pub mod force_merge;
pub mod priority;
pub mod proposer;
pub mod publisher;
pub mod report;
pub mod scanner;
pub mod schema;

pub use canary::{CanaryGate, CanaryStatus, GateState};
pub use config::{EngineConfig, EngineSettings, RetryPolicy};
pub use descriptor::{CatalogDescriptor, GeneratedDescriptor, generate};
pub use engine::{Engine, RunMode, RunOutcome, RunSummary};
pub use error::{
    EngineError, ForceMergeError, ProposeError, PublishError, Result, ScanError, ValidationError,
};
pub use force_merge::{ForceMergeHandler, ForceMergeOutcome, ForceMergeReport, ForceMergeRequest};
pub use proposer::{ChangeProposer, ProposeOutcome};
pub use publisher::{CatalogPublisher, PublishOutcome};
pub use report::{ReportGroup, StatusReport};
pub use scanner::{RepoState, RepositoryRecord, RepositoryScanner};

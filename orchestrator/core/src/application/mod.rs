// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod deployment;
pub mod environment;
pub mod manifest_builder;

// Re-export use cases for convenience
pub use deployment::{
    ApplyReport, AppliedArtifact, ArtifactKind, DeployError, DeploymentPlan, Deployer,
};
pub use manifest_builder::ManifestBuilder;

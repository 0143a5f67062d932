// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Telestack core
//!
//! Deterministic secret derivation, host provisioning and manifest
//! composition for a single-host TeslaMate stack (database, application,
//! dashboard).
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain types, plan/apply use cases and host adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;

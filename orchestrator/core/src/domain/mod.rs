// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model
//!
//! Value types, invariants and the traits host adapters implement.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and seams; no I/O besides config loading

pub mod change;
pub mod dependency;
pub mod env_file;
pub mod identity;
pub mod image;
pub mod manifest;
pub mod runtime;
pub mod secret;
pub mod stack_config;
pub mod state_path;

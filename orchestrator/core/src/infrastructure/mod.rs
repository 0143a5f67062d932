// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod accounts;
pub mod compose;
pub mod env_files;
pub mod host_fs;
pub mod runtime;
pub mod seed;
pub mod state_dirs;

pub use accounts::{InMemoryAccounts, SystemAccounts};
pub use compose::{ComposeDocument, ComposeFileWriter};
pub use env_files::LocalEnvFileWriter;
pub use host_fs::OwnershipMode;
pub use runtime::DockerComposeRuntime;
pub use state_dirs::LocalStatePaths;

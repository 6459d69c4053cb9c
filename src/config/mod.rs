// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod validation;
mod workspace;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, ExecutorOptions, FixtureConfig, WorkspaceConfig,
};
pub use validation::validate_workspace;
pub use workspace::{
    unqualified_input_name, ChildReference, ResourceDefinition, ResourceKind, RuntimeDependency,
    Workspace,
};

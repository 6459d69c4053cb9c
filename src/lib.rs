// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // query backends and event sinks
pub mod config;     // workspace loading + validation
pub mod engine;     // run nodes, execution trees, session registry
pub mod errors;     // error handling
pub mod observability;
pub mod traits;     // collaborator abstractions

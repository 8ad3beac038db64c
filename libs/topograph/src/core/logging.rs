// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process-wide tracing setup.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::core::error::{GraphError, Result};

/// Build the filter: `RUST_LOG` if set, otherwise `default_filter`.
pub fn env_filter(default_filter: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_filter).map_err(|e| {
            GraphError::Configuration(format!("Invalid log filter '{}': {}", default_filter, e))
        }),
    }
}

/// Install a stdout subscriber. Returns `false` if one was already set.
pub fn init(default_filter: &str) -> Result<bool> {
    let filter = env_filter(default_filter)?;
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok();
    Ok(installed)
}

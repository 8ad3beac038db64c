// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Agent and analyzer configuration.

mod topograph_config;

pub use topograph_config::{
    AgentSection, AnalyzerSection, ForwarderSection, HostSection, LoggingSection, TopographConfig,
};

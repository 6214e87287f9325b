// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Mesh reconciliation engine: drives a group of Kubernetes clusters (one
//! master, zero or more remotes) into conformance with a declarative
//! service-mesh configuration.

pub mod backoff;
pub mod charts;
pub mod config;
pub mod constants;
pub mod error;
pub mod kubernetes;
pub mod reconcilers;
pub mod test_utils;
pub mod types;

// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Reconcilers driving clusters toward the desired mesh state.

pub mod federation;
pub mod mesh;
pub mod pipeline;
pub mod status;

pub use federation::Federator;
pub use pipeline::{DesiredState, MeshReconciler, Step};

// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes primitives: generic apply/delete, namespace lifecycle, CRD
//! discovery, pod readiness, kubeconfig synthesis, and client creation.

pub mod client;
pub mod crd;
pub mod kubeconfig;
pub mod namespaces;
pub mod pods;
pub mod resources;

pub use client::connect_cluster;
pub use crd::wait_for_mesh_crd;
pub use kubeconfig::synthesize_kubeconfig;
pub use namespaces::{ensure_namespace, remove_namespace};
pub use pods::wait_for_pods_ready;
pub use resources::{apply_resource, create_if_absent, delete_resource};

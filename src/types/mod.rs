// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Cluster capability types and the mesh custom resources.

pub mod cluster;
pub mod mesh;

pub use cluster::{Cluster, ClusterGroup, ClusterRegistry, KubeCluster};
pub use mesh::{Mesh, MeshSpec, MeshStatus, OutboundTrafficPolicy, RemoteMesh, RemoteMeshSpec, RemoteMeshStatus};

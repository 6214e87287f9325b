// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Narrow cluster capability interface and the cluster group topology.

use crate::error::{MeshError, Result};
use kube::Client;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Capabilities the engine needs from one member cluster.
///
/// Deliberately narrow: identity, provenance tags, the API endpoint, and a
/// ready-made client. How the client was built (kubeconfig, token, test
/// mock) is the constructor's business.
pub trait Cluster: Send + Sync {
    fn client(&self) -> Client;
    fn id(&self) -> u32;
    fn name(&self) -> &str;
    fn organization_id(&self) -> u32;
    fn cloud(&self) -> &str;
    fn distribution(&self) -> &str;
    /// API server URL, used when synthesizing kubeconfigs for federation.
    fn api_endpoint(&self) -> &str;
}

impl fmt::Debug for dyn Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("cloud", &self.cloud())
            .finish()
    }
}

/// A concrete cluster backed by a kube client.
#[derive(Clone)]
pub struct KubeCluster {
    id: u32,
    name: String,
    organization_id: u32,
    cloud: String,
    distribution: String,
    api_endpoint: String,
    client: Client,
}

impl KubeCluster {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        name: impl Into<String>,
        organization_id: u32,
        cloud: impl Into<String>,
        distribution: impl Into<String>,
        api_endpoint: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            organization_id,
            cloud: cloud.into(),
            distribution: distribution.into(),
            api_endpoint: api_endpoint.into(),
            client,
        }
    }
}

impl Cluster for KubeCluster {
    fn client(&self) -> Client {
        self.client.clone()
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn organization_id(&self) -> u32 {
        self.organization_id
    }

    fn cloud(&self) -> &str {
        &self.cloud
    }

    fn distribution(&self) -> &str {
        &self.distribution
    }

    fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }
}

/// One master plus the current set of federated remotes.
///
/// The master is part of the group by construction and can never be absent;
/// callers still validate that the configured master ID matches before
/// mutating anything.
#[derive(Clone)]
pub struct ClusterGroup {
    master: Arc<dyn Cluster>,
    remotes: Vec<Arc<dyn Cluster>>,
}

impl ClusterGroup {
    pub fn new(master: Arc<dyn Cluster>, remotes: Vec<Arc<dyn Cluster>>) -> Result<Self> {
        if remotes.iter().any(|r| r.id() == master.id()) {
            return Err(MeshError::Validation(format!(
                "cluster {} cannot be both master and remote",
                master.id()
            )));
        }
        Ok(Self { master, remotes })
    }

    pub fn master(&self) -> &Arc<dyn Cluster> {
        &self.master
    }

    pub fn remotes(&self) -> &[Arc<dyn Cluster>] {
        &self.remotes
    }

    /// IDs of every current member, master included.
    pub fn member_ids(&self) -> BTreeSet<u32> {
        let mut ids: BTreeSet<u32> = self.remotes.iter().map(|c| c.id()).collect();
        ids.insert(self.master.id());
        ids
    }

    pub fn contains(&self, cluster_id: u32) -> bool {
        self.member_ids().contains(&cluster_id)
    }
}

/// Resolves a cluster ID back to a live cluster.
///
/// Orphan garbage collection needs to reach clusters that are no longer in
/// the desired membership, so this lookup is a separate seam from the group.
pub trait ClusterRegistry: Send + Sync {
    fn cluster_by_id(&self, cluster_id: u32) -> Result<Arc<dyn Cluster>>;
}

impl ClusterRegistry for ClusterGroup {
    fn cluster_by_id(&self, cluster_id: u32) -> Result<Arc<dyn Cluster>> {
        if self.master.id() == cluster_id {
            return Ok(Arc::clone(&self.master));
        }
        self.remotes
            .iter()
            .find(|c| c.id() == cluster_id)
            .cloned()
            .ok_or(MeshError::ClusterNotFound(cluster_id))
    }
}

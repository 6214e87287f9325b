// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Client creation for member clusters from kubeconfig files.

use crate::config::ClusterEntry;
use crate::error::{MeshError, Result};
use crate::types::cluster::KubeCluster;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tracing::{info, instrument};

/// Build a [`KubeCluster`] for one configured member by reading its
/// kubeconfig file and selecting the requested context.
#[instrument(skip(entry), fields(cluster = %entry.name))]
pub async fn connect_cluster(entry: &ClusterEntry) -> Result<KubeCluster> {
    let kubeconfig = Kubeconfig::read_from(&entry.kubeconfig).map_err(|e| {
        MeshError::Kubeconfig(format!(
            "failed to read kubeconfig {}: {e}",
            entry.kubeconfig.display()
        ))
    })?;

    let options = KubeConfigOptions {
        context: entry.context.clone(),
        ..Default::default()
    };
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| {
            MeshError::Kubeconfig(format!(
                "failed to build client config for cluster {}: {e}",
                entry.name
            ))
        })?;

    let api_endpoint = config.cluster_url.to_string();
    let client = Client::try_from(config).map_err(|e| {
        MeshError::Kubeconfig(format!(
            "failed to create client for cluster {}: {e}",
            entry.name
        ))
    })?;

    info!("connected to cluster");
    Ok(KubeCluster::new(
        entry.id,
        entry.name.clone(),
        entry.organization_id,
        entry.cloud.clone(),
        entry.distribution.clone(),
        api_endpoint,
        client,
    ))
}

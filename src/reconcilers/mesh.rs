// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Mesh custom resource reconciliation on the master cluster.

use crate::backoff::Waiter;
use crate::config::MeshConfig;
use crate::constants::namespaces;
use crate::error::{MeshError, Result};
use crate::kubernetes::resources::{apply_resource, delete_resource, is_gone};
use crate::types::cluster::Cluster;
use crate::types::mesh::{provenance_labels, Mesh, MeshSpec, OutboundTrafficPolicy};
use kube::api::Api;
use kube::Client;
use tracing::{info, instrument};

/// Derive the desired mesh spec from the configuration and live topology.
///
/// Mesh expansion requires mutual TLS and control-plane security, so the
/// presence of remote clusters forces all three on regardless of the
/// configured mTLS flag.
pub fn desired_mesh(config: &MeshConfig, cluster: &dyn Cluster, remote_count: usize) -> Mesh {
    let expansion = remote_count > 0;

    let spec = MeshSpec {
        mtls: config.mtls || expansion,
        auto_injection_namespaces: config.auto_inject_namespaces.clone(),
        outbound_traffic_policy: if config.bypass_egress_traffic {
            OutboundTrafficPolicy::AllowAny
        } else {
            OutboundTrafficPolicy::RegistryOnly
        },
        image_hub: config.image_hub.clone(),
        image_tag: config.image_tag.clone(),
        mesh_expansion: expansion,
        control_plane_security_enabled: expansion,
    };

    let mut mesh = Mesh::new(&config.name, spec);
    mesh.metadata.namespace = Some(namespaces::MESH.to_string());
    mesh.metadata.labels = Some(provenance_labels(cluster));
    mesh
}

/// Create the mesh CR or fold the desired spec into the existing object.
#[instrument(skip_all, fields(mesh = %config.name, cluster = %cluster.name()))]
pub async fn ensure_mesh(
    client: &Client,
    config: &MeshConfig,
    cluster: &dyn Cluster,
    remote_count: usize,
) -> Result<()> {
    let api: Api<Mesh> = Api::namespaced(client.clone(), namespaces::MESH);
    let desired = desired_mesh(config, cluster, remote_count);

    apply_resource(&api, desired, |current, desired| {
        // The existing object keeps its identity; only spec and labels move.
        desired.metadata.uid = current.metadata.uid.clone();
    })
    .await?;

    info!("mesh resource reconciled");
    Ok(())
}

/// Delete the mesh CR and wait until the API server confirms it is gone.
#[instrument(skip(client, waiter))]
pub async fn remove_mesh(client: &Client, name: &str, waiter: &Waiter) -> Result<()> {
    let api: Api<Mesh> = Api::namespaced(client.clone(), namespaces::MESH);

    delete_resource(&api, name).await?;

    waiter
        .retry("mesh deletion", || async {
            if is_gone(&api, name).await? {
                Ok(())
            } else {
                Err(MeshError::NotReady(format!("mesh {name} still present")))
            }
        })
        .await?;

    info!("mesh resource removed");
    Ok(())
}

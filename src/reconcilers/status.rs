// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Read-only aggregation of mesh status per cluster.

use crate::constants::namespaces;
use crate::error::Result;
use crate::types::mesh::{cluster_id_from_labels, Mesh, RemoteMesh};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::{instrument, warn};

/// Map every mesh participant's cluster ID to its reported status.
///
/// Both the master's Mesh CR and all RemoteMesh registrations contribute.
/// Objects without a parsable cluster label are logged and skipped, so one
/// malformed object never fails the whole query.
#[instrument(skip(client))]
pub async fn cluster_statuses(client: &Client) -> Result<BTreeMap<u32, String>> {
    let mut statuses = BTreeMap::new();

    let meshes: Api<Mesh> = Api::namespaced(client.clone(), namespaces::MESH);
    for mesh in meshes.list(&ListParams::default()).await?.items {
        match cluster_id_from_labels(&mesh.metadata) {
            Some(cluster_id) => {
                statuses.insert(cluster_id, mesh.status_text());
            }
            None => warn!(mesh = %mesh.name_any(), "mesh has no parsable cluster label, skipping"),
        }
    }

    let registrations: Api<RemoteMesh> = Api::namespaced(client.clone(), namespaces::MESH);
    for registration in registrations.list(&ListParams::default()).await?.items {
        match cluster_id_from_labels(&registration.metadata) {
            Some(cluster_id) => {
                statuses.insert(cluster_id, registration.status_text());
            }
            None => warn!(
                registration = %registration.name_any(),
                "registration has no parsable cluster label, skipping"
            ),
        }
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mesh_list_json, remote_mesh_list_json, MockService};

    #[tokio::test]
    async fn aggregates_master_and_remote_statuses() {
        let mock = MockService::new()
            .on_get(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/meshes",
                200,
                &mesh_list_json(&[("demo", Some(1), "Available")]),
            )
            .on_get(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes",
                200,
                &remote_mesh_list_json(&[("remote-west", Some(2)), ("remote-east", Some(3))]),
            );
        let client = mock.into_client();

        let statuses = cluster_statuses(&client).await.unwrap();

        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[&1], "Available");
        assert_eq!(statuses[&2], "Available");
        assert_eq!(statuses[&3], "Available");
    }

    #[tokio::test]
    async fn unlabeled_objects_are_skipped_not_fatal() {
        let mock = MockService::new()
            .on_get(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/meshes",
                200,
                &mesh_list_json(&[("demo", None, "Available")]),
            )
            .on_get(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes",
                200,
                &remote_mesh_list_json(&[("remote-west", Some(2))]),
            );
        let client = mock.into_client();

        let statuses = cluster_statuses(&client).await.unwrap();

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[&2], "Available");
    }
}

// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Mesh CRD availability checking.

use crate::backoff::Waiter;
use crate::error::{MeshError, Result};
use kube::{discovery::Discovery, Client};
use tracing::{debug, info};

const MESH_GROUP: &str = "meshpilot.io";
const MESH_KIND: &str = "Mesh";
const MESH_VERSION: &str = "v1";

/// Wait until the Mesh CRD served by the operator becomes available.
///
/// The operator chart registers the CRD asynchronously after installation,
/// so the mesh resource step polls discovery before creating any CR.
pub async fn wait_for_mesh_crd(client: &Client, waiter: &Waiter) -> Result<()> {
    waiter
        .retry("mesh CRD availability", || async {
            if check_mesh_crd_exists(client).await? {
                Ok(())
            } else {
                debug!("mesh CRD not yet available");
                Err(MeshError::NotReady(format!(
                    "CRD {MESH_GROUP}/{MESH_VERSION} {MESH_KIND} not registered"
                )))
            }
        })
        .await?;

    info!("mesh CRD ({MESH_GROUP}/{MESH_VERSION}) is available");
    Ok(())
}

/// Check whether the Mesh CRD exists by running filtered API discovery.
async fn check_mesh_crd_exists(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[MESH_GROUP])
        .run()
        .await?;

    for group in discovery.groups() {
        if group.name() == MESH_GROUP {
            for (ar, _) in group.recommended_resources() {
                if ar.kind == MESH_KIND && ar.version == MESH_VERSION {
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}

// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Mesh and RemoteMesh custom resources plus provenance label helpers.

use crate::constants::labels;
use crate::types::cluster::Cluster;
use kube::api::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired service-mesh configuration for one cluster.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(group = "meshpilot.io", version = "v1", kind = "Mesh")]
#[kube(namespaced)]
#[kube(status = "MeshStatus")]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    pub mtls: bool,
    #[serde(default)]
    pub auto_injection_namespaces: Vec<String>,
    pub outbound_traffic_policy: OutboundTrafficPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_hub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    /// Required when remote clusters participate in the mesh.
    #[serde(default)]
    pub mesh_expansion: bool,
    #[serde(default)]
    pub control_plane_security_enabled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Wire format of the mesh outbound traffic policy.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum OutboundTrafficPolicy {
    #[serde(rename = "ALLOW_ANY")]
    AllowAny,
    #[serde(rename = "REGISTRY_ONLY")]
    RegistryOnly,
}

/// Registration of one federated remote cluster, kept on the master.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(group = "meshpilot.io", version = "v1", kind = "RemoteMesh")]
#[kube(namespaced)]
#[kube(status = "RemoteMeshStatus")]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeshSpec {
    pub cluster_name: String,
    #[serde(default)]
    pub auto_injection_namespaces: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMeshStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Mesh {
    pub fn status_text(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.status.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

impl RemoteMesh {
    pub fn status_text(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.status.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Labels recording which cluster an object was created for.
pub fn provenance_labels(cluster: &dyn Cluster) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::CLUSTER_ID.to_string(), cluster.id().to_string()),
        (labels::CLOUD.to_string(), cluster.cloud().to_string()),
        (
            labels::DISTRIBUTION.to_string(),
            cluster.distribution().to_string(),
        ),
    ])
}

/// Read the owning cluster ID back out of an object's labels.
///
/// Returns `None` when the label is missing or does not parse; callers log
/// and skip such objects rather than failing.
pub fn cluster_id_from_labels(meta: &ObjectMeta) -> Option<u32> {
    meta.labels
        .as_ref()
        .and_then(|l| l.get(labels::CLUSTER_ID))
        .and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockService;
    use crate::types::cluster::KubeCluster;

    #[test]
    fn outbound_policy_uses_mesh_wire_names() {
        assert_eq!(
            serde_json::to_string(&OutboundTrafficPolicy::AllowAny).unwrap(),
            "\"ALLOW_ANY\""
        );
        assert_eq!(
            serde_json::to_string(&OutboundTrafficPolicy::RegistryOnly).unwrap(),
            "\"REGISTRY_ONLY\""
        );
    }

    #[tokio::test]
    async fn provenance_labels_carry_identity() {
        let cluster = KubeCluster::new(
            7,
            "west",
            1,
            "google",
            "gke",
            "https://example.invalid:6443",
            MockService::new().into_client(),
        );

        let labels = provenance_labels(&cluster);
        assert_eq!(labels[crate::constants::labels::CLUSTER_ID], "7");
        assert_eq!(labels[crate::constants::labels::CLOUD], "google");
        assert_eq!(labels[crate::constants::labels::DISTRIBUTION], "gke");
    }

    #[test]
    fn cluster_id_parses_from_labels() {
        let meta = ObjectMeta {
            labels: Some(BTreeMap::from([(
                crate::constants::labels::CLUSTER_ID.to_string(),
                "42".to_string(),
            )])),
            ..Default::default()
        };
        assert_eq!(cluster_id_from_labels(&meta), Some(42));
    }

    #[test]
    fn missing_or_garbage_label_yields_none() {
        assert_eq!(cluster_id_from_labels(&ObjectMeta::default()), None);

        let meta = ObjectMeta {
            labels: Some(BTreeMap::from([(
                crate::constants::labels::CLUSTER_ID.to_string(),
                "not-a-number".to_string(),
            )])),
            ..Default::default()
        };
        assert_eq!(cluster_id_from_labels(&meta), None);
    }

    #[test]
    fn status_text_defaults_to_unknown() {
        let mesh = Mesh::new(
            "demo",
            MeshSpec {
                mtls: true,
                auto_injection_namespaces: vec![],
                outbound_traffic_policy: OutboundTrafficPolicy::RegistryOnly,
                image_hub: None,
                image_tag: None,
                mesh_expansion: false,
                control_plane_security_enabled: false,
            },
        );
        assert_eq!(mesh.status_text(), "Unknown");
    }
}

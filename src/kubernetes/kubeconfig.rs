// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Minimal kubeconfig synthesis for federated remote clusters.

use crate::error::{MeshError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// A minimal kubeconfig document: one cluster, one token user, one context.
#[derive(Debug, Serialize, Deserialize)]
pub struct KubeconfigDoc {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEndpoint,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    pub server: String,
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: TokenUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenUser {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextRef,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextRef {
    pub cluster: String,
    pub user: String,
}

/// Assemble a kubeconfig granting token access to one remote cluster and
/// serialize it to YAML.
pub fn synthesize_kubeconfig(
    cluster_name: &str,
    server: &str,
    ca_cert: &[u8],
    token: &str,
) -> Result<String> {
    if server.is_empty() {
        return Err(MeshError::Kubeconfig(format!(
            "cluster {cluster_name} has no API endpoint"
        )));
    }
    if token.is_empty() {
        return Err(MeshError::Kubeconfig(format!(
            "cluster {cluster_name} token is empty"
        )));
    }

    let doc = KubeconfigDoc {
        api_version: "v1".to_string(),
        kind: "Config".to_string(),
        clusters: vec![NamedCluster {
            name: cluster_name.to_string(),
            cluster: ClusterEndpoint {
                server: server.to_string(),
                certificate_authority_data: BASE64.encode(ca_cert),
            },
        }],
        users: vec![NamedUser {
            name: cluster_name.to_string(),
            user: TokenUser {
                token: token.to_string(),
            },
        }],
        contexts: vec![NamedContext {
            name: cluster_name.to_string(),
            context: ContextRef {
                cluster: cluster_name.to_string(),
                user: cluster_name.to_string(),
            },
        }],
        current_context: cluster_name.to_string(),
    };

    serde_yaml::to_string(&doc).map_err(|e| MeshError::Kubeconfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_yaml() {
        let yaml = synthesize_kubeconfig(
            "remote-west",
            "https://10.1.2.3:6443",
            b"-----BEGIN CERTIFICATE-----",
            "sa-token",
        )
        .unwrap();

        let doc: KubeconfigDoc = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(doc.current_context, "remote-west");
        assert_eq!(doc.clusters[0].cluster.server, "https://10.1.2.3:6443");
        assert_eq!(
            BASE64
                .decode(&doc.clusters[0].cluster.certificate_authority_data)
                .unwrap(),
            b"-----BEGIN CERTIFICATE-----"
        );
        assert_eq!(doc.users[0].user.token, "sa-token");
        assert_eq!(doc.contexts[0].context.cluster, "remote-west");
    }

    #[test]
    fn rejects_missing_endpoint_or_token() {
        assert!(synthesize_kubeconfig("c", "", b"ca", "token").is_err());
        assert!(synthesize_kubeconfig("c", "https://x:6443", b"ca", "").is_err());
    }
}

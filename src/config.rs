// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Desired mesh configuration for one reconcile invocation.
///
/// Decoded upstream from a feature specification and treated as immutable
/// for the duration of the call; the engine keeps no state of its own
/// between invocations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshConfig {
    /// Name of the mesh, used as the mesh CR name on the master.
    pub name: String,
    /// ID of the cluster that runs the mesh control plane.
    pub master_cluster_id: u32,
    /// Namespaces that get automatic sidecar injection.
    #[serde(default)]
    pub auto_inject_namespaces: Vec<String>,
    /// When set, outbound traffic bypasses the egress registry.
    #[serde(default)]
    pub bypass_egress_traffic: bool,
    /// Enforce mutual TLS between mesh workloads.
    #[serde(default)]
    pub mtls: bool,
    /// Whether the mesh feature is enabled for the cluster group.
    pub enabled: bool,
    /// Optional image registry override for control-plane images.
    #[serde(default)]
    pub image_hub: Option<String>,
    /// Optional image tag override for control-plane images.
    #[serde(default)]
    pub image_tag: Option<String>,
}

/// Connection details for one member cluster of the group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEntry {
    pub id: u32,
    pub name: String,
    pub organization_id: u32,
    pub cloud: String,
    pub distribution: String,
    /// Path to a kubeconfig file for this cluster.
    pub kubeconfig: PathBuf,
    /// Context within the kubeconfig; the current context when unset.
    #[serde(default)]
    pub context: Option<String>,
}

/// On-disk operator configuration: the mesh plus the cluster group topology.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub mesh: MeshConfig,
    pub master: ClusterEntry,
    #[serde(default)]
    pub remotes: Vec<ClusterEntry>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Process settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let config_path = env::var("MESHPILOT_CONFIG")
            .context("MESHPILOT_CONFIG environment variable not set")?;
        Ok(Settings {
            config_path: PathBuf::from(config_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config_document() {
        let raw = r#"
mesh:
  name: demo
  masterClusterId: 1
  autoInjectNamespaces: ["default", "backend"]
  bypassEgressTraffic: true
  mtls: true
  enabled: true
master:
  id: 1
  name: master
  organizationId: 7
  cloud: amazon
  distribution: eks
  kubeconfig: /etc/meshpilot/master.yaml
remotes:
  - id: 2
    name: remote-west
    organizationId: 7
    cloud: google
    distribution: gke
    kubeconfig: /etc/meshpilot/remote-west.yaml
    context: west
"#;
        let config: FileConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.mesh.master_cluster_id, 1);
        assert!(config.mesh.mtls);
        assert_eq!(config.mesh.auto_inject_namespaces.len(), 2);
        assert_eq!(config.remotes.len(), 1);
        assert_eq!(config.remotes[0].context.as_deref(), Some("west"));
    }

    #[test]
    fn optional_fields_default() {
        let raw = r#"
name: demo
masterClusterId: 1
enabled: false
"#;
        let mesh: MeshConfig = serde_yaml::from_str(raw).unwrap();
        assert!(!mesh.bypass_egress_traffic);
        assert!(!mesh.mtls);
        assert!(mesh.auto_inject_namespaces.is_empty());
        assert!(mesh.image_hub.is_none());
    }
}

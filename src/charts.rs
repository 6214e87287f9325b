// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Chart release lifecycle: the deployment boundary trait, the component
//! installer policy on top of it, and a helm CLI backend.

use crate::error::{MeshError, Result};
use crate::types::cluster::Cluster;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Lifecycle state of a chart release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseStatus {
    Deployed,
    Failed,
    Other(String),
}

impl ReleaseStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "deployed" => ReleaseStatus::Deployed,
            "failed" => ReleaseStatus::Failed,
            other => ReleaseStatus::Other(other.to_string()),
        }
    }
}

/// An existing release as reported by the deployment backend.
#[derive(Debug, Clone)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    pub status: ReleaseStatus,
}

/// Everything needed to install or upgrade one release.
#[derive(Debug, Clone)]
pub struct ChartRelease {
    pub namespace: String,
    pub chart: String,
    pub release_name: String,
    pub version: String,
    pub values: serde_json::Value,
    /// Block until the released resources report ready.
    pub wait: bool,
}

/// Boundary to the chart deployment machinery. Implementations must treat
/// deleting an unknown release as success.
#[async_trait]
pub trait ChartService: Send + Sync {
    async fn get_release(
        &self,
        cluster: &dyn Cluster,
        namespace: &str,
        release: &str,
    ) -> Result<Option<Release>>;

    async fn install(&self, cluster: &dyn Cluster, release: &ChartRelease) -> Result<()>;

    async fn upgrade(&self, cluster: &dyn Cluster, release: &ChartRelease) -> Result<()>;

    async fn delete(&self, cluster: &dyn Cluster, namespace: &str, release: &str) -> Result<()>;
}

/// Install-or-upgrade policy over a [`ChartService`].
///
/// A `Deployed` release is upgraded with the current values so configuration
/// changes propagate on re-reconcile; `skip_if_deployed` restores the older
/// leave-it-alone behavior. A `Failed` release is deleted and reinstalled
/// from scratch, never upgraded.
pub struct ComponentInstaller {
    charts: std::sync::Arc<dyn ChartService>,
    skip_if_deployed: bool,
}

impl ComponentInstaller {
    pub fn new(charts: std::sync::Arc<dyn ChartService>) -> Self {
        Self {
            charts,
            skip_if_deployed: false,
        }
    }

    pub fn skip_if_deployed(mut self, skip: bool) -> Self {
        self.skip_if_deployed = skip;
        self
    }

    #[instrument(skip(self, cluster, release), fields(cluster = %cluster.name(), release = %release.release_name))]
    pub async fn install_or_upgrade(
        &self,
        cluster: &dyn Cluster,
        release: &ChartRelease,
    ) -> Result<()> {
        let existing = self
            .charts
            .get_release(cluster, &release.namespace, &release.release_name)
            .await?;

        match existing {
            Some(found) if found.status == ReleaseStatus::Deployed => {
                if self.skip_if_deployed {
                    debug!("release already deployed, skipping");
                    Ok(())
                } else {
                    info!("release already deployed, upgrading with current values");
                    self.charts.upgrade(cluster, release).await
                }
            }
            Some(found) if found.status == ReleaseStatus::Failed => {
                warn!("release is in failed state, deleting and reinstalling");
                self.charts
                    .delete(cluster, &release.namespace, &release.release_name)
                    .await?;
                self.charts.install(cluster, release).await
            }
            Some(found) => Err(MeshError::Chart(format!(
                "release {} is in unexpected state {:?}",
                found.name, found.status
            ))),
            None => {
                info!("installing release");
                self.charts.install(cluster, release).await
            }
        }
    }

    #[instrument(skip(self, cluster), fields(cluster = %cluster.name()))]
    pub async fn delete_release(
        &self,
        cluster: &dyn Cluster,
        namespace: &str,
        release: &str,
    ) -> Result<()> {
        self.charts.delete(cluster, namespace, release).await
    }
}

/// Chart backend shelling out to the helm CLI, one kubeconfig per cluster.
pub struct HelmCli {
    kubeconfigs: HashMap<String, PathBuf>,
}

#[derive(Debug, Deserialize)]
struct HelmListEntry {
    name: String,
    namespace: String,
    status: String,
}

impl HelmCli {
    pub fn new(kubeconfigs: HashMap<String, PathBuf>) -> Self {
        Self { kubeconfigs }
    }

    fn kubeconfig_for(&self, cluster: &dyn Cluster) -> Result<&PathBuf> {
        self.kubeconfigs.get(cluster.name()).ok_or_else(|| {
            MeshError::Chart(format!("no kubeconfig registered for cluster {}", cluster.name()))
        })
    }

    async fn run(&self, cluster: &dyn Cluster, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let kubeconfig = self.kubeconfig_for(cluster)?;
        let mut command = Command::new("helm");
        command
            .args(args)
            .arg("--kubeconfig")
            .arg(kubeconfig)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| MeshError::Chart(format!("failed to spawn helm: {e}")))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .await
                    .map_err(|e| MeshError::Chart(format!("failed to write helm values: {e}")))?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| MeshError::Chart(format!("helm did not run to completion: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            Err(MeshError::Chart(format!(
                "helm {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl ChartService for HelmCli {
    async fn get_release(
        &self,
        cluster: &dyn Cluster,
        namespace: &str,
        release: &str,
    ) -> Result<Option<Release>> {
        let filter = format!("^{release}$");
        let stdout = self
            .run(
                cluster,
                &[
                    "list", "--all", "--namespace", namespace, "--filter", filter.as_str(), "-o", "json",
                ],
                None,
            )
            .await?;

        let entries: Vec<HelmListEntry> = serde_json::from_str(stdout.trim())
            .map_err(|e| MeshError::Chart(format!("failed to parse helm list output: {e}")))?;

        Ok(entries.into_iter().find(|e| e.name == release).map(|e| Release {
            name: e.name,
            namespace: e.namespace,
            status: ReleaseStatus::parse(&e.status),
        }))
    }

    async fn install(&self, cluster: &dyn Cluster, release: &ChartRelease) -> Result<()> {
        let values = serde_yaml::to_string(&release.values)
            .map_err(|e| MeshError::Chart(format!("failed to render values: {e}")))?;
        let mut args = vec![
            "install",
            release.release_name.as_str(),
            release.chart.as_str(),
            "--namespace",
            release.namespace.as_str(),
            "--version",
            release.version.as_str(),
            "-f",
            "-",
        ];
        if release.wait {
            args.push("--wait");
        }
        self.run(cluster, &args, Some(&values)).await.map(|_| ())
    }

    async fn upgrade(&self, cluster: &dyn Cluster, release: &ChartRelease) -> Result<()> {
        let values = serde_yaml::to_string(&release.values)
            .map_err(|e| MeshError::Chart(format!("failed to render values: {e}")))?;
        let mut args = vec![
            "upgrade",
            release.release_name.as_str(),
            release.chart.as_str(),
            "--namespace",
            release.namespace.as_str(),
            "--version",
            release.version.as_str(),
            "-f",
            "-",
        ];
        if release.wait {
            args.push("--wait");
        }
        self.run(cluster, &args, Some(&values)).await.map(|_| ())
    }

    async fn delete(&self, cluster: &dyn Cluster, namespace: &str, release: &str) -> Result<()> {
        match self
            .run(cluster, &["uninstall", release, "--namespace", namespace], None)
            .await
        {
            Ok(_) => Ok(()),
            Err(MeshError::Chart(message)) if message.contains("not found") => {
                debug!(release, "release not found, nothing to delete");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeChartService, MockService};
    use crate::types::cluster::KubeCluster;
    use std::sync::Arc;

    fn make_cluster() -> KubeCluster {
        KubeCluster::new(
            1,
            "master",
            1,
            "amazon",
            "eks",
            "https://example.invalid:6443",
            MockService::new().into_client(),
        )
    }

    fn make_release(name: &str) -> ChartRelease {
        ChartRelease {
            namespace: "mesh-system".to_string(),
            chart: "meshpilot-stable/mesh-operator".to_string(),
            release_name: name.to_string(),
            version: "0.0.30".to_string(),
            values: serde_json::json!({}),
            wait: false,
        }
    }

    #[tokio::test]
    async fn fresh_release_is_installed() {
        let charts = Arc::new(FakeChartService::new());
        let installer = ComponentInstaller::new(Arc::clone(&charts) as Arc<dyn ChartService>);

        installer
            .install_or_upgrade(&make_cluster(), &make_release("op"))
            .await
            .unwrap();

        assert_eq!(charts.calls(), vec!["get op".to_string(), "install op".to_string()]);
    }

    #[tokio::test]
    async fn deployed_release_is_upgraded_by_default() {
        let charts = Arc::new(FakeChartService::new().with_release("op", ReleaseStatus::Deployed));
        let installer = ComponentInstaller::new(Arc::clone(&charts) as Arc<dyn ChartService>);

        installer
            .install_or_upgrade(&make_cluster(), &make_release("op"))
            .await
            .unwrap();

        assert_eq!(charts.calls(), vec!["get op".to_string(), "upgrade op".to_string()]);
    }

    #[tokio::test]
    async fn deployed_release_is_skipped_when_opted_in() {
        let charts = Arc::new(FakeChartService::new().with_release("op", ReleaseStatus::Deployed));
        let installer = ComponentInstaller::new(Arc::clone(&charts) as Arc<dyn ChartService>)
            .skip_if_deployed(true);

        installer
            .install_or_upgrade(&make_cluster(), &make_release("op"))
            .await
            .unwrap();

        assert_eq!(charts.calls(), vec!["get op".to_string()]);
    }

    #[tokio::test]
    async fn failed_release_is_deleted_then_reinstalled() {
        let charts = Arc::new(FakeChartService::new().with_release("op", ReleaseStatus::Failed));
        let installer = ComponentInstaller::new(Arc::clone(&charts) as Arc<dyn ChartService>);

        installer
            .install_or_upgrade(&make_cluster(), &make_release("op"))
            .await
            .unwrap();

        assert_eq!(
            charts.calls(),
            vec![
                "get op".to_string(),
                "delete op".to_string(),
                "install op".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn pending_release_is_an_error() {
        let charts = Arc::new(
            FakeChartService::new().with_release("op", ReleaseStatus::Other("pending-install".to_string())),
        );
        let installer = ComponentInstaller::new(Arc::clone(&charts) as Arc<dyn ChartService>);

        let result = installer
            .install_or_upgrade(&make_cluster(), &make_release("op"))
            .await;

        assert!(matches!(result.unwrap_err(), MeshError::Chart(_)));
    }

    #[tokio::test]
    async fn deleting_unknown_release_is_success() {
        let charts = Arc::new(FakeChartService::new());
        let installer = ComponentInstaller::new(Arc::clone(&charts) as Arc<dyn ChartService>);

        installer
            .delete_release(&make_cluster(), "mesh-system", "op")
            .await
            .unwrap();

        assert_eq!(charts.calls(), vec!["delete op".to_string()]);
    }

    #[test]
    fn release_status_parses_helm_names() {
        assert_eq!(ReleaseStatus::parse("deployed"), ReleaseStatus::Deployed);
        assert_eq!(ReleaseStatus::parse("FAILED"), ReleaseStatus::Failed);
        assert_eq!(
            ReleaseStatus::parse("pending-install"),
            ReleaseStatus::Other("pending-install".to_string())
        );
    }
}

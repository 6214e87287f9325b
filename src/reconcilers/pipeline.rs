// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Ordered reconcile pipeline for the whole cluster group.

use crate::backoff::Waiter;
use crate::charts::{ChartRelease, ChartService, ComponentInstaller};
use crate::config::MeshConfig;
use crate::constants::{backoff, charts, labels, namespaces, OPERATOR_NAME};
use crate::error::{MeshError, Result};
use crate::kubernetes::crd::wait_for_mesh_crd;
use crate::kubernetes::namespaces::{ensure_namespace, remove_namespace};
use crate::kubernetes::pods::wait_for_pods_ready;
use crate::reconcilers::federation::Federator;
use crate::reconcilers::mesh::{ensure_mesh, remove_mesh};
use crate::reconcilers::status::cluster_statuses;
use crate::types::cluster::{ClusterGroup, ClusterRegistry};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Target existence state for the reconciled resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Present,
    Absent,
}

impl DesiredState {
    pub fn of(enabled: bool) -> Self {
        if enabled {
            DesiredState::Present
        } else {
            DesiredState::Absent
        }
    }
}

/// One unit of pipeline work. The enum makes the ordering table explicit
/// and the reversal invariant checkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SystemNamespace,
    OperatorChart,
    MeshResource,
    TelemetryNamespace,
    TelemetryCharts,
    CanaryNamespace,
    CanaryOperatorChart,
    NodeExporterChart,
    RemoteClusters,
}

impl Step {
    /// Install order; teardown undoes dependents before dependencies, so
    /// `Absent` is the exact reverse.
    pub fn plan(state: DesiredState) -> Vec<Step> {
        let mut steps = vec![
            Step::SystemNamespace,
            Step::OperatorChart,
            Step::MeshResource,
            Step::TelemetryNamespace,
            Step::TelemetryCharts,
            Step::CanaryNamespace,
            Step::CanaryOperatorChart,
            Step::NodeExporterChart,
            Step::RemoteClusters,
        ];
        if state == DesiredState::Absent {
            steps.reverse();
        }
        steps
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::SystemNamespace => "system-namespace",
            Step::OperatorChart => "operator-chart",
            Step::MeshResource => "mesh-resource",
            Step::TelemetryNamespace => "telemetry-namespace",
            Step::TelemetryCharts => "telemetry-charts",
            Step::CanaryNamespace => "canary-namespace",
            Step::CanaryOperatorChart => "canary-operator-chart",
            Step::NodeExporterChart => "node-exporter-chart",
            Step::RemoteClusters => "remote-clusters",
        };
        f.write_str(name)
    }
}

/// Desired-state controller for one cluster group.
///
/// Runs the step pipeline strictly sequentially against the master; the
/// first failing step aborts the rest. There is no rollback of applied
/// steps, every step is idempotent and convergence relies on re-invocation.
pub struct MeshReconciler {
    config: MeshConfig,
    group: ClusterGroup,
    registry: Arc<dyn ClusterRegistry>,
    installer: ComponentInstaller,
    create_waiter: Waiter,
    poll_waiter: Waiter,
    ready_waiter: Waiter,
    crd_waiter: Waiter,
}

impl MeshReconciler {
    pub fn new(
        config: MeshConfig,
        group: ClusterGroup,
        registry: Arc<dyn ClusterRegistry>,
        chart_service: Arc<dyn ChartService>,
    ) -> Self {
        Self {
            config,
            group,
            registry,
            installer: ComponentInstaller::new(chart_service),
            create_waiter: Waiter::new(
                Duration::from_secs(backoff::CREATE_DELAY_SECS),
                backoff::CREATE_MAX_RETRIES,
            ),
            poll_waiter: Waiter::new(
                Duration::from_secs(backoff::POLL_DELAY_SECS),
                backoff::POLL_MAX_RETRIES,
            ),
            ready_waiter: Waiter::new(
                Duration::from_secs(backoff::READY_DELAY_SECS),
                backoff::READY_MAX_RETRIES,
            ),
            crd_waiter: Waiter::new(
                Duration::from_secs(backoff::CRD_DELAY_SECS),
                backoff::CRD_MAX_RETRIES,
            ),
        }
    }

    #[cfg(test)]
    fn with_waiters(mut self, waiter: Waiter) -> Self {
        self.create_waiter = waiter;
        self.poll_waiter = waiter;
        self.ready_waiter = waiter;
        self.crd_waiter = waiter;
        self
    }

    /// Drive the cluster group toward the state implied by the config's
    /// `enabled` flag.
    #[instrument(skip(self), fields(mesh = %self.config.name))]
    pub async fn reconcile(&self) -> Result<()> {
        self.validate()?;

        let state = DesiredState::of(self.config.enabled);
        info!(?state, "reconciling mesh");

        for step in Step::plan(state) {
            info!(%step, "running step");
            self.run_step(step, state)
                .await
                .map_err(|e| MeshError::Step {
                    step: step.to_string(),
                    source: Box::new(e),
                })?;
        }

        info!("reconcile complete");
        Ok(())
    }

    /// Aggregate each participant cluster's mesh status, keyed by cluster ID.
    pub async fn cluster_statuses(&self) -> Result<BTreeMap<u32, String>> {
        cluster_statuses(&self.group.master().client()).await
    }

    /// The master must still be the configured cluster before any mutation.
    fn validate(&self) -> Result<()> {
        let master_id = self.group.master().id();
        if master_id != self.config.master_cluster_id {
            return Err(MeshError::Validation(format!(
                "master cluster {} does not match configured master {}",
                master_id, self.config.master_cluster_id
            )));
        }
        Ok(())
    }

    async fn run_step(&self, step: Step, state: DesiredState) -> Result<()> {
        let master = self.group.master().as_ref();
        let client = master.client();

        match (step, state) {
            (Step::SystemNamespace, DesiredState::Present) => {
                ensure_namespace(
                    &client,
                    namespaces::MESH,
                    managed_labels(),
                    &self.create_waiter,
                )
                .await
            }
            (Step::SystemNamespace, DesiredState::Absent) => {
                remove_namespace(&client, namespaces::MESH, &self.poll_waiter).await
            }

            (Step::OperatorChart, DesiredState::Present) => {
                self.installer
                    .install_or_upgrade(master, &self.operator_release())
                    .await
            }
            (Step::OperatorChart, DesiredState::Absent) => {
                self.installer
                    .delete_release(master, namespaces::MESH, charts::OPERATOR_RELEASE)
                    .await
            }

            (Step::MeshResource, DesiredState::Present) => {
                wait_for_pods_ready(
                    &client,
                    namespaces::MESH,
                    "app=mesh-operator",
                    &self.ready_waiter,
                )
                .await?;
                wait_for_mesh_crd(&client, &self.crd_waiter).await?;
                ensure_mesh(&client, &self.config, master, self.group.remotes().len()).await
            }
            (Step::MeshResource, DesiredState::Absent) => {
                remove_mesh(&client, &self.config.name, &self.poll_waiter).await
            }

            (Step::TelemetryNamespace, DesiredState::Present) => {
                ensure_namespace(
                    &client,
                    namespaces::TELEMETRY,
                    managed_labels(),
                    &self.create_waiter,
                )
                .await
            }
            (Step::TelemetryNamespace, DesiredState::Absent) => {
                remove_namespace(&client, namespaces::TELEMETRY, &self.poll_waiter).await
            }

            (Step::TelemetryCharts, DesiredState::Present) => {
                self.installer
                    .install_or_upgrade(master, &gateway_release())
                    .await
            }
            (Step::TelemetryCharts, DesiredState::Absent) => {
                self.installer
                    .delete_release(master, namespaces::TELEMETRY, charts::GATEWAY_RELEASE)
                    .await
            }

            (Step::CanaryNamespace, DesiredState::Present) => {
                ensure_namespace(
                    &client,
                    namespaces::CANARY,
                    managed_labels(),
                    &self.create_waiter,
                )
                .await
            }
            (Step::CanaryNamespace, DesiredState::Absent) => {
                remove_namespace(&client, namespaces::CANARY, &self.poll_waiter).await
            }

            (Step::CanaryOperatorChart, DesiredState::Present) => {
                self.installer
                    .install_or_upgrade(master, &canary_operator_release())
                    .await
            }
            (Step::CanaryOperatorChart, DesiredState::Absent) => {
                self.installer
                    .delete_release(master, namespaces::CANARY, charts::CANARY_OPERATOR_RELEASE)
                    .await
            }

            (Step::NodeExporterChart, DesiredState::Present) => {
                self.installer
                    .install_or_upgrade(master, &node_exporter_release())
                    .await
            }
            (Step::NodeExporterChart, DesiredState::Absent) => {
                self.installer
                    .delete_release(master, namespaces::MESH, charts::NODE_EXPORTER_RELEASE)
                    .await
            }

            (Step::RemoteClusters, _) => {
                let federator = Federator::new(master, self.registry.as_ref(), &self.config);
                federator.reconcile(self.group.remotes(), state).await
            }
        }
    }

    fn operator_release(&self) -> ChartRelease {
        let mut image = serde_json::Map::new();
        if let Some(hub) = &self.config.image_hub {
            image.insert("hub".to_string(), serde_json::json!(hub));
        }
        if let Some(tag) = &self.config.image_tag {
            image.insert("tag".to_string(), serde_json::json!(tag));
        }

        ChartRelease {
            namespace: namespaces::MESH.to_string(),
            chart: charts::OPERATOR.to_string(),
            release_name: charts::OPERATOR_RELEASE.to_string(),
            version: charts::OPERATOR_VERSION.to_string(),
            values: serde_json::json!({ "operator": { "image": image } }),
            wait: true,
        }
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string())])
}

fn gateway_release() -> ChartRelease {
    ChartRelease {
        namespace: namespaces::TELEMETRY.to_string(),
        chart: charts::GATEWAY.to_string(),
        release_name: charts::GATEWAY_RELEASE.to_string(),
        version: charts::GATEWAY_VERSION.to_string(),
        values: serde_json::json!({}),
        wait: false,
    }
}

fn canary_operator_release() -> ChartRelease {
    ChartRelease {
        namespace: namespaces::CANARY.to_string(),
        chart: charts::CANARY_OPERATOR.to_string(),
        release_name: charts::CANARY_OPERATOR_RELEASE.to_string(),
        version: charts::CANARY_OPERATOR_VERSION.to_string(),
        values: serde_json::json!({}),
        wait: false,
    }
}

fn node_exporter_release() -> ChartRelease {
    ChartRelease {
        namespace: namespaces::MESH.to_string(),
        chart: charts::NODE_EXPORTER.to_string(),
        release_name: charts::NODE_EXPORTER_RELEASE.to_string(),
        version: charts::NODE_EXPORTER_VERSION.to_string(),
        values: serde_json::json!({
            "service": { "labels": { "app": "mesh-node-exporter" } }
        }),
        wait: false,
    }
}

// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use meshpilot::charts::HelmCli;
use meshpilot::config::{FileConfig, Settings};
use meshpilot::kubernetes::connect_cluster;
use meshpilot::reconcilers::MeshReconciler;
use meshpilot::types::{Cluster, ClusterGroup};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Meshpilot reconciler");

    let settings = Settings::from_env()?;
    let config = FileConfig::load(&settings.config_path)?;
    info!(
        mesh = %config.mesh.name,
        remotes = config.remotes.len(),
        "Configuration loaded"
    );

    let master = connect_cluster(&config.master).await?;
    let mut remotes: Vec<Arc<dyn Cluster>> = Vec::with_capacity(config.remotes.len());
    for entry in &config.remotes {
        remotes.push(Arc::new(connect_cluster(entry).await?));
    }

    let mut kubeconfigs = HashMap::from([(
        config.master.name.clone(),
        config.master.kubeconfig.clone(),
    )]);
    for entry in &config.remotes {
        kubeconfigs.insert(entry.name.clone(), entry.kubeconfig.clone());
    }
    let charts = Arc::new(HelmCli::new(kubeconfigs));

    let group = ClusterGroup::new(Arc::new(master), remotes)?;
    let registry = Arc::new(group.clone());
    let reconciler = MeshReconciler::new(config.mesh, group, registry, charts);

    if let Err(e) = reconciler.reconcile().await {
        error!(error = %e, "reconcile failed");
        return Err(e.into());
    }

    let statuses = reconciler.cluster_statuses().await?;
    for (cluster_id, status) in &statuses {
        info!(cluster_id = *cluster_id, status = %status, "cluster status");
    }

    info!("Reconcile complete");
    Ok(())
}

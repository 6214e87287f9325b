// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

/// Labels stamped on mesh objects to record which cluster they belong to.
pub mod labels {
    pub const CLUSTER_ID: &str = "meshpilot.io/cluster-id";
    pub const CLOUD: &str = "meshpilot.io/cloud";
    pub const DISTRIBUTION: &str = "meshpilot.io/distribution";
    /// Marks namespaces managed by the operator.
    pub const MANAGED_BY: &str = "meshpilot.io/managed-by";
}

/// The operator name used for managed-by labels and helm release ownership.
pub const OPERATOR_NAME: &str = "meshpilot";

/// Namespaces the pipeline manages.
pub mod namespaces {
    /// Control-plane namespace on every member cluster.
    pub const MESH: &str = "mesh-system";
    /// Namespace for the telemetry gateway components on the master.
    pub const TELEMETRY: &str = "mesh-telemetry";
    /// Namespace for the canary release operator on the master.
    pub const CANARY: &str = "canary-system";
}

/// Chart coordinates for the components the pipeline installs.
pub mod charts {
    pub const OPERATOR: &str = "meshpilot-stable/mesh-operator";
    pub const OPERATOR_VERSION: &str = "0.0.30";
    pub const OPERATOR_RELEASE: &str = "mesh-operator";

    pub const GATEWAY: &str = "meshpilot-stable/mesh-gateway";
    pub const GATEWAY_VERSION: &str = "1.2.1";
    pub const GATEWAY_RELEASE: &str = "mesh-gateway";

    pub const CANARY_OPERATOR: &str = "meshpilot-stable/canary-operator";
    pub const CANARY_OPERATOR_VERSION: &str = "0.1.11";
    pub const CANARY_OPERATOR_RELEASE: &str = "canary-operator";

    pub const NODE_EXPORTER: &str = "meshpilot-stable/node-exporter";
    pub const NODE_EXPORTER_VERSION: &str = "1.8.1";
    pub const NODE_EXPORTER_RELEASE: &str = "mesh-node-exporter";
}

/// Service account and RBAC object names granted to the mesh control plane
/// on remote clusters.
pub mod federation {
    pub const SERVICE_ACCOUNT: &str = "mesh-operator";
    pub const CLUSTER_ROLE: &str = "mesh-operator";
    pub const CLUSTER_ROLE_BINDING: &str = "mesh-operator";
    /// Token secret of the federation service account on a remote cluster.
    pub const TOKEN_SECRET: &str = "mesh-operator-token";
    /// Data key under which a synthesized kubeconfig is stored on the master.
    pub const KUBECONFIG_KEY: &str = "kubeconfig";
}

/// Backoff budgets for the readiness waiter.
pub mod backoff {
    /// Delay between namespace/CR existence probes, in seconds.
    pub const POLL_DELAY_SECS: u64 = 5;
    /// Attempts before deletion confirmation is declared timed out.
    pub const POLL_MAX_RETRIES: u32 = 60;
    /// Delay between namespace-create retries, in seconds.
    pub const CREATE_DELAY_SECS: u64 = 1;
    /// Attempts for transient create failures.
    pub const CREATE_MAX_RETRIES: u32 = 5;
    /// Delay between CRD availability probes, in seconds.
    pub const CRD_DELAY_SECS: u64 = 10;
    /// Attempts before giving up on the mesh CRD appearing.
    pub const CRD_MAX_RETRIES: u32 = 30;
    /// Delay between operator pod readiness probes, in seconds.
    pub const READY_DELAY_SECS: u64 = 10;
    /// Attempts before operator pods are declared stuck.
    pub const READY_MAX_RETRIES: u32 = 30;
}

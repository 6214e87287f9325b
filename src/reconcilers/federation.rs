// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Remote cluster federation: per-remote bootstrap pipelines, reversed
//! teardown, and garbage collection of orphaned registrations.

use crate::backoff::Waiter;
use crate::config::MeshConfig;
use crate::constants::{backoff, federation, labels, namespaces, OPERATOR_NAME};
use crate::error::{is_not_found, MeshError, Result};
use crate::kubernetes::kubeconfig::synthesize_kubeconfig;
use crate::kubernetes::namespaces::{ensure_namespace, remove_namespace};
use crate::kubernetes::resources::{apply_resource, create_if_absent, delete_resource};
use crate::reconcilers::pipeline::DesiredState;
use crate::types::cluster::{Cluster, ClusterRegistry};
use crate::types::mesh::{cluster_id_from_labels, provenance_labels, RemoteMesh, RemoteMeshSpec};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::ByteString;
use kube::api::{Api, ListParams, ObjectMeta};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Drives remote clusters into and out of mesh membership.
pub struct Federator<'a> {
    master: &'a dyn Cluster,
    registry: &'a dyn ClusterRegistry,
    config: &'a MeshConfig,
    create_waiter: Waiter,
    poll_waiter: Waiter,
}

impl<'a> Federator<'a> {
    pub fn new(
        master: &'a dyn Cluster,
        registry: &'a dyn ClusterRegistry,
        config: &'a MeshConfig,
    ) -> Self {
        Self {
            master,
            registry,
            config,
            create_waiter: Waiter::new(
                Duration::from_secs(backoff::CREATE_DELAY_SECS),
                backoff::CREATE_MAX_RETRIES,
            ),
            poll_waiter: Waiter::new(
                Duration::from_secs(backoff::POLL_DELAY_SECS),
                backoff::POLL_MAX_RETRIES,
            ),
        }
    }

    #[cfg(test)]
    pub fn with_waiters(mut self, create: Waiter, poll: Waiter) -> Self {
        self.create_waiter = create;
        self.poll_waiter = poll;
        self
    }

    /// Reconcile all remotes toward `state`, then collect orphans. For
    /// `Absent` the desired membership is empty, so garbage collection also
    /// sweeps up any registration left behind by earlier reconciles.
    pub async fn reconcile(
        &self,
        remotes: &[Arc<dyn Cluster>],
        state: DesiredState,
    ) -> Result<()> {
        match state {
            DesiredState::Present => {
                for remote in remotes {
                    self.ensure_remote(remote.as_ref()).await?;
                }
                self.collect_garbage(remotes).await
            }
            DesiredState::Absent => {
                for remote in remotes {
                    self.remove_remote(remote.as_ref(), remote.name()).await?;
                }
                self.collect_garbage(&[]).await
            }
        }
    }

    /// Bootstrap one remote cluster: namespace, service account, RBAC,
    /// kubeconfig secret on the master, then the RemoteMesh registration.
    #[instrument(skip(self, remote), fields(cluster = %remote.name()))]
    pub async fn ensure_remote(&self, remote: &dyn Cluster) -> Result<()> {
        info!("federating remote cluster");
        let remote_client = remote.client();

        let mut ns_labels = provenance_labels(remote);
        ns_labels.insert(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
        ensure_namespace(&remote_client, namespaces::MESH, ns_labels, &self.create_waiter).await?;

        let service_accounts: Api<ServiceAccount> =
            Api::namespaced(remote_client.clone(), namespaces::MESH);
        create_if_absent(&service_accounts, &federation_service_account()).await?;

        let cluster_roles: Api<ClusterRole> = Api::all(remote_client.clone());
        create_if_absent(&cluster_roles, &federation_cluster_role()).await?;

        let role_bindings: Api<ClusterRoleBinding> = Api::all(remote_client.clone());
        create_if_absent(&role_bindings, &federation_cluster_role_binding()).await?;

        self.ensure_kubeconfig_secret(remote).await?;
        self.register_remote(remote).await?;

        info!("remote cluster federated");
        Ok(())
    }

    /// Undo `ensure_remote` in exactly the reverse order. `registration`
    /// names the master-side objects (RemoteMesh CR and kubeconfig secret),
    /// which for orphans may differ from the cluster's current name.
    #[instrument(skip(self, remote), fields(cluster = %remote.name()))]
    pub async fn remove_remote(&self, remote: &dyn Cluster, registration: &str) -> Result<()> {
        info!("removing remote cluster from the mesh");
        let master_client = self.master.client();
        let remote_client = remote.client();

        let registrations: Api<RemoteMesh> =
            Api::namespaced(master_client.clone(), namespaces::MESH);
        delete_resource(&registrations, registration).await?;

        let secrets: Api<Secret> = Api::namespaced(master_client, namespaces::MESH);
        delete_resource(&secrets, registration).await?;

        let role_bindings: Api<ClusterRoleBinding> = Api::all(remote_client.clone());
        delete_resource(&role_bindings, federation::CLUSTER_ROLE_BINDING).await?;

        let cluster_roles: Api<ClusterRole> = Api::all(remote_client.clone());
        delete_resource(&cluster_roles, federation::CLUSTER_ROLE).await?;

        let service_accounts: Api<ServiceAccount> =
            Api::namespaced(remote_client.clone(), namespaces::MESH);
        delete_resource(&service_accounts, federation::SERVICE_ACCOUNT).await?;

        remove_namespace(&remote_client, namespaces::MESH, &self.poll_waiter).await?;

        info!("remote cluster removed");
        Ok(())
    }

    /// Tear down registrations whose cluster is no longer a member.
    ///
    /// A registration that cannot be attributed or resolved is logged and
    /// skipped so one bad orphan never blocks cleanup of the rest.
    #[instrument(skip_all)]
    pub async fn collect_garbage(&self, current: &[Arc<dyn Cluster>]) -> Result<()> {
        let mut desired: BTreeSet<u32> = current.iter().map(|c| c.id()).collect();
        desired.insert(self.master.id());

        let registrations: Api<RemoteMesh> =
            Api::namespaced(self.master.client(), namespaces::MESH);
        let list = match registrations.list(&ListParams::default()).await {
            Ok(list) => list,
            // The CRD is gone, so there is nothing left to collect.
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for registration in list.items {
            let name = registration.name_any();
            let Some(cluster_id) = cluster_id_from_labels(&registration.metadata) else {
                warn!(registration = %name, "registration has no parsable cluster label, skipping");
                continue;
            };
            if desired.contains(&cluster_id) {
                continue;
            }

            info!(registration = %name, cluster_id, "found orphaned registration");
            match self.registry.cluster_by_id(cluster_id) {
                Ok(cluster) => {
                    if let Err(e) = self.remove_remote(cluster.as_ref(), &name).await {
                        warn!(registration = %name, error = %e, "orphan teardown failed, skipping");
                    }
                }
                Err(e) => {
                    warn!(registration = %name, error = %e, "orphan cluster lookup failed, skipping");
                }
            }
        }

        Ok(())
    }

    /// Synthesize a kubeconfig from the remote's service-account token and
    /// store it as an opaque secret on the master, keyed by cluster name.
    /// The secret is immutable once created.
    async fn ensure_kubeconfig_secret(&self, remote: &dyn Cluster) -> Result<()> {
        let remote_secrets: Api<Secret> = Api::namespaced(remote.client(), namespaces::MESH);
        let token_secret = remote_secrets.get(federation::TOKEN_SECRET).await?;
        let (ca_cert, token) = service_account_credentials(remote.name(), &token_secret)?;

        let kubeconfig =
            synthesize_kubeconfig(remote.name(), remote.api_endpoint(), &ca_cert, &token)?;

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(remote.name().to_string()),
                namespace: Some(namespaces::MESH.to_string()),
                labels: Some(provenance_labels(remote)),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([(
                federation::KUBECONFIG_KEY.to_string(),
                ByteString(kubeconfig.into_bytes()),
            )])),
            ..Default::default()
        };

        let master_secrets: Api<Secret> = Api::namespaced(self.master.client(), namespaces::MESH);
        create_if_absent(&master_secrets, &secret).await
    }

    /// Register the remote on the master with a RemoteMesh CR carrying the
    /// remote's cluster-ID label, the authoritative link used by GC.
    async fn register_remote(&self, remote: &dyn Cluster) -> Result<()> {
        let mut registration = RemoteMesh::new(
            remote.name(),
            RemoteMeshSpec {
                cluster_name: remote.name().to_string(),
                auto_injection_namespaces: self.config.auto_inject_namespaces.clone(),
            },
        );
        registration.metadata.namespace = Some(namespaces::MESH.to_string());
        registration.metadata.labels = Some(provenance_labels(remote));

        let registrations: Api<RemoteMesh> =
            Api::namespaced(self.master.client(), namespaces::MESH);
        apply_resource(&registrations, registration, |_, _| {}).await
    }
}

fn federation_service_account() -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(federation::SERVICE_ACCOUNT.to_string()),
            namespace: Some(namespaces::MESH.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn federation_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(federation::CLUSTER_ROLE.to_string()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["*".to_string()]),
            resources: Some(vec!["*".to_string()]),
            verbs: vec!["*".to_string()],
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn federation_cluster_role_binding() -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(federation::CLUSTER_ROLE_BINDING.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: federation::CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: federation::SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespaces::MESH.to_string()),
            ..Default::default()
        }]),
    }
}

/// Extract the CA certificate and bearer token from a service-account
/// token secret.
fn service_account_credentials(cluster_name: &str, secret: &Secret) -> Result<(Vec<u8>, String)> {
    let data = secret.data.as_ref().ok_or_else(|| {
        MeshError::Kubeconfig(format!("token secret for cluster {cluster_name} has no data"))
    })?;

    let ca_cert = data
        .get("ca.crt")
        .map(|b| b.0.clone())
        .ok_or_else(|| {
            MeshError::Kubeconfig(format!(
                "token secret for cluster {cluster_name} has no ca.crt"
            ))
        })?;

    let token_bytes = data.get("token").ok_or_else(|| {
        MeshError::Kubeconfig(format!("token secret for cluster {cluster_name} has no token"))
    })?;
    let token = String::from_utf8(token_bytes.0.clone()).map_err(|e| {
        MeshError::Kubeconfig(format!(
            "token for cluster {cluster_name} is not valid UTF-8: {e}"
        ))
    })?;

    Ok((ca_cert, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        namespace_json, object_json, remote_mesh_json, remote_mesh_list_json, secret_json,
        status_json, MockService,
    };
    use crate::types::cluster::KubeCluster;
    use std::collections::HashMap;

    fn fast_waiter() -> Waiter {
        Waiter::new(Duration::from_millis(1), 3)
    }

    fn make_config() -> MeshConfig {
        MeshConfig {
            name: "demo".to_string(),
            master_cluster_id: 1,
            auto_inject_namespaces: vec!["default".to_string()],
            bypass_egress_traffic: false,
            mtls: true,
            enabled: true,
            image_hub: None,
            image_tag: None,
        }
    }

    fn make_cluster(id: u32, name: &str, mock: MockService) -> Arc<dyn Cluster> {
        Arc::new(KubeCluster::new(
            id,
            name,
            1,
            "google",
            "gke",
            "https://10.1.2.3:6443",
            mock.into_client(),
        ))
    }

    struct MapRegistry {
        clusters: HashMap<u32, Arc<dyn Cluster>>,
    }

    impl ClusterRegistry for MapRegistry {
        fn cluster_by_id(&self, cluster_id: u32) -> Result<Arc<dyn Cluster>> {
            self.clusters
                .get(&cluster_id)
                .cloned()
                .ok_or(MeshError::ClusterNotFound(cluster_id))
        }
    }

    fn empty_registry() -> MapRegistry {
        MapRegistry {
            clusters: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn ensure_remote_bootstraps_in_order() {
        let remote_mock = MockService::new()
            .on_post("/api/v1/namespaces", 201, &namespace_json("mesh-system"))
            .on_post(
                "/api/v1/namespaces/mesh-system/serviceaccounts",
                201,
                &object_json("v1", "ServiceAccount", "mesh-operator", Some("mesh-system")),
            )
            .on_post(
                "/apis/rbac.authorization.k8s.io/v1/clusterroles",
                201,
                &object_json("rbac.authorization.k8s.io/v1", "ClusterRole", "mesh-operator", None),
            )
            .on_post(
                "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings",
                201,
                &object_json(
                    "rbac.authorization.k8s.io/v1",
                    "ClusterRoleBinding",
                    "mesh-operator",
                    None,
                ),
            )
            .on_get(
                "/api/v1/namespaces/mesh-system/secrets/mesh-operator-token",
                200,
                &secret_json(
                    "mesh-operator-token",
                    "mesh-system",
                    &[("ca.crt", b"CERTDATA"), ("token", b"sa-token")],
                ),
            );
        let remote_calls = remote_mock.call_log();

        let master_mock = MockService::new()
            .on_post(
                "/api/v1/namespaces/mesh-system/secrets",
                201,
                &secret_json("remote-west", "mesh-system", &[]),
            )
            .on_post(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes",
                201,
                &remote_mesh_json("remote-west", 2),
            );
        let master_calls = master_mock.call_log();

        let master = make_cluster(1, "master", master_mock);
        let remote = make_cluster(2, "remote-west", remote_mock);
        let config = make_config();
        let registry = empty_registry();
        let federator = Federator::new(master.as_ref(), &registry, &config)
            .with_waiters(fast_waiter(), fast_waiter());

        federator.ensure_remote(remote.as_ref()).await.unwrap();

        assert_eq!(
            remote_calls.paths("POST"),
            vec![
                "/api/v1/namespaces".to_string(),
                "/api/v1/namespaces/mesh-system/serviceaccounts".to_string(),
                "/apis/rbac.authorization.k8s.io/v1/clusterroles".to_string(),
                "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings".to_string(),
            ]
        );
        assert_eq!(
            master_calls.paths("POST"),
            vec![
                "/api/v1/namespaces/mesh-system/secrets".to_string(),
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn garbage_collection_removes_exactly_the_orphan() {
        let master_mock = MockService::new()
            .on_get(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes",
                200,
                &remote_mesh_list_json(&[
                    ("cluster-one", Some(2)),
                    ("cluster-two", Some(3)),
                    ("cluster-three", Some(4)),
                ]),
            )
            .on_get(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes/cluster-three",
                200,
                &remote_mesh_json("cluster-three", 4),
            )
            .on_delete(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes/cluster-three",
                200,
                &remote_mesh_json("cluster-three", 4),
            );
        let master_calls = master_mock.call_log();

        let orphan_mock = MockService::new();
        let master = make_cluster(1, "master", master_mock);
        let remotes = vec![
            make_cluster(2, "cluster-one", MockService::new()),
            make_cluster(3, "cluster-two", MockService::new()),
        ];
        let orphan = make_cluster(4, "cluster-three", orphan_mock);

        let config = make_config();
        let registry = MapRegistry {
            clusters: HashMap::from([(4, Arc::clone(&orphan))]),
        };
        let federator = Federator::new(master.as_ref(), &registry, &config)
            .with_waiters(fast_waiter(), fast_waiter());

        federator.collect_garbage(&remotes).await.unwrap();

        let deletes = master_calls.paths("DELETE");
        assert_eq!(
            deletes,
            vec!["/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes/cluster-three"
                .to_string()]
        );
    }

    #[tokio::test]
    async fn orphan_cleanup_uses_the_registration_name_on_the_master() {
        // The orphaned cluster was renamed after federation; the RemoteMesh
        // CR and the kubeconfig secret still carry the registered name.
        let master_mock = MockService::new()
            .on_get(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes",
                200,
                &remote_mesh_list_json(&[("cluster-three", Some(4))]),
            )
            .on_get(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes/cluster-three",
                200,
                &remote_mesh_json("cluster-three", 4),
            )
            .on_delete(
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes/cluster-three",
                200,
                &remote_mesh_json("cluster-three", 4),
            )
            .on_get(
                "/api/v1/namespaces/mesh-system/secrets/cluster-three",
                200,
                &secret_json("cluster-three", "mesh-system", &[]),
            )
            .on_delete(
                "/api/v1/namespaces/mesh-system/secrets/cluster-three",
                200,
                &status_json(),
            );
        let master_calls = master_mock.call_log();

        let master = make_cluster(1, "master", master_mock);
        let orphan = make_cluster(4, "renamed-three", MockService::new());
        let config = make_config();
        let registry = MapRegistry {
            clusters: HashMap::from([(4, Arc::clone(&orphan))]),
        };
        let federator = Federator::new(master.as_ref(), &registry, &config)
            .with_waiters(fast_waiter(), fast_waiter());

        federator.collect_garbage(&[]).await.unwrap();

        let deletes = master_calls.paths("DELETE");
        assert_eq!(
            deletes,
            vec![
                "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes/cluster-three"
                    .to_string(),
                "/api/v1/namespaces/mesh-system/secrets/cluster-three".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn unlabeled_registration_is_skipped() {
        let master_mock = MockService::new().on_get(
            "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes",
            200,
            &remote_mesh_list_json(&[("cluster-one", Some(2)), ("mystery", None)]),
        );
        let master_calls = master_mock.call_log();

        let master = make_cluster(1, "master", master_mock);
        let remotes = vec![make_cluster(2, "cluster-one", MockService::new())];
        let config = make_config();
        let registry = empty_registry();
        let federator = Federator::new(master.as_ref(), &registry, &config)
            .with_waiters(fast_waiter(), fast_waiter());

        federator.collect_garbage(&remotes).await.unwrap();

        assert!(master_calls.paths("DELETE").is_empty());
    }

    #[tokio::test]
    async fn orphan_lookup_failure_does_not_block_collection() {
        let master_mock = MockService::new().on_get(
            "/apis/meshpilot.io/v1/namespaces/mesh-system/remotemeshes",
            200,
            &remote_mesh_list_json(&[("gone", Some(9))]),
        );
        let master = make_cluster(1, "master", master_mock);
        let config = make_config();
        let registry = empty_registry();
        let federator = Federator::new(master.as_ref(), &registry, &config)
            .with_waiters(fast_waiter(), fast_waiter());

        federator.collect_garbage(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn missing_crd_means_nothing_to_collect() {
        let master = make_cluster(1, "master", MockService::new());
        let config = make_config();
        let registry = empty_registry();
        let federator = Federator::new(master.as_ref(), &registry, &config)
            .with_waiters(fast_waiter(), fast_waiter());

        federator.collect_garbage(&[]).await.unwrap();
    }

    #[test]
    fn token_secret_must_carry_credentials() {
        let secret = Secret::default();
        assert!(service_account_credentials("west", &secret).is_err());
    }
}

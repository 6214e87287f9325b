// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Idempotent create-or-update and delete primitives for any API object.

use crate::error::{is_not_found, MeshError, Result};
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

/// Create the object if absent, otherwise update it in place.
///
/// On update, the live resource version is copied into `desired` and the
/// `preserve` hook gets a chance to carry over cluster-assigned immutable
/// fields (see [`preserve_service_fields`]) before the object is replaced.
pub async fn apply_resource<K, F>(api: &Api<K>, mut desired: K, preserve: F) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
    F: FnOnce(&K, &mut K),
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| MeshError::Validation("resource has no name".to_string()))?;

    match api.get(&name).await {
        Ok(current) => {
            desired.meta_mut().resource_version = current.meta().resource_version.clone();
            preserve(&current, &mut desired);
            debug!(resource = %name, "updating existing resource");
            api.replace(&name, &PostParams::default(), &desired).await?;
        }
        Err(e) if is_not_found(&e) => {
            info!(resource = %name, "creating resource");
            api.create(&PostParams::default(), &desired).await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Create the object only when it does not exist yet; existing objects are
/// left untouched. Used for federation objects that are immutable once
/// created.
pub async fn create_if_absent<K>(api: &Api<K>, desired: &K) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| MeshError::Validation("resource has no name".to_string()))?;

    match api.get(&name).await {
        Ok(_) => {
            debug!(resource = %name, "resource already exists, leaving as is");
            Ok(())
        }
        Err(e) if is_not_found(&e) => {
            info!(resource = %name, "creating resource");
            api.create(&PostParams::default(), desired).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete the object; a missing object is success.
pub async fn delete_resource<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Err(e) if is_not_found(&e) => return Ok(()),
        Err(e) => return Err(e.into()),
        Ok(_) => {}
    }

    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(resource = %name, "deleted resource");
            Ok(())
        }
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Probe helper: true once the object no longer exists.
pub async fn is_gone<K>(api: &Api<K>, name: &str) -> Result<bool>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(current) => {
            debug!(resource = %current.name_any(), "still present");
            Ok(false)
        }
        Err(e) if is_not_found(&e) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Keep the cluster-assigned virtual IP when replacing a Service.
pub fn preserve_service_fields(current: &Service, desired: &mut Service) {
    if let (Some(current_spec), Some(desired_spec)) = (&current.spec, &mut desired.spec) {
        desired_spec.cluster_ip = current_spec.cluster_ip.clone();
        desired_spec.cluster_ips = current_spec.cluster_ips.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{not_found_json, MockService};
    use k8s_openapi::api::core::v1::{Namespace, ServiceSpec};
    use kube::api::ObjectMeta;

    fn make_namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn apply_creates_when_absent() {
        let mock = MockService::new()
            .on_get(
                "/api/v1/namespaces/demo",
                404,
                &not_found_json("namespaces", "demo"),
            )
            .on_post(
                "/api/v1/namespaces",
                201,
                &crate::test_utils::namespace_json("demo"),
            );
        let calls = mock.call_log();
        let api: Api<Namespace> = Api::all(mock.into_client());

        apply_resource(&api, make_namespace("demo"), |_, _| {})
            .await
            .unwrap();

        let calls = calls.calls();
        assert!(calls.contains(&("POST".to_string(), "/api/v1/namespaces".to_string())));
        assert!(!calls.iter().any(|(m, _)| m == "PUT"));
    }

    #[tokio::test]
    async fn apply_replaces_when_present() {
        let current = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "demo", "resourceVersion": "123"}
        })
        .to_string();
        let mock = MockService::new()
            .on_get("/api/v1/namespaces/demo", 200, &current)
            .on_put("/api/v1/namespaces/demo", 200, &current);
        let calls = mock.call_log();
        let api: Api<Namespace> = Api::all(mock.into_client());

        apply_resource(&api, make_namespace("demo"), |_, _| {})
            .await
            .unwrap();

        let calls = calls.calls();
        assert!(calls.contains(&("PUT".to_string(), "/api/v1/namespaces/demo".to_string())));
        assert!(!calls.iter().any(|(m, _)| m == "POST"));
    }

    #[tokio::test]
    async fn delete_of_missing_resource_is_success() {
        let mock = MockService::new();
        let calls = mock.call_log();
        let api: Api<Namespace> = Api::all(mock.into_client());

        delete_resource(&api, "demo").await.unwrap();

        assert!(!calls.calls().iter().any(|(m, _)| m == "DELETE"));
    }

    #[tokio::test]
    async fn create_if_absent_leaves_existing_untouched() {
        let mock = MockService::new().on_get(
            "/api/v1/namespaces/demo",
            200,
            &crate::test_utils::namespace_json("demo"),
        );
        let calls = mock.call_log();
        let api: Api<Namespace> = Api::all(mock.into_client());

        create_if_absent(&api, &make_namespace("demo")).await.unwrap();

        assert!(!calls.calls().iter().any(|(m, _)| m == "POST" || m == "PUT"));
    }

    #[test]
    fn service_hook_preserves_cluster_ip() {
        let current = Service {
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.0.0.12".to_string()),
                cluster_ips: Some(vec!["10.0.0.12".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut desired = Service {
            spec: Some(ServiceSpec::default()),
            ..Default::default()
        };

        preserve_service_fields(&current, &mut desired);

        assert_eq!(
            desired.spec.unwrap().cluster_ip.as_deref(),
            Some("10.0.0.12")
        );
    }
}

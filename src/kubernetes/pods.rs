// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Pod readiness polling by label selector.

use crate::backoff::Waiter;
use crate::error::{MeshError, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tracing::{debug, instrument};

/// Wait until at least one pod matches the selector and every matching pod
/// reports the Running phase.
#[instrument(skip(client, waiter))]
pub async fn wait_for_pods_ready(
    client: &Client,
    namespace: &str,
    label_selector: &str,
    waiter: &Waiter,
) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let params = ListParams::default().labels(label_selector);

    waiter
        .retry("pod readiness", || {
            let pods = pods.clone();
            let params = params.clone();
            async move {
                let list = pods.list(&params).await?;
                if list.items.is_empty() {
                    return Err(MeshError::NotReady(format!(
                        "no pods matching {label_selector} yet"
                    )));
                }
                for pod in &list.items {
                    let phase = pod
                        .status
                        .as_ref()
                        .and_then(|s| s.phase.as_deref())
                        .unwrap_or("Unknown");
                    if phase != "Running" {
                        debug!(pod = %pod.name_any(), phase, "pod not running");
                        return Err(MeshError::NotReady(format!(
                            "pod {} is {phase}",
                            pod.name_any()
                        )));
                    }
                }
                Ok(())
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{pod_list_json, MockService};
    use std::time::Duration;

    #[tokio::test]
    async fn running_pods_pass_readiness() {
        let mock = MockService::new().on_get(
            "/api/v1/namespaces/mesh-system/pods",
            200,
            &pod_list_json(&[("operator-0", "Running")]),
        );
        let client = mock.into_client();
        let waiter = Waiter::new(Duration::from_millis(1), 2);

        wait_for_pods_ready(&client, "mesh-system", "app=mesh-operator", &waiter)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pending_pods_exhaust_the_waiter() {
        let mock = MockService::new().on_get(
            "/api/v1/namespaces/mesh-system/pods",
            200,
            &pod_list_json(&[("operator-0", "Pending")]),
        );
        let client = mock.into_client();
        let waiter = Waiter::new(Duration::from_millis(1), 2);

        let result = wait_for_pods_ready(&client, "mesh-system", "app=mesh-operator", &waiter).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_pod_list_is_not_ready() {
        let mock = MockService::new().on_get(
            "/api/v1/namespaces/mesh-system/pods",
            200,
            &pod_list_json(&[]),
        );
        let client = mock.into_client();
        let waiter = Waiter::new(Duration::from_millis(1), 2);

        let result = wait_for_pods_ready(&client, "mesh-system", "app=mesh-operator", &waiter).await;
        assert!(result.is_err());
    }
}

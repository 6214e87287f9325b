// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock Kubernetes API backend with a recorded call log,
//! canned JSON responses, and a scripted chart service.

use crate::charts::{ChartRelease, ChartService, Release, ReleaseStatus};
use crate::error::Result;
use crate::types::cluster::Cluster;
use async_trait::async_trait;
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// Ordered record of (method, path) pairs seen by a [`MockService`].
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Paths of every call made with the given method, in order.
    pub fn paths(&self, method: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p)
            .collect()
    }

    fn record(&self, method: &str, path: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), path.to_string()));
    }
}

/// A mock HTTP service that returns predefined responses based on request
/// paths. Registering the same method and path again queues a further
/// response; the last registered one repeats, so an object can answer
/// absent, then present, then absent across a test. Unmatched requests get
/// a 404 Status, which conveniently models absent resources.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), VecDeque<(u16, String)>>>>,
    log: CallLog,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            log: CallLog::default(),
        }
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.insert("GET", path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.insert("POST", path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.insert("PUT", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.insert("DELETE", path, status, body)
    }

    fn insert(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back((status, body.to_string()));
        self
    }

    /// Handle onto the shared call log, usable after `into_client`.
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let mut responses = self.responses.lock().unwrap();

        // Try exact match first
        let key = (method.to_string(), path.to_string());
        if responses.contains_key(&key) {
            return responses.get_mut(&key).map(Self::next_response);
        }

        // Try prefix match for paths like /api/v1/namespaces/foo
        let prefix_key = responses
            .keys()
            .find(|(m, p)| m == method && path.starts_with(p.as_str()))
            .cloned();
        prefix_key.and_then(move |k| responses.get_mut(&k).map(Self::next_response))
    }

    fn next_response(queue: &mut VecDeque<(u16, String)>) -> (u16, String) {
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        self.log.record(&method, &path);
        let response = self.find_response(&method, &path);

        Box::pin(async move {
            match response {
                Some((status, body)) => Ok(Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(Body::from(body.into_bytes()))
                    .unwrap()),
                None => {
                    // Default 404 for unmatched requests
                    let body = r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"not found","reason":"NotFound","code":404}"#;
                    Ok(Response::builder()
                        .status(404)
                        .header("content-type", "application/json")
                        .body(Body::from(body.as_bytes().to_vec()))
                        .unwrap())
                }
            }
        })
    }
}

/// Create a mock namespace JSON response
pub fn namespace_json(name: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "uid": "test-uid"
        }
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

/// A success Status response, e.g. for DELETE calls.
pub fn status_json() -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Success"
    })
    .to_string()
}

/// A core API versions document for discovery.
pub fn api_versions_json() -> String {
    serde_json::json!({
        "kind": "APIVersions",
        "versions": ["v1"],
        "serverAddressByClientCIDRs": []
    })
    .to_string()
}

/// An APIGroupList with a single group for discovery.
pub fn api_group_list_json(group: &str, version: &str) -> String {
    let group_version = format!("{group}/{version}");
    serde_json::json!({
        "kind": "APIGroupList",
        "apiVersion": "v1",
        "groups": [{
            "name": group,
            "versions": [{"groupVersion": group_version, "version": version}],
            "preferredVersion": {"groupVersion": group_version, "version": version}
        }]
    })
    .to_string()
}

/// An APIResourceList for one kind within a group/version.
pub fn api_resource_list_json(group: &str, version: &str, kind: &str, plural: &str) -> String {
    serde_json::json!({
        "kind": "APIResourceList",
        "apiVersion": "v1",
        "groupVersion": format!("{group}/{version}"),
        "resources": [{
            "name": plural,
            "singularName": kind.to_lowercase(),
            "namespaced": true,
            "kind": kind,
            "verbs": ["create", "delete", "get", "list", "update", "watch"]
        }]
    })
    .to_string()
}

/// A PodList where each pod has the given name and phase.
pub fn pod_list_json(pods: &[(&str, &str)]) -> String {
    let items: Vec<serde_json::Value> = pods
        .iter()
        .map(|(name, phase)| {
            serde_json::json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": name, "namespace": "mesh-system"},
                "status": {"phase": phase}
            })
        })
        .collect();

    serde_json::json!({
        "kind": "PodList",
        "apiVersion": "v1",
        "metadata": {},
        "items": items
    })
    .to_string()
}

/// A secret with base64 JSON encoding applied to the given data pairs.
pub fn secret_json(name: &str, namespace: &str, data: &[(&str, &[u8])]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let encoded: serde_json::Map<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| ((*k).to_string(), serde_json::json!(STANDARD.encode(v))))
        .collect();

    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": name, "namespace": namespace},
        "type": "Opaque",
        "data": encoded
    })
    .to_string()
}

/// A bare API object with just identity metadata, e.g. for create responses.
pub fn object_json(api_version: &str, kind: &str, name: &str, namespace: Option<&str>) -> String {
    serde_json::json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {"name": name, "namespace": namespace}
    })
    .to_string()
}

/// A single Mesh object with a minimal spec.
pub fn mesh_json(name: &str) -> String {
    serde_json::json!({
        "apiVersion": "meshpilot.io/v1",
        "kind": "Mesh",
        "metadata": {
            "name": name,
            "namespace": crate::constants::namespaces::MESH,
            "resourceVersion": "1"
        },
        "spec": {
            "mtls": true,
            "outboundTrafficPolicy": "REGISTRY_ONLY"
        }
    })
    .to_string()
}

/// A single RemoteMesh registration labeled for the given cluster ID.
pub fn remote_mesh_json(name: &str, cluster_id: u32) -> String {
    serde_json::json!({
        "apiVersion": "meshpilot.io/v1",
        "kind": "RemoteMesh",
        "metadata": {
            "name": name,
            "namespace": crate::constants::namespaces::MESH,
            "resourceVersion": "1",
            "labels": {crate::constants::labels::CLUSTER_ID: cluster_id.to_string()}
        },
        "spec": {"clusterName": name}
    })
    .to_string()
}

/// A RemoteMeshList whose items carry the given names and cluster-ID labels.
/// A `None` ID produces an unlabeled item.
pub fn remote_mesh_list_json(items: &[(&str, Option<u32>)]) -> String {
    let items: Vec<serde_json::Value> = items
        .iter()
        .map(|(name, id)| {
            let labels = id.map(|id| {
                serde_json::json!({crate::constants::labels::CLUSTER_ID: id.to_string()})
            });
            serde_json::json!({
                "apiVersion": "meshpilot.io/v1",
                "kind": "RemoteMesh",
                "metadata": {
                    "name": name,
                    "namespace": crate::constants::namespaces::MESH,
                    "labels": labels
                },
                "spec": {"clusterName": name},
                "status": {"status": "Available"}
            })
        })
        .collect();

    serde_json::json!({
        "kind": "RemoteMeshList",
        "apiVersion": "meshpilot.io/v1",
        "metadata": {},
        "items": items
    })
    .to_string()
}

/// A MeshList with one labeled mesh per entry.
pub fn mesh_list_json(items: &[(&str, Option<u32>, &str)]) -> String {
    let items: Vec<serde_json::Value> = items
        .iter()
        .map(|(name, id, status)| {
            let labels = id.map(|id| {
                serde_json::json!({crate::constants::labels::CLUSTER_ID: id.to_string()})
            });
            serde_json::json!({
                "apiVersion": "meshpilot.io/v1",
                "kind": "Mesh",
                "metadata": {
                    "name": name,
                    "namespace": crate::constants::namespaces::MESH,
                    "labels": labels
                },
                "spec": {
                    "mtls": true,
                    "outboundTrafficPolicy": "REGISTRY_ONLY"
                },
                "status": {"status": status}
            })
        })
        .collect();

    serde_json::json!({
        "kind": "MeshList",
        "apiVersion": "meshpilot.io/v1",
        "metadata": {},
        "items": items
    })
    .to_string()
}

/// Scripted [`ChartService`] that records calls and tracks release state.
pub struct FakeChartService {
    releases: Mutex<HashMap<String, ReleaseStatus>>,
    calls: Mutex<Vec<String>>,
}

impl FakeChartService {
    pub fn new() -> Self {
        Self {
            releases: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_release(self, name: &str, status: ReleaseStatus) -> Self {
        self.releases.lock().unwrap().insert(name.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for FakeChartService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChartService for FakeChartService {
    async fn get_release(
        &self,
        _cluster: &dyn Cluster,
        namespace: &str,
        release: &str,
    ) -> Result<Option<Release>> {
        self.record(format!("get {release}"));
        Ok(self
            .releases
            .lock()
            .unwrap()
            .get(release)
            .cloned()
            .map(|status| Release {
                name: release.to_string(),
                namespace: namespace.to_string(),
                status,
            }))
    }

    async fn install(&self, _cluster: &dyn Cluster, release: &ChartRelease) -> Result<()> {
        self.record(format!("install {}", release.release_name));
        self.releases
            .lock()
            .unwrap()
            .insert(release.release_name.clone(), ReleaseStatus::Deployed);
        Ok(())
    }

    async fn upgrade(&self, _cluster: &dyn Cluster, release: &ChartRelease) -> Result<()> {
        self.record(format!("upgrade {}", release.release_name));
        Ok(())
    }

    async fn delete(&self, _cluster: &dyn Cluster, _namespace: &str, release: &str) -> Result<()> {
        self.record(format!("delete {release}"));
        self.releases.lock().unwrap().remove(release);
        Ok(())
    }
}

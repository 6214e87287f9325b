// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Namespace lifecycle with retried creation and observed deletion.

use crate::backoff::Waiter;
use crate::error::{is_not_found, Result};
use crate::kubernetes::resources::is_gone;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Ensure the namespace exists, creating it with the given labels when
/// absent. Creation runs under the waiter so transient API errors are
/// retried; permanent errors abort immediately.
#[instrument(skip(client, labels, waiter))]
pub async fn ensure_namespace(
    client: &Client,
    namespace: &str,
    labels: BTreeMap<String, String>,
    waiter: &Waiter,
) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.get(namespace).await {
        Ok(_) => {
            debug!("namespace already exists");
            return Ok(());
        }
        Err(e) if is_not_found(&e) => {}
        Err(e) => return Err(e.into()),
    }

    info!("creating namespace");
    let desired = Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.to_string()),
            labels: if labels.is_empty() { None } else { Some(labels) },
            ..Default::default()
        },
        ..Default::default()
    };

    waiter
        .retry("namespace creation", || async {
            match namespaces.create(&PostParams::default(), &desired).await {
                Ok(_) => Ok(()),
                // Lost the race against another creator, which is fine.
                Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await?;

    info!("namespace created");
    Ok(())
}

/// Delete the namespace and poll until the API server has actually removed
/// it. A namespace that never existed is success; exhausting the poll
/// budget surfaces a wrapped timeout error.
#[instrument(skip(client, waiter))]
pub async fn remove_namespace(client: &Client, namespace: &str, waiter: &Waiter) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.get(namespace).await {
        Err(e) if is_not_found(&e) => return Ok(()),
        Err(e) => return Err(e.into()),
        Ok(_) => {}
    }

    info!("deleting namespace");
    match namespaces.delete(namespace, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(e) if is_not_found(&e) => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    waiter
        .retry("namespace deletion", || async {
            if is_gone(&namespaces, namespace).await? {
                Ok(())
            } else {
                Err(crate::error::MeshError::NotReady(format!(
                    "namespace {namespace} still terminating"
                )))
            }
        })
        .await?;

    info!("namespace removed");
    Ok(())
}

// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cluster {0} not found")]
    ClusterNotFound(u32),

    #[error("chart deployment error: {0}")]
    Chart(String),

    #[error("failed to assemble kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("step {step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<MeshError>,
    },

    #[error("all {attempts} attempts failed waiting for {what}: {source}")]
    RetriesExhausted {
        what: String,
        attempts: u32,
        #[source]
        source: Box<MeshError>,
    },

    #[error("deadline exceeded waiting for {0}")]
    Deadline(String),

    #[error("not ready: {0}")]
    NotReady(String),

    #[error(transparent)]
    Permanent(Box<MeshError>),
}

impl MeshError {
    /// Mark an error permanent so retry loops abort instead of retrying it.
    pub fn permanent(self) -> Self {
        match self {
            MeshError::Permanent(_) => self,
            other => MeshError::Permanent(Box::new(other)),
        }
    }

    /// Permanent errors short-circuit the backoff waiter.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            MeshError::Permanent(_) | MeshError::Validation(_) | MeshError::Config(_)
        )
    }
}

/// True when a kube error is the API server saying 404.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

pub type Result<T> = std::result::Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_permanent() {
        assert!(MeshError::Validation("master missing".to_string()).is_permanent());
    }

    #[test]
    fn wrapped_error_is_permanent() {
        let err = MeshError::Chart("boom".to_string());
        assert!(!err.is_permanent());
        assert!(err.permanent().is_permanent());
    }

    #[test]
    fn permanent_is_not_double_wrapped() {
        let err = MeshError::Chart("boom".to_string()).permanent().permanent();
        match err {
            MeshError::Permanent(inner) => assert!(matches!(*inner, MeshError::Chart(_))),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

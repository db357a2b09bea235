//! Worker-local status mirror.

use parking_lot::RwLock;
use tessera_cluster::rpc::WorkerSelfStatus;
use tessera_cluster::WorkerState;

/// The worker's own view of its state.
///
/// Written before every lifecycle callback to the cluster, and served
/// verbatim from the worker's `get_status` endpoint.
#[derive(Debug)]
pub struct LocalStatus {
    worker_id: String,
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    status: WorkerState,
    job_id: Option<String>,
}

impl LocalStatus {
    /// A fresh idle mirror for the given worker.
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            inner: RwLock::new(Inner {
                status: WorkerState::Idle,
                job_id: None,
            }),
        }
    }

    /// Mark the worker as running `job_id`.
    pub fn set_running(&self, job_id: &str) {
        let mut inner = self.inner.write();
        inner.status = WorkerState::Running;
        inner.job_id = Some(job_id.to_string());
    }

    /// Mark the worker as idle.
    pub fn set_idle(&self) {
        let mut inner = self.inner.write();
        inner.status = WorkerState::Idle;
        inner.job_id = None;
    }

    /// Mark the worker as shut down.
    pub fn set_shutdown(&self) {
        let mut inner = self.inner.write();
        inner.status = WorkerState::Shutdown;
        inner.job_id = None;
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> WorkerSelfStatus {
        let inner = self.inner.read();
        WorkerSelfStatus {
            worker_id: self.worker_id.clone(),
            status: inner.status,
            job_id: inner.job_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let status = LocalStatus::new("w1");
        assert_eq!(status.snapshot().status, WorkerState::Idle);

        status.set_running("j1");
        let snapshot = status.snapshot();
        assert_eq!(snapshot.status, WorkerState::Running);
        assert_eq!(snapshot.job_id.as_deref(), Some("j1"));

        status.set_idle();
        let snapshot = status.snapshot();
        assert_eq!(snapshot.status, WorkerState::Idle);
        assert!(snapshot.job_id.is_none());

        status.set_shutdown();
        assert_eq!(status.snapshot().status, WorkerState::Shutdown);
    }
}

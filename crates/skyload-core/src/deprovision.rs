use crate::poll::{poll_until, CancelToken, PollPolicy, PollStep, Sleeper};
use crate::CoreError;
use serde::Serialize;
use skyload_config::ClusterId;
use skyload_control::{ClusterStatus, ControlError, ControlPlane, DeleteRequest};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub identifier: ClusterId,
    pub status: ClusterStatus,
    pub elapsed_secs: u64,
    pub checks: u32,
}

/// Deletes a cluster and waits until the control plane no longer knows it.
pub struct DeprovisionOrchestrator<'a> {
    control: &'a dyn ControlPlane,
    policy: PollPolicy,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancelToken,
}

impl<'a> DeprovisionOrchestrator<'a> {
    pub fn new(
        control: &'a dyn ControlPlane,
        policy: PollPolicy,
        sleeper: &'a dyn Sleeper,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            control,
            policy,
            sleeper,
            cancel,
        }
    }

    /// Issue the delete once, then poll until describe reports not-found.
    ///
    /// A not-found or `InvalidClusterState` reply to the delete itself is
    /// logged and polling proceeds; every other delete failure is fatal.
    /// While polling, not-found is the only success signal.
    pub fn deprovision(
        &self,
        id: &ClusterId,
        request: &DeleteRequest,
    ) -> Result<DeleteReport, CoreError> {
        match self.control.delete_cluster(id, request) {
            Ok(d) => info!("delete of {id} accepted, status {}", d.cluster_status),
            Err(ControlError::NotFound(fault)) => {
                info!("delete of {id}: {fault}; confirming absence");
            }
            Err(ControlError::Rejected(fault)) if fault.code == "InvalidClusterState" => {
                info!("delete of {id}: {fault}; already in progress");
            }
            Err(e) => return Err(e.into()),
        }

        let polled = poll_until(self.policy, self.sleeper, self.cancel, id, || {
            match self.control.describe_cluster(id) {
                Err(ControlError::NotFound(_)) => Ok(PollStep::Done(ClusterStatus::Deleted)),
                Ok(d) => Ok(PollStep::Pending(d.cluster_status)),
                Err(e) => {
                    warn!("describe {id}: {e}; still deleting");
                    Ok(PollStep::Pending(format!("unreachable ({e})")))
                }
            }
        })?;
        info!(
            "cluster {id} deleted after {}s ({} checks)",
            polled.elapsed.as_secs(),
            polled.attempts
        );
        Ok(DeleteReport {
            identifier: id.clone(),
            status: polled.value,
            elapsed_secs: polled.elapsed.as_secs(),
            checks: polled.attempts,
        })
    }
}

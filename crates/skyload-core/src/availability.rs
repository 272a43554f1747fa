use crate::poll::{poll_until, CancelToken, PollPolicy, PollStep, Sleeper};
use crate::CoreError;
use skyload_config::ClusterId;
use skyload_control::{ClusterDescriptor, ClusterStatus, ControlError, ControlPlane};
use tracing::{info, warn};

/// Waits for a freshly requested cluster to become usable.
pub struct AvailabilityPoller<'a> {
    control: &'a dyn ControlPlane,
    policy: PollPolicy,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancelToken,
}

impl<'a> AvailabilityPoller<'a> {
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

    /// Poll until the cluster is `available` with an endpoint.
    ///
    /// Transient failures and not-found replies (the control plane is
    /// eventually consistent right after create) keep the loop going.
    /// `failed` and `deleting` abort it.
    pub fn wait_available(&self, id: &ClusterId) -> Result<ClusterDescriptor, CoreError> {
        info!("waiting for cluster {id} to become available");
        let polled = poll_until(self.policy, self.sleeper, self.cancel, id, || {
            match self.control.describe_cluster(id) {
                Ok(d) => classify(d),
                Err(e @ (ControlError::Transient(_) | ControlError::NotFound(_))) => {
                    warn!("describe {id}: {e}; retrying");
                    Ok(PollStep::Pending(format!("unreachable ({e})")))
                }
                Err(e) => Err(e.into()),
            }
        })?;
        info!(
            "cluster {id} available after {}s ({} checks)",
            polled.elapsed.as_secs(),
            polled.attempts
        );
        Ok(polled.value)
    }
}

fn classify(d: ClusterDescriptor) -> Result<PollStep<ClusterDescriptor>, CoreError> {
    match d.status() {
        ClusterStatus::Available if d.endpoint.is_some() => Ok(PollStep::Done(d)),
        ClusterStatus::Available => Ok(PollStep::Pending("available (no endpoint)".to_owned())),
        ClusterStatus::Failed | ClusterStatus::Deleting => Err(CoreError::ClusterFailed {
            identifier: d.cluster_identifier,
            status: d.cluster_status,
        }),
        ClusterStatus::Creating | ClusterStatus::Deleted | ClusterStatus::Unknown => {
            Ok(PollStep::Pending(d.cluster_status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::RecordingSleeper;
    use crate::ErrorKind;
    use skyload_control::mock::mock_descriptor;
    use skyload_control::{MockControlPlane, ScriptedDescribe};
    use std::time::Duration;

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(30), Duration::from_secs(1800))
    }

    fn wait(cp: &MockControlPlane, sleeper: &RecordingSleeper) -> Result<ClusterDescriptor, CoreError> {
        let cancel = CancelToken::new();
        AvailabilityPoller::new(cp, policy(), sleeper, &cancel)
            .wait_available(&ClusterId::new("c1"))
    }

    #[test]
    fn transient_errors_between_creating_do_not_abort() {
        let cp = MockControlPlane::new()
            .with_cluster(mock_descriptor("c1", "creating"))
            .with_describe_script([
                ScriptedDescribe::Status("creating"),
                ScriptedDescribe::Error(ControlError::Transient("HTTP 503".to_owned())),
                ScriptedDescribe::Error(ControlError::not_found("ClusterNotFound", "not yet")),
                ScriptedDescribe::Status("creating"),
                ScriptedDescribe::Status("available"),
            ]);
        let sleeper = RecordingSleeper::new();
        let d = wait(&cp, &sleeper).unwrap();
        assert!(d.endpoint.is_some());
        assert_eq!(cp.calls().describe, 5);
        assert_eq!(sleeper.sleeps().len(), 4);
    }

    #[test]
    fn available_without_endpoint_keeps_polling() {
        let mut bare = mock_descriptor("c1", "available");
        bare.endpoint = None;
        let cp = MockControlPlane::new()
            .with_cluster(bare)
            .with_describe_script([ScriptedDescribe::Error(ControlError::Transient(
                "reset".to_owned(),
            ))]);
        let sleeper = RecordingSleeper::new();
        let err = wait(&cp, &sleeper).unwrap_err();
        match err {
            CoreError::Timeout { last_status, .. } => {
                assert_eq!(last_status, "available (no endpoint)");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn failed_status_aborts_immediately() {
        let cp = MockControlPlane::new()
            .with_cluster(mock_descriptor("c1", "creating"))
            .with_describe_script([ScriptedDescribe::Status("incompatible-network")]);
        let sleeper = RecordingSleeper::new();
        let err = wait(&cp, &sleeper).unwrap_err();
        assert!(matches!(err, CoreError::ClusterFailed { .. }), "{err}");
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn rejection_is_fatal() {
        let cp = MockControlPlane::new().with_describe_script([ScriptedDescribe::Error(
            ControlError::rejected("AccessDenied", "nope"),
        )]);
        let err = wait(&cp, &RecordingSleeper::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(cp.calls().describe, 1);
    }

    #[test]
    fn never_available_times_out_with_last_status() {
        let cp = MockControlPlane::new().with_cluster(mock_descriptor("c1", "creating"));
        let sleeper = RecordingSleeper::new();
        let err = wait(&cp, &sleeper).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(cp.calls().describe, 60);
        assert_eq!(sleeper.total(), Duration::from_secs(1800));
    }
}

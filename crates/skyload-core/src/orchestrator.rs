use crate::availability::AvailabilityPoller;
use crate::deprovision::{DeleteReport, DeprovisionOrchestrator};
use crate::identity::IdentityBroker;
use crate::network::{IngressOutcome, NetworkAccessManager};
use crate::poll::{CancelToken, PollPolicy, Sleeper};
use crate::provision::ClusterProvisioner;
use crate::CoreError;
use serde::Serialize;
use skyload_config::{RoleArn, Settings};
use skyload_control::{ClusterDescriptor, ControlPlane, DeleteRequest, TrustRole};
use skyload_warehouse::sql::{CopySource, Statement};
use skyload_warehouse::{
    Connector, ConnectivityValidator, PipelineReport, ProbeResult, SchemaPipeline, Stage,
    StageSelection,
};
use std::fmt;
use tracing::info;

/// A unit of work announced to the caller before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsureRole,
    Provision,
    WaitAvailable,
    OpenIngress,
    Settle,
    Probe,
}

impl Step {
    pub fn describe(self) -> &'static str {
        match self {
            Self::EnsureRole => "ensuring trust role",
            Self::Provision => "requesting cluster",
            Self::WaitAvailable => "waiting for cluster to become available",
            Self::OpenIngress => "opening ingress",
            Self::Settle => "waiting for network settings to apply",
            Self::Probe => "testing connection",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub role: TrustRole,
    pub cluster: ClusterDescriptor,
    pub ingress: IngressOutcome,
    pub probe: ProbeResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub cluster: ClusterDescriptor,
    pub probe: ProbeResult,
}

/// Sequences the lifecycle components for each command mode.
pub struct Orchestrator<'a> {
    settings: &'a Settings,
    control: &'a dyn ControlPlane,
    connector: &'a dyn Connector,
    sleeper: &'a dyn Sleeper,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        settings: &'a Settings,
        control: &'a dyn ControlPlane,
        connector: &'a dyn Connector,
        sleeper: &'a dyn Sleeper,
        cancel: CancelToken,
    ) -> Self {
        Self {
            settings,
            control,
            connector,
            sleeper,
            cancel,
        }
    }

    fn validator(&self) -> ConnectivityValidator<'a> {
        ConnectivityValidator::from_settings(self.connector, &self.settings.cluster)
    }

    fn describe(&self) -> Result<ClusterDescriptor, CoreError> {
        Ok(self
            .control
            .describe_cluster(&self.settings.cluster.identifier)?)
    }

    pub fn create(&self) -> Result<CreateReport, CoreError> {
        self.create_observed(&mut |_| {})
    }

    /// Role, cluster, availability, ingress, settle delay, probe.
    ///
    /// A failed probe is reported, not returned as an error. Nothing created
    /// before a failure is rolled back.
    pub fn create_observed(
        &self,
        on_step: &mut dyn FnMut(Step),
    ) -> Result<CreateReport, CoreError> {
        let s = self.settings;

        on_step(Step::EnsureRole);
        let role = IdentityBroker::new(self.control).ensure_role(&s.iam.role_name)?;

        on_step(Step::Provision);
        let spec = ClusterProvisioner::spec_for(&s.cluster, &role.arn);
        ClusterProvisioner::new(self.control).provision(&spec)?;

        on_step(Step::WaitAvailable);
        let policy = PollPolicy::new(s.polling.create_interval(), s.polling.create_timeout());
        let cluster = AvailabilityPoller::new(self.control, policy, self.sleeper, &self.cancel)
            .wait_available(&s.cluster.identifier)?;

        on_step(Step::OpenIngress);
        let port = cluster.endpoint.as_ref().map_or(s.cluster.port, |e| e.port);
        let ingress = NetworkAccessManager::new(self.control).open_ingress(&cluster, port)?;

        on_step(Step::Settle);
        self.settle()?;

        on_step(Step::Probe);
        let probe = self.validator().test_connection(&cluster);
        info!(
            "cluster {} ready at {}",
            cluster.cluster_identifier, probe.target
        );
        Ok(CreateReport {
            role,
            cluster,
            ingress,
            probe,
        })
    }

    fn settle(&self) -> Result<(), CoreError> {
        let delay = self.settings.polling.settle_delay();
        if delay.is_zero() {
            return Ok(());
        }
        self.sleeper.sleep(delay, &self.cancel);
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled {
                identifier: self.settings.cluster.identifier.to_string(),
                elapsed: delay,
            });
        }
        Ok(())
    }

    pub fn delete(&self, final_snapshot: Option<&str>) -> Result<DeleteReport, CoreError> {
        let s = self.settings;
        let request = final_snapshot.map_or_else(
            DeleteRequest::skip_snapshot,
            DeleteRequest::with_final_snapshot,
        );
        let policy = PollPolicy::new(s.polling.delete_interval(), s.polling.delete_timeout());
        DeprovisionOrchestrator::new(self.control, policy, self.sleeper, &self.cancel)
            .deprovision(&s.cluster.identifier, &request)
    }

    /// Describe the cluster and probe it.
    pub fn status(&self) -> Result<StatusReport, CoreError> {
        let cluster = self.describe()?;
        let probe = self.validator().test_connection(&cluster);
        Ok(StatusReport { cluster, probe })
    }

    /// Probe the cluster only.
    pub fn test(&self) -> Result<ProbeResult, CoreError> {
        let cluster = self.describe()?;
        Ok(self.validator().test_connection(&cluster))
    }

    /// The configured role ARN, or the one the control plane reports.
    pub fn resolve_role_arn(&self) -> Result<RoleArn, CoreError> {
        if let Some(ref arn) = self.settings.iam.role_arn {
            return Ok(arn.clone());
        }
        Ok(self.control.get_role(&self.settings.iam.role_name)?.arn)
    }

    fn pipeline(&self) -> Result<SchemaPipeline, CoreError> {
        let arn = self.resolve_role_arn()?;
        Ok(SchemaPipeline::new(CopySource::from_settings(
            &self.settings.s3,
            arn,
        )))
    }

    /// Statements `run_pipeline` would execute, without touching the cluster.
    pub fn pipeline_plan(
        &self,
        selection: StageSelection,
    ) -> Result<Vec<(Stage, Vec<Statement>)>, CoreError> {
        Ok(self.pipeline()?.plan(selection))
    }

    pub fn run_pipeline(&self, selection: StageSelection) -> Result<PipelineReport, CoreError> {
        let pipeline = self.pipeline()?;
        let cluster = self.describe()?;
        let mut session = self.validator().open_session(&cluster)?;
        let result = pipeline.run(session.as_mut(), selection);
        let closed = session.close();
        let report = result?;
        closed?;
        info!(
            "pipeline finished: {} statements across {} stages",
            report.statement_count(),
            report.stages.len()
        );
        Ok(report)
    }
}

use crate::CoreError;
use serde::Serialize;
use skyload_control::{ClusterDescriptor, ControlError, ControlPlane, IngressRule, SecurityGroup};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngressOutcome {
    Opened { group_id: String, port: u16 },
    AlreadyOpen { group_id: String, port: u16 },
}

/// Opens the warehouse port on the cluster's security group.
pub struct NetworkAccessManager<'a> {
    control: &'a dyn ControlPlane,
}

impl<'a> NetworkAccessManager<'a> {
    pub fn new(control: &'a dyn ControlPlane) -> Self {
        Self { control }
    }

    /// Authorize inbound TCP on `port` from anywhere on the VPC's `default`
    /// group, or its first group when none is named `default`.
    ///
    /// Authorizing a rule that already exists is not an error.
    pub fn open_ingress(
        &self,
        descriptor: &ClusterDescriptor,
        port: u16,
    ) -> Result<IngressOutcome, CoreError> {
        let vpc_id = descriptor.vpc_id.as_deref().ok_or_else(|| {
            CoreError::NotFound(format!(
                "VPC of cluster '{}'",
                descriptor.cluster_identifier
            ))
        })?;
        let groups = self.control.list_security_groups(vpc_id)?;
        let group = pick_group(&groups)
            .ok_or_else(|| CoreError::NotFound(format!("security group in {vpc_id}")))?;

        let rule = IngressRule::tcp_from_anywhere(port);
        let group_id = group.group_id.clone();
        match self.control.authorize_ingress(&group_id, &rule) {
            Ok(()) => {
                info!("opened tcp/{port} from {} on {group_id}", rule.cidr_ip);
                Ok(IngressOutcome::Opened { group_id, port })
            }
            Err(ControlError::Duplicate(_)) => {
                info!("tcp/{port} already open on {group_id}");
                Ok(IngressOutcome::AlreadyOpen { group_id, port })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn pick_group(groups: &[SecurityGroup]) -> Option<&SecurityGroup> {
    groups
        .iter()
        .find(|g| g.group_name == "default")
        .or_else(|| groups.first())
}

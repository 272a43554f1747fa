use crate::CoreError;
use skyload_config::{ClusterSection, ClusterType, RoleArn};
use skyload_control::{ClusterDescriptor, ClusterSpec, ControlPlane};
use tracing::info;

pub struct ClusterProvisioner<'a> {
    control: &'a dyn ControlPlane,
}

impl<'a> ClusterProvisioner<'a> {
    pub fn new(control: &'a dyn ControlPlane) -> Self {
        Self { control }
    }

    /// Build the create request for `cluster`, granting it `role`.
    pub fn spec_for(cluster: &ClusterSection, role: &RoleArn) -> ClusterSpec {
        ClusterSpec {
            cluster_identifier: cluster.identifier.clone(),
            cluster_type: cluster.cluster_type,
            node_type: cluster.node_type.clone(),
            number_of_nodes: match cluster.cluster_type {
                ClusterType::MultiNode => Some(cluster.num_nodes),
                ClusterType::SingleNode => None,
            },
            db_name: cluster.db_name.clone(),
            master_username: cluster.db_user.clone(),
            master_user_password: cluster.db_password.clone(),
            port: cluster.port,
            iam_roles: vec![role.clone()],
            publicly_accessible: true,
        }
    }

    /// Submit the create request. Any rejection is fatal; nothing is retried.
    pub fn provision(&self, spec: &ClusterSpec) -> Result<ClusterDescriptor, CoreError> {
        info!(
            "requesting {} cluster {} ({})",
            spec.cluster_type, spec.cluster_identifier, spec.node_type
        );
        let descriptor = self.control.create_cluster(spec)?;
        info!(
            "cluster {} accepted, status {}",
            descriptor.cluster_identifier, descriptor.cluster_status
        );
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use skyload_config::ClusterId;
    use skyload_control::mock::mock_descriptor;
    use skyload_control::MockControlPlane;

    fn section(cluster_type: ClusterType, num_nodes: u32) -> ClusterSection {
        ClusterSection {
            cluster_type,
            node_type: "dc2.large".to_owned(),
            num_nodes,
            identifier: ClusterId::new("dwhCluster"),
            db_name: "dwh".to_owned(),
            db_user: "dwhuser".to_owned(),
            db_password: "Passw0rd".to_owned(),
            port: 5439,
        }
    }

    #[test]
    fn node_count_only_for_multi_node() {
        let role = RoleArn::new("arn:aws:iam::0:role/dwhRole");
        let multi = ClusterProvisioner::spec_for(&section(ClusterType::MultiNode, 4), &role);
        assert_eq!(multi.number_of_nodes, Some(4));
        assert!(multi.publicly_accessible);
        assert_eq!(multi.iam_roles, vec![role.clone()]);
        let single = ClusterProvisioner::spec_for(&section(ClusterType::SingleNode, 1), &role);
        assert_eq!(single.number_of_nodes, None);
    }

    #[test]
    fn collision_is_fatal() {
        let cp = MockControlPlane::new().with_cluster(mock_descriptor("dwhCluster", "available"));
        let spec = ClusterProvisioner::spec_for(
            &section(ClusterType::SingleNode, 1),
            &RoleArn::new("arn"),
        );
        let err = ClusterProvisioner::new(&cp).provision(&spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(cp.calls().describe, 0);
    }
}

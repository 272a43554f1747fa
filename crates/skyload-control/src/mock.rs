use crate::model::{
    ClusterDescriptor, ClusterSpec, DeleteRequest, Endpoint, IngressRule, RoleRequest,
    SecurityGroup, TrustRole,
};
use crate::{ControlError, ControlPlane};
use skyload_config::{ClusterId, RoleArn, RoleName};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

pub const MOCK_VPC_ID: &str = "vpc-mock";
pub const MOCK_GROUP_ID: &str = "sg-mock";
pub const MOCK_ENDPOINT_ADDRESS: &str = "mock.cluster.local";

/// One scripted reply to `describe_cluster`.
#[derive(Debug)]
pub enum ScriptedDescribe {
    /// Set the stored cluster's status string and return the descriptor.
    /// `"available"` also populates the endpoint.
    Status(&'static str),
    /// Return this error without touching stored state.
    Error(ControlError),
    /// Forget the cluster and return `ClusterNotFound`.
    Gone,
}

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_role: usize,
    pub create_role: usize,
    pub attach_policy: usize,
    pub create_cluster: usize,
    pub describe: usize,
    pub delete: usize,
    pub list_groups: usize,
    pub authorize: usize,
}

#[derive(Default)]
struct MockState {
    roles: HashMap<RoleName, TrustRole>,
    attached: Vec<(RoleName, String)>,
    clusters: HashMap<ClusterId, ClusterDescriptor>,
    describe_script: VecDeque<ScriptedDescribe>,
    ingress: HashSet<(String, IngressRule)>,
    fail_attach: bool,
    delete_error: Option<ControlError>,
    calls: CallCounts,
}

/// In-memory control plane with scriptable describe replies.
///
/// Unscripted describe calls return the stored descriptor unchanged, so a
/// cluster created through the mock stays `creating` until a script entry
/// moves it on.
#[derive(Default)]
pub struct MockControlPlane {
    state: Mutex<MockState>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_role(self, name: &str) -> Self {
        {
            let mut state = self.lock();
            let role = mock_role(&RoleName::new(name));
            state.roles.insert(role.role_name.clone(), role);
        }
        self
    }

    #[must_use]
    pub fn with_cluster(self, descriptor: ClusterDescriptor) -> Self {
        self.lock()
            .clusters
            .insert(descriptor.cluster_identifier.clone(), descriptor);
        self
    }

    #[must_use]
    pub fn with_describe_script(self, script: impl IntoIterator<Item = ScriptedDescribe>) -> Self {
        self.lock().describe_script.extend(script);
        self
    }

    #[must_use]
    pub fn failing_policy_attach(self) -> Self {
        self.lock().fail_attach = true;
        self
    }

    #[must_use]
    pub fn failing_delete(self, error: ControlError) -> Self {
        self.lock().delete_error = Some(error);
        self
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn attached_policies(&self) -> Vec<(RoleName, String)> {
        self.lock().attached.clone()
    }

    pub fn ingress_rules(&self) -> Vec<(String, IngressRule)> {
        self.lock().ingress.iter().cloned().collect()
    }

    pub fn cluster(&self, id: &str) -> Option<ClusterDescriptor> {
        self.lock().clusters.get(&ClusterId::new(id)).cloned()
    }
}

fn mock_role(name: &RoleName) -> TrustRole {
    TrustRole {
        role_name: name.clone(),
        arn: RoleArn::new(format!("arn:aws:iam::000000000000:role/{name}")),
    }
}

fn cluster_not_found(id: &ClusterId) -> ControlError {
    ControlError::not_found("ClusterNotFound", format!("Cluster {id} not found."))
}

/// Descriptor in the given status for a cluster named `id`.
pub fn mock_descriptor(id: &str, status: &str) -> ClusterDescriptor {
    let mut d = ClusterDescriptor {
        cluster_identifier: ClusterId::new(id),
        node_type: "dc2.large".to_owned(),
        number_of_nodes: 1,
        cluster_status: status.to_owned(),
        master_username: "dwhuser".to_owned(),
        db_name: "dwh".to_owned(),
        endpoint: None,
        vpc_id: Some(MOCK_VPC_ID.to_owned()),
        iam_roles: Vec::new(),
        cluster_create_time: None,
    };
    if status == "available" {
        d.endpoint = Some(Endpoint {
            address: MOCK_ENDPOINT_ADDRESS.to_owned(),
            port: 5439,
        });
    }
    d
}

impl ControlPlane for MockControlPlane {
    fn get_role(&self, name: &RoleName) -> Result<TrustRole, ControlError> {
        let mut state = self.lock();
        state.calls.get_role += 1;
        state.roles.get(name).cloned().ok_or_else(|| {
            ControlError::not_found(
                "NoSuchEntity",
                format!("The role with name {name} cannot be found."),
            )
        })
    }

    fn create_role(&self, request: &RoleRequest) -> Result<TrustRole, ControlError> {
        let mut state = self.lock();
        state.calls.create_role += 1;
        if state.roles.contains_key(&request.role_name) {
            return Err(ControlError::duplicate(
                "EntityAlreadyExists",
                format!("Role with name {} already exists.", request.role_name),
            ));
        }
        let role = mock_role(&request.role_name);
        state.roles.insert(role.role_name.clone(), role.clone());
        Ok(role)
    }

    fn attach_role_policy(&self, name: &RoleName, policy_arn: &str) -> Result<(), ControlError> {
        let mut state = self.lock();
        state.calls.attach_policy += 1;
        if state.fail_attach {
            return Err(ControlError::rejected(
                "AccessDenied",
                "not authorized to perform iam:AttachRolePolicy",
            ));
        }
        state.attached.push((name.clone(), policy_arn.to_owned()));
        Ok(())
    }

    fn create_cluster(&self, spec: &ClusterSpec) -> Result<ClusterDescriptor, ControlError> {
        let mut state = self.lock();
        state.calls.create_cluster += 1;
        if state.clusters.contains_key(&spec.cluster_identifier) {
            return Err(ControlError::rejected(
                "ClusterAlreadyExists",
                format!("Cluster {} already exists.", spec.cluster_identifier),
            ));
        }
        let descriptor = ClusterDescriptor {
            cluster_identifier: spec.cluster_identifier.clone(),
            node_type: spec.node_type.clone(),
            number_of_nodes: spec.number_of_nodes.unwrap_or(1),
            cluster_status: "creating".to_owned(),
            master_username: spec.master_username.clone(),
            db_name: spec.db_name.clone(),
            endpoint: None,
            vpc_id: Some(MOCK_VPC_ID.to_owned()),
            iam_roles: spec.iam_roles.clone(),
            cluster_create_time: None,
        };
        state
            .clusters
            .insert(spec.cluster_identifier.clone(), descriptor.clone());
        Ok(descriptor)
    }

    fn describe_cluster(&self, id: &ClusterId) -> Result<ClusterDescriptor, ControlError> {
        let mut state = self.lock();
        state.calls.describe += 1;
        match state.describe_script.pop_front() {
            Some(ScriptedDescribe::Error(e)) => Err(e),
            Some(ScriptedDescribe::Gone) => {
                state.clusters.remove(id);
                Err(cluster_not_found(id))
            }
            Some(ScriptedDescribe::Status(status)) => {
                let entry = state
                    .clusters
                    .entry(id.clone())
                    .or_insert_with(|| mock_descriptor(id, status));
                entry.cluster_status = status.to_owned();
                if status == "available" && entry.endpoint.is_none() {
                    entry.endpoint = Some(Endpoint {
                        address: MOCK_ENDPOINT_ADDRESS.to_owned(),
                        port: 5439,
                    });
                }
                Ok(entry.clone())
            }
            None => state
                .clusters
                .get(id)
                .cloned()
                .ok_or_else(|| cluster_not_found(id)),
        }
    }

    fn delete_cluster(
        &self,
        id: &ClusterId,
        _request: &DeleteRequest,
    ) -> Result<ClusterDescriptor, ControlError> {
        let mut state = self.lock();
        state.calls.delete += 1;
        if let Some(err) = state.delete_error.take() {
            return Err(err);
        }
        let Some(entry) = state.clusters.get_mut(id) else {
            return Err(cluster_not_found(id));
        };
        entry.cluster_status = "deleting".to_owned();
        Ok(entry.clone())
    }

    fn list_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ControlError> {
        let mut state = self.lock();
        state.calls.list_groups += 1;
        if vpc_id != MOCK_VPC_ID {
            return Err(ControlError::not_found(
                "InvalidVpcID.NotFound",
                format!("The vpc ID '{vpc_id}' does not exist"),
            ));
        }
        Ok(vec![SecurityGroup {
            group_id: MOCK_GROUP_ID.to_owned(),
            group_name: "default".to_owned(),
            vpc_id: vpc_id.to_owned(),
        }])
    }

    fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<(), ControlError> {
        let mut state = self.lock();
        state.calls.authorize += 1;
        if !state.ingress.insert((group_id.to_owned(), rule.clone())) {
            return Err(ControlError::duplicate(
                "InvalidPermission.Duplicate",
                format!(
                    "the specified rule \"peer: {}, {}, from port: {}, to port: {}, ALLOW\" already exists",
                    rule.cidr_ip, rule.ip_protocol, rule.from_port, rule.to_port
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_is_not_found() {
        let cp = MockControlPlane::new();
        let err = cp.get_role(&RoleName::new("dwhRole")).unwrap_err();
        assert_eq!(err.code(), Some("NoSuchEntity"));
    }

    #[test]
    fn script_drives_describe_then_falls_back_to_state() {
        let cp = MockControlPlane::new()
            .with_cluster(mock_descriptor("c1", "creating"))
            .with_describe_script([ScriptedDescribe::Status("available")]);
        let first = cp.describe_cluster(&ClusterId::new("c1")).unwrap();
        assert_eq!(first.cluster_status, "available");
        assert!(first.endpoint.is_some());
        let second = cp.describe_cluster(&ClusterId::new("c1")).unwrap();
        assert_eq!(second.cluster_status, "available");
        assert_eq!(cp.calls().describe, 2);
    }

    #[test]
    fn gone_removes_cluster() {
        let cp = MockControlPlane::new()
            .with_cluster(mock_descriptor("c1", "deleting"))
            .with_describe_script([ScriptedDescribe::Gone]);
        assert!(cp.describe_cluster(&ClusterId::new("c1")).unwrap_err().is_not_found());
        assert!(cp.cluster("c1").is_none());
    }

    #[test]
    fn duplicate_ingress_rejected() {
        let cp = MockControlPlane::new();
        let rule = IngressRule::tcp_from_anywhere(5439);
        cp.authorize_ingress(MOCK_GROUP_ID, &rule).unwrap();
        assert!(cp.authorize_ingress(MOCK_GROUP_ID, &rule).unwrap_err().is_duplicate());
        assert_eq!(cp.ingress_rules().len(), 1);
    }
}

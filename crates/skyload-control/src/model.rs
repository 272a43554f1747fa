use serde::{Deserialize, Serialize};
use skyload_config::{ClusterId, ClusterType, RoleArn, RoleName};
use std::fmt;

/// Lifecycle state of a cluster as observed from the control plane.
///
/// `Deleted` is never reported by the control plane itself; it is synthesized
/// by the deprovision loop when a describe call returns not-found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Creating,
    Available,
    Deleting,
    Deleted,
    Failed,
    Unknown,
}

impl ClusterStatus {
    /// Map a raw control-plane status string onto the lifecycle states.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "deleting" | "final-snapshot" => Self::Deleting,
            "failed" | "hardware-failure" | "storage-full" => Self::Failed,
            s if s.starts_with("incompatible-") => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Snapshot of a cluster as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub cluster_identifier: ClusterId,
    pub node_type: String,
    pub number_of_nodes: u32,
    /// Raw status string; see [`ClusterDescriptor::status`].
    pub cluster_status: String,
    pub master_username: String,
    pub db_name: String,
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub iam_roles: Vec<RoleArn>,
    #[serde(default)]
    pub cluster_create_time: Option<String>,
}

impl ClusterDescriptor {
    pub fn status(&self) -> ClusterStatus {
        ClusterStatus::parse(&self.cluster_status)
    }

    /// Selected properties for display, in a stable order.
    pub fn display_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("cluster_identifier", self.cluster_identifier.to_string()),
            ("node_type", self.node_type.clone()),
            ("cluster_status", self.cluster_status.clone()),
            ("master_username", self.master_username.clone()),
            ("db_name", self.db_name.clone()),
            (
                "endpoint",
                self.endpoint
                    .as_ref()
                    .map_or_else(|| "-".to_owned(), ToString::to_string),
            ),
            ("number_of_nodes", self.number_of_nodes.to_string()),
            ("vpc_id", self.vpc_id.clone().unwrap_or_else(|| "-".to_owned())),
        ]
    }
}

/// Create-cluster request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub cluster_identifier: ClusterId,
    pub cluster_type: ClusterType,
    pub node_type: String,
    /// Only sent for multi-node clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_nodes: Option<u32>,
    pub db_name: String,
    pub master_username: String,
    pub master_user_password: String,
    pub port: u16,
    pub iam_roles: Vec<RoleArn>,
    pub publicly_accessible: bool,
}

impl fmt::Debug for ClusterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSpec")
            .field("cluster_identifier", &self.cluster_identifier)
            .field("cluster_type", &self.cluster_type)
            .field("node_type", &self.node_type)
            .field("number_of_nodes", &self.number_of_nodes)
            .field("db_name", &self.db_name)
            .field("master_username", &self.master_username)
            .field("master_user_password", &"********")
            .field("port", &self.port)
            .field("iam_roles", &self.iam_roles)
            .field("publicly_accessible", &self.publicly_accessible)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub skip_final_snapshot: bool,
    #[serde(default)]
    pub final_snapshot_identifier: Option<String>,
}

impl DeleteRequest {
    pub fn skip_snapshot() -> Self {
        Self {
            skip_final_snapshot: true,
            final_snapshot_identifier: None,
        }
    }

    pub fn with_final_snapshot(snapshot_id: &str) -> Self {
        Self {
            skip_final_snapshot: false,
            final_snapshot_identifier: Some(snapshot_id.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRole {
    pub role_name: RoleName,
    pub arn: RoleArn,
}

/// Create-role request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequest {
    pub role_name: RoleName,
    pub path: String,
    pub description: String,
    /// JSON-encoded trust policy document.
    pub assume_role_policy_document: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    pub ip_protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr_ip: String,
}

impl IngressRule {
    /// Inbound TCP on a single port from any address.
    pub fn tcp_from_anywhere(port: u16) -> Self {
        Self {
            ip_protocol: "tcp".to_owned(),
            from_port: port,
            to_port: port,
            cidr_ip: "0.0.0.0/0".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(ClusterStatus::parse("creating"), ClusterStatus::Creating);
        assert_eq!(ClusterStatus::parse("available"), ClusterStatus::Available);
        assert_eq!(ClusterStatus::parse("deleting"), ClusterStatus::Deleting);
        assert_eq!(ClusterStatus::parse("failed"), ClusterStatus::Failed);
        assert_eq!(
            ClusterStatus::parse("incompatible-network"),
            ClusterStatus::Failed
        );
        assert_eq!(ClusterStatus::parse("modifying"), ClusterStatus::Unknown);
        assert_eq!(ClusterStatus::parse(""), ClusterStatus::Unknown);
    }

    #[test]
    fn descriptor_deserializes_without_endpoint() {
        let json = r#"{
            "cluster_identifier": "dwhCluster",
            "node_type": "dc2.large",
            "number_of_nodes": 4,
            "cluster_status": "creating",
            "master_username": "dwhuser",
            "db_name": "dwh"
        }"#;
        let d: ClusterDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.status(), ClusterStatus::Creating);
        assert!(d.endpoint.is_none());
        assert!(d.iam_roles.is_empty());
    }

    #[test]
    fn display_rows_show_endpoint() {
        let d = ClusterDescriptor {
            cluster_identifier: ClusterId::new("c1"),
            node_type: "dc2.large".to_owned(),
            number_of_nodes: 1,
            cluster_status: "available".to_owned(),
            master_username: "u".to_owned(),
            db_name: "dwh".to_owned(),
            endpoint: Some(Endpoint {
                address: "c1.example.com".to_owned(),
                port: 5439,
            }),
            vpc_id: None,
            iam_roles: Vec::new(),
            cluster_create_time: None,
        };
        let rows = d.display_rows();
        assert!(rows.contains(&("endpoint", "c1.example.com:5439".to_owned())));
        assert!(rows.contains(&("vpc_id", "-".to_owned())));
    }

    #[test]
    fn cluster_spec_debug_masks_password() {
        let spec = ClusterSpec {
            cluster_identifier: ClusterId::new("c1"),
            cluster_type: ClusterType::SingleNode,
            node_type: "dc2.large".to_owned(),
            number_of_nodes: None,
            db_name: "dwh".to_owned(),
            master_username: "u".to_owned(),
            master_user_password: "hunter2".to_owned(),
            port: 5439,
            iam_roles: Vec::new(),
            publicly_accessible: true,
        };
        assert!(!format!("{spec:?}").contains("hunter2"));
        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("number_of_nodes"));
    }

    #[test]
    fn ingress_rule_from_anywhere() {
        let rule = IngressRule::tcp_from_anywhere(5439);
        assert_eq!(rule.from_port, 5439);
        assert_eq!(rule.to_port, 5439);
        assert_eq!(rule.cidr_ip, "0.0.0.0/0");
    }
}

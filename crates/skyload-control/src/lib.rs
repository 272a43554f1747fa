//! Control-plane access for skyload.
//!
//! This crate provides the `ControlPlane` trait consumed by every lifecycle
//! component, the JSON wire model shared with the reference emulator, an
//! HTTP client (`HttpControlPlane`), and a scriptable in-memory double
//! (`MockControlPlane`). Error codes returned by the control plane are
//! classified once, here, into `ControlError` variants.

pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod model;
pub mod policy;

pub use config::ControlConfig;
pub use error::{ApiFault, ControlError};
pub use http::HttpControlPlane;
pub use mock::{CallCounts, MockControlPlane, ScriptedDescribe};
pub use model::{
    ClusterDescriptor, ClusterSpec, ClusterStatus, DeleteRequest, Endpoint, IngressRule,
    RoleRequest, SecurityGroup, TrustRole,
};

/// Protocol version sent as `X-Skyload-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

use skyload_config::{ClusterId, RoleName};

/// Operations the lifecycle components need from the remote control plane.
///
/// Implementations must report a missing resource as [`ControlError::NotFound`],
/// an already-present idempotent resource as [`ControlError::Duplicate`], and
/// retryable failures as [`ControlError::Transient`].
pub trait ControlPlane: Send + Sync {
    fn get_role(&self, name: &RoleName) -> Result<TrustRole, ControlError>;

    fn create_role(&self, request: &RoleRequest) -> Result<TrustRole, ControlError>;

    fn attach_role_policy(&self, name: &RoleName, policy_arn: &str) -> Result<(), ControlError>;

    /// Request cluster creation. Returns as soon as the request is accepted.
    fn create_cluster(&self, spec: &ClusterSpec) -> Result<ClusterDescriptor, ControlError>;

    fn describe_cluster(&self, id: &ClusterId) -> Result<ClusterDescriptor, ControlError>;

    /// Request cluster deletion. Returns as soon as the request is accepted.
    fn delete_cluster(
        &self,
        id: &ClusterId,
        request: &DeleteRequest,
    ) -> Result<ClusterDescriptor, ControlError>;

    fn list_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ControlError>;

    fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<(), ControlError>;
}

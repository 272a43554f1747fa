use crate::CoreError;
use skyload_config::RoleName;
use skyload_control::policy::{self, S3_READ_ONLY_POLICY_ARN};
use skyload_control::{ControlError, ControlPlane, TrustRole};
use tracing::info;

/// Ensures the trust role the warehouse assumes for bulk loads exists.
pub struct IdentityBroker<'a> {
    control: &'a dyn ControlPlane,
}

impl<'a> IdentityBroker<'a> {
    pub fn new(control: &'a dyn ControlPlane) -> Self {
        Self { control }
    }

    /// Return the existing role unchanged, or create it with the fixed trust
    /// document and attach the read-only storage policy.
    ///
    /// An existing role is not re-checked for its attached policy. If the
    /// policy attach fails after the role was created, the role is left in
    /// place and `CoreError::PolicyAttach` is returned.
    pub fn ensure_role(&self, name: &RoleName) -> Result<TrustRole, CoreError> {
        match self.control.get_role(name) {
            Ok(role) => {
                info!("trust role {name} already exists ({})", role.arn);
                return Ok(role);
            }
            Err(ControlError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        info!("creating trust role {name}");
        let role = self.control.create_role(&policy::role_request(name))?;
        self.control
            .attach_role_policy(name, S3_READ_ONLY_POLICY_ARN)
            .map_err(|source| CoreError::PolicyAttach {
                role: name.clone(),
                arn: S3_READ_ONLY_POLICY_ARN.to_owned(),
                source,
            })?;
        info!("attached {S3_READ_ONLY_POLICY_ARN} to {name}");
        Ok(role)
    }
}

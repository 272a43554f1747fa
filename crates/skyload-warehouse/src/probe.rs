use crate::connector::{ConnectTarget, Connector, Session};
use crate::WarehouseError;
use serde::Serialize;
use skyload_config::ClusterSection;
use skyload_control::ClusterDescriptor;
use tracing::{info, warn};

/// Outcome of a single connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub passed: bool,
    pub target: String,
    pub error: Option<String>,
}

/// Opens a real session against a cluster endpoint with the admin
/// credentials and closes it again. Never retries.
pub struct ConnectivityValidator<'a> {
    connector: &'a dyn Connector,
    database: String,
    username: String,
    password: String,
}

impl<'a> ConnectivityValidator<'a> {
    pub fn new(connector: &'a dyn Connector, database: &str, username: &str, password: &str) -> Self {
        Self {
            connector,
            database: database.to_owned(),
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    pub fn from_settings(connector: &'a dyn Connector, cluster: &ClusterSection) -> Self {
        Self::new(
            connector,
            &cluster.db_name,
            &cluster.db_user,
            &cluster.db_password,
        )
    }

    pub fn target_for(&self, descriptor: &ClusterDescriptor) -> Result<ConnectTarget, WarehouseError> {
        let endpoint = descriptor
            .endpoint
            .as_ref()
            .ok_or_else(|| WarehouseError::NoEndpoint(descriptor.cluster_identifier.to_string()))?;
        Ok(ConnectTarget {
            host: endpoint.address.clone(),
            port: endpoint.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }

    /// Open a session for statement execution.
    pub fn open_session(
        &self,
        descriptor: &ClusterDescriptor,
    ) -> Result<Box<dyn Session>, WarehouseError> {
        let target = self.target_for(descriptor)?;
        self.connector.connect(&target)
    }

    pub fn test_connection(&self, descriptor: &ClusterDescriptor) -> ProbeResult {
        let target = match self.target_for(descriptor) {
            Ok(t) => t,
            Err(e) => {
                warn!("connection test skipped: {e}");
                return ProbeResult {
                    passed: false,
                    target: descriptor.cluster_identifier.to_string(),
                    error: Some(e.to_string()),
                };
            }
        };
        let shown = target.display_target();
        let outcome = self
            .connector
            .connect(&target)
            .and_then(|session| session.close());
        match outcome {
            Ok(()) => {
                info!("{} connection to {shown} succeeded", self.connector.name());
                ProbeResult {
                    passed: true,
                    target: shown,
                    error: None,
                }
            }
            Err(e) => {
                warn!("{} connection to {shown} failed: {e}", self.connector.name());
                ProbeResult {
                    passed: false,
                    target: shown,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

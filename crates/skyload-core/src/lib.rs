//! Cluster lifecycle orchestration for skyload.
//!
//! This crate ties the control-plane client and the warehouse layer together
//! into the lifecycle components (`IdentityBroker`, `ClusterProvisioner`,
//! `AvailabilityPoller`, `NetworkAccessManager`, `DeprovisionOrchestrator`)
//! and the `Orchestrator` that sequences them per command mode. Both polling
//! paths share the cancellable, time-bounded `poll::poll_until` primitive.

pub mod availability;
pub mod deprovision;
pub mod identity;
pub mod network;
pub mod orchestrator;
pub mod poll;
pub mod provision;

pub use availability::AvailabilityPoller;
pub use deprovision::{DeleteReport, DeprovisionOrchestrator};
pub use identity::IdentityBroker;
pub use network::{IngressOutcome, NetworkAccessManager};
pub use orchestrator::{CreateReport, Orchestrator, StatusReport, Step};
pub use poll::{
    install_signal_handler, poll_until, CancelToken, PollPolicy, PollStep, Polled,
    RecordingSleeper, Sleeper, ThreadSleeper,
};
pub use provision::ClusterProvisioner;

use serde::Serialize;
use skyload_config::{ClusterId, ConfigError, RoleName};
use skyload_control::ControlError;
use skyload_warehouse::WarehouseError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of every error the lifecycle can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Duplicate,
    Timeout,
    TransientQueryFailure,
    Fatal,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
            Self::Timeout => "timeout",
            Self::TransientQueryFailure => "transient_query_failure",
            Self::Fatal => "fatal",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ControlError> for ErrorKind {
    fn from(err: &ControlError) -> Self {
        match err {
            ControlError::NotFound(_) => Self::NotFound,
            ControlError::Duplicate(_) => Self::Duplicate,
            ControlError::Transient(_) => Self::TransientQueryFailure,
            ControlError::Rejected(_) | ControlError::Serialization(_) => Self::Fatal,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("control plane error: {0}")]
    Control(#[from] ControlError),
    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),
    #[error("role '{role}' was created but attaching policy {arn} failed: {source}")]
    PolicyAttach {
        role: RoleName,
        arn: String,
        #[source]
        source: ControlError,
    },
    #[error("cluster '{identifier}' entered status '{status}'")]
    ClusterFailed { identifier: ClusterId, status: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error(
        "timed out waiting for '{identifier}' after {}s (last status: {last_status})",
        .elapsed.as_secs()
    )]
    Timeout {
        identifier: String,
        elapsed: Duration,
        last_status: String,
    },
    #[error("cancelled while waiting for '{identifier}' after {}s", .elapsed.as_secs())]
    Cancelled {
        identifier: String,
        elapsed: Duration,
    },
    #[error("invalid poll policy: {0}")]
    InvalidPolicy(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Control(e) => ErrorKind::from(e),
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Config(_)
            | Self::Warehouse(_)
            | Self::PolicyAttach { .. }
            | Self::ClusterFailed { .. }
            | Self::InvalidPolicy(_) => ErrorKind::Fatal,
        }
    }
}

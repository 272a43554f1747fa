//! Warehouse access for skyload.
//!
//! This crate implements everything that talks to the warehouse over its
//! SQL wire protocol: the pluggable `Connector`/`Session` traits with a
//! PostgreSQL-protocol implementation (`PgConnector`) and a recording test
//! double (`MockConnector`), the `ConnectivityValidator` probe, the fixed
//! star-schema statement catalogue, and the `SchemaPipeline` that runs it.

pub mod connector;
pub mod mock;
pub mod pipeline;
pub mod postgres;
pub mod probe;
pub mod sql;

pub use connector::{ConnectTarget, Connector, Session};
pub use mock::MockConnector;
pub use pipeline::{
    PipelineReport, SchemaPipeline, Stage, StageReport, StageSelection, StatementReport,
};
pub use postgres::PgConnector;
pub use probe::{ConnectivityValidator, ProbeResult};
pub use sql::{CopySource, Statement};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot connect to {target}: {reason}")]
    Connect { target: String, reason: String },
    #[error("statement failed ({context}): {reason}")]
    Statement { context: String, reason: String },
    #[error("cluster '{0}' has no endpoint yet")]
    NoEndpoint(String),
}

use crate::WarehouseError;
use std::fmt;

/// Where and as whom to open a warehouse session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl ConnectTarget {
    /// `user@host:port/database`, safe for logs.
    pub fn display_target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// An open warehouse session.
pub trait Session {
    /// Run one statement and return the number of rows it affected.
    fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError>;

    /// Run a query whose rows are a single text column.
    fn query_text(&mut self, sql: &str) -> Result<Vec<String>, WarehouseError>;

    fn close(self: Box<Self>) -> Result<(), WarehouseError>;
}

pub trait Connector: Send + Sync {
    /// Short backend name used in log lines.
    fn name(&self) -> &str;

    fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Session>, WarehouseError>;
}

use crate::connector::{ConnectTarget, Connector, Session};
use crate::WarehouseError;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{Connection, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgreSQL wire-protocol connector.
///
/// The warehouse API is blocking, so the connector owns a current-thread
/// tokio runtime and drives sqlx futures to completion on it.
pub struct PgConnector {
    runtime: Arc<tokio::runtime::Runtime>,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new() -> Result<Self, WarehouseError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Connector for PgConnector {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Session>, WarehouseError> {
        let options = PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.username)
            .password(&target.password)
            .database(&target.database)
            .ssl_mode(PgSslMode::Prefer);

        debug!("connecting to {}", target.display_target());
        let connect_error = |reason: String| WarehouseError::Connect {
            target: target.display_target(),
            reason,
        };
        let conn = self
            .runtime
            .block_on(async {
                tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
                    .await
            })
            .map_err(|_| {
                connect_error(format!(
                    "timed out after {}s",
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| connect_error(e.to_string()))?;

        Ok(Box::new(PgSession {
            conn,
            runtime: Arc::clone(&self.runtime),
        }))
    }
}

struct PgSession {
    conn: PgConnection,
    runtime: Arc<tokio::runtime::Runtime>,
}

impl Session for PgSession {
    fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        let result = self
            .runtime
            .block_on(sqlx::raw_sql(sql).execute(&mut self.conn))
            .map_err(|e| WarehouseError::Statement {
                context: first_line(sql),
                reason: e.to_string(),
            })?;
        Ok(result.rows_affected())
    }

    fn query_text(&mut self, sql: &str) -> Result<Vec<String>, WarehouseError> {
        let statement_error = |reason: String| WarehouseError::Statement {
            context: first_line(sql),
            reason,
        };
        let rows = self
            .runtime
            .block_on(sqlx::raw_sql(sql).fetch_all(&mut self.conn))
            .map_err(|e| statement_error(e.to_string()))?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| statement_error(e.to_string()))
            })
            .collect()
    }

    fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        let session = *self;
        session
            .runtime
            .block_on(session.conn.close())
            .map_err(|e| WarehouseError::Statement {
                context: "close".to_owned(),
                reason: e.to_string(),
            })
    }
}

fn first_line(sql: &str) -> String {
    sql.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_owned()
}

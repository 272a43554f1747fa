use crate::connector::{ConnectTarget, Connector, Session};
use crate::WarehouseError;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Recorded {
    connects: Vec<ConnectTarget>,
    statements: Vec<String>,
    closed: usize,
}

/// Connector that records every session and statement instead of talking
/// to a warehouse.
#[derive(Default, Clone)]
pub struct MockConnector {
    recorded: Arc<Mutex<Recorded>>,
    refuse: Option<String>,
    fail_on: Option<String>,
    rows_per_statement: u64,
    query_rows: Vec<String>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every connection with the given reason.
    #[must_use]
    pub fn refusing(mut self, reason: &str) -> Self {
        self.refuse = Some(reason.to_owned());
        self
    }

    /// Fail any statement whose text contains `needle`.
    #[must_use]
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_owned());
        self
    }

    #[must_use]
    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows_per_statement = rows;
        self
    }

    /// Rows returned by every text query.
    #[must_use]
    pub fn with_query_rows(mut self, rows: &[&str]) -> Self {
        self.query_rows = rows.iter().map(|r| (*r).to_owned()).collect();
        self
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn connects(&self) -> Vec<ConnectTarget> {
        self.lock().connects.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.lock().closed
    }
}

impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Session>, WarehouseError> {
        self.lock().connects.push(target.clone());
        if let Some(ref reason) = self.refuse {
            return Err(WarehouseError::Connect {
                target: target.display_target(),
                reason: reason.clone(),
            });
        }
        Ok(Box::new(MockSession {
            connector: self.clone(),
        }))
    }
}

struct MockSession {
    connector: MockConnector,
}

impl Session for MockSession {
    fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        self.connector.lock().statements.push(sql.to_owned());
        if let Some(ref needle) = self.connector.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(WarehouseError::Statement {
                    context: needle.clone(),
                    reason: "mock failure".to_owned(),
                });
            }
        }
        Ok(self.connector.rows_per_statement)
    }

    fn query_text(&mut self, sql: &str) -> Result<Vec<String>, WarehouseError> {
        self.connector.lock().statements.push(sql.to_owned());
        Ok(self.connector.query_rows.clone())
    }

    fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        self.connector.lock().closed += 1;
        Ok(())
    }
}

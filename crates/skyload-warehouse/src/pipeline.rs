use crate::connector::Session;
use crate::sql::{self, CopySource, Statement};
use crate::WarehouseError;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// One ordered group of pipeline statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Drop,
    Create,
    Copy,
    Insert,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Create => "create",
            Self::Copy => "copy",
            Self::Insert => "insert",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StageSelection {
    #[default]
    All,
    /// Drop and recreate every table.
    Schema,
    /// Bulk load staging tables and populate the star schema.
    Load,
}

impl StageSelection {
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::All => &[Stage::Drop, Stage::Create, Stage::Copy, Stage::Insert],
            Self::Schema => &[Stage::Drop, Stage::Create],
            Self::Load => &[Stage::Copy, Stage::Insert],
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "all" => Some(Self::All),
            "schema" => Some(Self::Schema),
            "load" => Some(Self::Load),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementReport {
    pub table: &'static str,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub statements: Vec<StatementReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn statement_count(&self) -> usize {
        self.stages.iter().map(|s| s.statements.len()).sum()
    }
}

/// Runs the star-schema statement groups in their fixed order.
pub struct SchemaPipeline {
    source: CopySource,
}

impl SchemaPipeline {
    pub fn new(source: CopySource) -> Self {
        Self { source }
    }

    pub fn statements(&self, stage: Stage) -> Vec<Statement> {
        match stage {
            Stage::Drop => sql::drop_statements(),
            Stage::Create => sql::create_statements(),
            Stage::Copy => sql::copy_statements(&self.source),
            Stage::Insert => sql::insert_statements(),
        }
    }

    /// Every statement the selection would run, in execution order.
    pub fn plan(&self, selection: StageSelection) -> Vec<(Stage, Vec<Statement>)> {
        selection
            .stages()
            .iter()
            .map(|&stage| (stage, self.statements(stage)))
            .collect()
    }

    /// Execute the selected stages, stopping at the first failing statement.
    pub fn run(
        &self,
        session: &mut dyn Session,
        selection: StageSelection,
    ) -> Result<PipelineReport, WarehouseError> {
        let mut report = PipelineReport::default();
        for (stage, statements) in self.plan(selection) {
            info!("pipeline stage {stage}: {} statements", statements.len());
            let mut stage_report = StageReport {
                stage,
                statements: Vec::with_capacity(statements.len()),
            };
            for statement in statements {
                debug!("{stage} {}", statement.table);
                let rows = session.execute(&statement.sql).map_err(|e| {
                    let mut reason = match e {
                        WarehouseError::Statement { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    if stage == Stage::Copy {
                        append_load_errors(session, &mut reason);
                    }
                    WarehouseError::Statement {
                        context: format!("{stage} {}", statement.table),
                        reason,
                    }
                })?;
                stage_report.statements.push(StatementReport {
                    table: statement.table,
                    rows,
                });
            }
            report.stages.push(stage_report);
        }
        Ok(report)
    }
}

/// Attach the most recent rejected rows to a failed COPY.
fn append_load_errors(session: &mut dyn Session, reason: &mut String) {
    match session.query_text(sql::RECENT_LOAD_ERRORS) {
        Ok(rows) if !rows.is_empty() => {
            reason.push_str("; recent load errors: ");
            reason.push_str(&rows.join(" | "));
        }
        Ok(_) => {}
        Err(e) => debug!("cannot read load errors: {e}"),
    }
}

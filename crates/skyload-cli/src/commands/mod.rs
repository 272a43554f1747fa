pub mod completions;
pub mod create;
pub mod delete;
pub mod etl;
pub mod man_pages;
pub mod settings;
pub mod status;

use indicatif::{ProgressBar, ProgressStyle};
use skyload_config::{ConfigError, Settings};
use skyload_control::{ControlConfig, HttpControlPlane};
use skyload_core::{CancelToken, CoreError, ErrorKind, Orchestrator, ThreadSleeper};
use skyload_warehouse::{PgConnector, ProbeResult, WarehouseError};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_CONTROL_ERROR: u8 = 3;
pub const EXIT_TIMEOUT: u8 = 4;
pub const EXIT_PROBE_FAILED: u8 = 5;

/// A command failure with the exit code it maps to.
#[derive(Debug)]
pub struct Failure {
    pub code: u8,
    pub message: String,
}

impl Failure {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::new(EXIT_FAILURE, message)
    }
}

impl From<ConfigError> for Failure {
    fn from(e: ConfigError) -> Self {
        Self::new(EXIT_CONFIG_ERROR, e.to_string())
    }
}

impl From<WarehouseError> for Failure {
    fn from(e: WarehouseError) -> Self {
        Self::new(EXIT_FAILURE, e.to_string())
    }
}

impl From<CoreError> for Failure {
    fn from(e: CoreError) -> Self {
        let code = match (&e, e.kind()) {
            (CoreError::Config(_), _) => EXIT_CONFIG_ERROR,
            (CoreError::Warehouse(_), _) => EXIT_FAILURE,
            (_, ErrorKind::Timeout | ErrorKind::Cancelled) => EXIT_TIMEOUT,
            _ => EXIT_CONTROL_ERROR,
        };
        Self::new(code, e.to_string())
    }
}

pub type CommandResult = Result<u8, Failure>;

/// Everything a lifecycle command needs, built once from the settings file.
pub struct Context {
    pub settings: Settings,
    control: HttpControlPlane,
    connector: PgConnector,
    sleeper: ThreadSleeper,
    cancel: CancelToken,
}

impl Context {
    pub fn load(config: &Path, cancel: CancelToken) -> Result<Self, Failure> {
        let settings = Settings::load(config)?;
        let control = HttpControlPlane::new(ControlConfig::from_settings(&settings));
        let connector = PgConnector::new()?;
        Ok(Self {
            settings,
            control,
            connector,
            sleeper: ThreadSleeper,
            cancel,
        })
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            &self.settings,
            &self.control,
            &self.connector,
            &self.sleeper,
            self.cancel.clone(),
        )
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Run `op` behind a spinner unless output is JSON.
pub fn with_spinner<T>(
    json: bool,
    running: &str,
    done: &str,
    op: impl FnOnce(Option<&ProgressBar>) -> Result<T, CoreError>,
) -> Result<T, Failure> {
    let pb = if json { None } else { Some(spinner(running)) };
    match op(pb.as_ref()) {
        Ok(value) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, done);
            }
            Ok(value)
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{running} failed"));
            }
            Err(e.into())
        }
    }
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "available" => Style::new().green().apply_to(status).to_string(),
        "creating" | "deleting" | "final-snapshot" => {
            Style::new().yellow().apply_to(status).to_string()
        }
        "deleted" => Style::new().dim().apply_to(status).to_string(),
        "failed" | "hardware-failure" | "storage-full" => {
            Style::new().red().bold().apply_to(status).to_string()
        }
        other => other.to_owned(),
    }
}

/// Print a probe result and pick the exit code for it.
pub fn report_probe(probe: &ProbeResult) -> u8 {
    if probe.passed {
        println!(
            "connection:  {} {}",
            console::Style::new().green().apply_to("ok"),
            probe.target
        );
        EXIT_SUCCESS
    } else {
        println!(
            "connection:  {} {}: {}",
            console::Style::new().red().apply_to("failed"),
            probe.target,
            probe.error.as_deref().unwrap_or("unknown error")
        );
        EXIT_PROBE_FAILED
    }
}

pub fn probe_exit_code(probe: &ProbeResult) -> u8 {
    if probe.passed {
        EXIT_SUCCESS
    } else {
        EXIT_PROBE_FAILED
    }
}

pub fn print_rows(rows: &[(&'static str, String)]) {
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        println!("{key:<width$}  {value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyload_config::ClusterId;
    use skyload_control::ControlError;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"cluster": "dwhCluster"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"cluster\""));
        assert!(result.contains("\"dwhCluster\""));
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_CONFIG_ERROR,
            EXIT_CONTROL_ERROR,
            EXIT_TIMEOUT,
            EXIT_PROBE_FAILED,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn core_errors_map_to_exit_codes() {
        let timeout = CoreError::Timeout {
            identifier: "c1".to_owned(),
            elapsed: Duration::from_secs(60),
            last_status: "creating".to_owned(),
        };
        assert_eq!(Failure::from(timeout).code, EXIT_TIMEOUT);

        let cancelled = CoreError::Cancelled {
            identifier: "c1".to_owned(),
            elapsed: Duration::from_secs(30),
        };
        assert_eq!(Failure::from(cancelled).code, EXIT_TIMEOUT);

        let rejected = CoreError::from(ControlError::rejected("ClusterAlreadyExists", "exists"));
        assert_eq!(Failure::from(rejected).code, EXIT_CONTROL_ERROR);

        let failed = CoreError::ClusterFailed {
            identifier: ClusterId::new("c1"),
            status: "failed".to_owned(),
        };
        assert_eq!(Failure::from(failed).code, EXIT_CONTROL_ERROR);

        let warehouse = CoreError::from(WarehouseError::NoEndpoint("c1".to_owned()));
        assert_eq!(Failure::from(warehouse).code, EXIT_FAILURE);
    }

    #[test]
    fn missing_settings_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Context::load(&dir.path().join("absent.toml"), CancelToken::new())
            .err()
            .unwrap();
        assert_eq!(err.code, EXIT_CONFIG_ERROR);
    }

    #[test]
    fn probe_codes() {
        let ok = ProbeResult {
            passed: true,
            target: "dwhuser@h:5439/dwh".to_owned(),
            error: None,
        };
        let bad = ProbeResult {
            passed: false,
            error: Some("refused".to_owned()),
            ..ok.clone()
        };
        assert_eq!(probe_exit_code(&ok), EXIT_SUCCESS);
        assert_eq!(probe_exit_code(&bad), EXIT_PROBE_FAILED);
    }

    #[test]
    fn colorize_status_keeps_text() {
        for s in ["available", "creating", "deleting", "deleted", "failed"] {
            assert!(colorize_status(s).contains(s));
        }
        assert_eq!(colorize_status("modifying"), "modifying");
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}

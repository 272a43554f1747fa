use crate::types::{ClusterId, RoleArn, RoleName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SETTINGS_FILE: &str = "skyload.toml";

/// Environment variable overriding `aws.key`.
pub const ENV_AWS_KEY: &str = "SKYLOAD_AWS_KEY";
/// Environment variable overriding `aws.secret`.
pub const ENV_AWS_SECRET: &str = "SKYLOAD_AWS_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub aws: AwsSection,
    pub cluster: ClusterSection,
    pub iam: IamSection,
    #[serde(default)]
    pub s3: S3Section,
    #[serde(default)]
    pub polling: PollingSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AwsSection {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Base URL of the control-plane API.
    pub endpoint: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterType {
    SingleNode,
    MultiNode,
}

impl ClusterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleNode => "single-node",
            Self::MultiNode => "multi-node",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClusterSection {
    pub cluster_type: ClusterType,
    pub node_type: String,
    #[serde(default = "default_num_nodes")]
    pub num_nodes: u32,
    pub identifier: ClusterId,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

// Keeps the admin password out of debug logs.
impl fmt::Debug for ClusterSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSection")
            .field("cluster_type", &self.cluster_type)
            .field("node_type", &self.node_type)
            .field("num_nodes", &self.num_nodes)
            .field("identifier", &self.identifier)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"********")
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IamSection {
    pub role_name: RoleName,
    /// Known role ARN; when absent it is resolved through the control plane.
    #[serde(default)]
    pub role_arn: Option<RoleArn>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct S3Section {
    #[serde(default = "default_log_data")]
    pub log_data: String,
    #[serde(default = "default_log_jsonpath")]
    pub log_jsonpath: String,
    #[serde(default = "default_song_data")]
    pub song_data: String,
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for S3Section {
    fn default() -> Self {
        Self {
            log_data: default_log_data(),
            log_jsonpath: default_log_jsonpath(),
            song_data: default_song_data(),
            region: default_region(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PollingSection {
    #[serde(default = "default_create_interval")]
    pub create_interval_secs: u64,
    #[serde(default = "default_create_timeout")]
    pub create_timeout_secs: u64,
    #[serde(default = "default_delete_interval")]
    pub delete_interval_secs: u64,
    #[serde(default = "default_delete_timeout")]
    pub delete_timeout_secs: u64,
    /// Pause between opening ingress and the first connection attempt.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            create_interval_secs: default_create_interval(),
            create_timeout_secs: default_create_timeout(),
            delete_interval_secs: default_delete_interval(),
            delete_timeout_secs: default_delete_timeout(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

impl PollingSection {
    pub fn create_interval(&self) -> Duration {
        Duration::from_secs(self.create_interval_secs)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    pub fn delete_interval(&self) -> Duration {
        Duration::from_secs(self.delete_interval_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

fn default_region() -> String {
    "us-west-2".to_owned()
}

fn default_num_nodes() -> u32 {
    1
}

fn default_port() -> u16 {
    5439
}

fn default_log_data() -> String {
    "s3://udacity-dend/log_data".to_owned()
}

fn default_log_jsonpath() -> String {
    "s3://udacity-dend/log_json_path.json".to_owned()
}

fn default_song_data() -> String {
    "s3://udacity-dend/song_data".to_owned()
}

fn default_create_interval() -> u64 {
    30
}

fn default_create_timeout() -> u64 {
    1800
}

fn default_delete_interval() -> u64 {
    20
}

fn default_delete_timeout() -> u64 {
    900
}

fn default_settle_delay() -> u64 {
    20
}

impl Settings {
    /// Read a settings file, apply access-key overrides from the process
    /// environment, then validate the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`Settings::load`] with overrides taken from `lookup`.
    pub fn load_with(
        path: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        let settings = settings.with_env_overrides(lookup);
        settings.validate()?;
        Ok(settings)
    }

    /// Replace `aws.key` / `aws.secret` with values from `lookup` when set.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(ENV_AWS_KEY).filter(|v| !v.is_empty()) {
            self.aws.key = Some(key);
        }
        if let Some(secret) = lookup(ENV_AWS_SECRET).filter(|v| !v.is_empty()) {
            self.aws.secret = Some(secret);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aws.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("aws.endpoint", "must not be empty"));
        }
        if self.aws.key.is_some() != self.aws.secret.is_some() {
            return Err(ConfigError::invalid(
                "aws.key",
                "key and secret must be given together",
            ));
        }

        validate_identifier(&self.cluster.identifier)?;
        if self.cluster.node_type.trim().is_empty() {
            return Err(ConfigError::invalid("cluster.node_type", "must not be empty"));
        }
        for (field, value) in [
            ("cluster.db_name", &self.cluster.db_name),
            ("cluster.db_user", &self.cluster.db_user),
            ("cluster.db_password", &self.cluster.db_password),
        ] {
            if value.is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        if self.cluster.num_nodes == 0 {
            return Err(ConfigError::invalid("cluster.num_nodes", "must be at least 1"));
        }
        if self.cluster.cluster_type == ClusterType::SingleNode && self.cluster.num_nodes > 1 {
            return Err(ConfigError::invalid(
                "cluster.num_nodes",
                format!(
                    "single-node clusters cannot have {} nodes",
                    self.cluster.num_nodes
                ),
            ));
        }
        if self.cluster.cluster_type == ClusterType::MultiNode && self.cluster.num_nodes < 2 {
            return Err(ConfigError::invalid(
                "cluster.num_nodes",
                format!(
                    "multi-node clusters need at least 2 nodes, got {}",
                    self.cluster.num_nodes
                ),
            ));
        }
        if self.cluster.port == 0 {
            return Err(ConfigError::invalid("cluster.port", "must not be 0"));
        }
        if self.iam.role_name.is_empty() {
            return Err(ConfigError::invalid("iam.role_name", "must not be empty"));
        }

        for (field, value) in [
            ("s3.log_data", &self.s3.log_data),
            ("s3.log_jsonpath", &self.s3.log_jsonpath),
            ("s3.song_data", &self.s3.song_data),
        ] {
            if !value.starts_with("s3://") {
                return Err(ConfigError::invalid(
                    field,
                    format!("'{value}' is not an s3:// path"),
                ));
            }
        }

        let p = &self.polling;
        validate_window(
            "polling.create_interval_secs",
            p.create_interval_secs,
            p.create_timeout_secs,
        )?;
        validate_window(
            "polling.delete_interval_secs",
            p.delete_interval_secs,
            p.delete_timeout_secs,
        )?;
        Ok(())
    }

    /// Access key pair for the control plane, if configured.
    pub fn access_keys(&self) -> Option<(&str, &str)> {
        match (&self.aws.key, &self.aws.secret) {
            (Some(k), Some(s)) => Some((k.as_str(), s.as_str())),
            _ => None,
        }
    }

    /// Parameter table with the admin password masked.
    pub fn display_rows(&self) -> Vec<(&'static str, String)> {
        let c = &self.cluster;
        vec![
            ("cluster_type", c.cluster_type.to_string()),
            ("num_nodes", c.num_nodes.to_string()),
            ("node_type", c.node_type.clone()),
            ("identifier", c.identifier.to_string()),
            ("db_name", c.db_name.clone()),
            ("db_user", c.db_user.clone()),
            ("db_password", "*".repeat(c.db_password.len().min(8))),
            ("port", c.port.to_string()),
            ("role_name", self.iam.role_name.to_string()),
            ("region", self.aws.region.clone()),
            ("endpoint", self.aws.endpoint.clone()),
        ]
    }
}

fn validate_identifier(id: &ClusterId) -> Result<(), ConfigError> {
    let Some(first) = id.chars().next() else {
        return Err(ConfigError::invalid("cluster.identifier", "must not be empty"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(ConfigError::invalid(
            "cluster.identifier",
            format!("'{id}' must start with a letter"),
        ));
    }
    if let Some(bad) = id.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
        return Err(ConfigError::invalid(
            "cluster.identifier",
            format!("'{id}' contains invalid character '{bad}'"),
        ));
    }
    Ok(())
}

fn validate_window(field: &'static str, interval: u64, timeout: u64) -> Result<(), ConfigError> {
    if interval == 0 {
        return Err(ConfigError::invalid(field, "interval must be positive"));
    }
    if timeout < interval {
        return Err(ConfigError::invalid(
            field,
            format!("timeout {timeout}s is shorter than interval {interval}s"),
        ));
    }
    Ok(())
}

pub fn parse_settings_str(input: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(input)?;
    settings.validate()?;
    Ok(settings)
}

pub fn parse_settings_file(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_settings_str(&content)
}

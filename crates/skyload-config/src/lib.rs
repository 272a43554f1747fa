//! Settings and identifier types for skyload.
//!
//! This crate defines the configuration layer: TOML settings parsing
//! (`Settings`), post-parse validation, environment overrides for access
//! keys, and the newtype identifiers (`ClusterId`, `RoleName`, `RoleArn`)
//! shared by every other crate in the workspace.

pub mod settings;
pub mod types;

pub use settings::{
    parse_settings_file, parse_settings_str, AwsSection, ClusterSection, ClusterType, ConfigError,
    IamSection, PollingSection, S3Section, Settings, DEFAULT_SETTINGS_FILE, ENV_AWS_KEY,
    ENV_AWS_SECRET,
};
pub use types::{ClusterId, RoleArn, RoleName};

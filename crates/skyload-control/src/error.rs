use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error body returned by the control plane: `{"code": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFault {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ApiFault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// Codes that mean the addressed resource does not exist.
pub const NOT_FOUND_CODES: &[&str] = &[
    "ClusterNotFound",
    "NoSuchEntity",
    "InvalidGroup.NotFound",
    "InvalidVpcID.NotFound",
];

/// Codes that mean an identical resource is already present.
pub const DUPLICATE_CODES: &[&str] = &["InvalidPermission.Duplicate", "EntityAlreadyExists"];

/// Codes that mean the request may succeed if simply repeated later.
pub const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "InternalFailure",
];

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("not found: {0}")]
    NotFound(ApiFault),
    #[error("already exists: {0}")]
    Duplicate(ApiFault),
    #[error("transient control-plane failure: {0}")]
    Transient(String),
    #[error("request rejected: {0}")]
    Rejected(ApiFault),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ControlError {
    /// Classify an error response by its code, falling back to the HTTP status.
    pub fn from_fault(status: u16, fault: ApiFault) -> Self {
        let code = fault.code.as_str();
        if NOT_FOUND_CODES.contains(&code) || (code.is_empty() && status == 404) {
            Self::NotFound(fault)
        } else if DUPLICATE_CODES.contains(&code) {
            Self::Duplicate(fault)
        } else if TRANSIENT_CODES.contains(&code) || status == 429 || status >= 500 {
            Self::Transient(format!("HTTP {status}: {fault}"))
        } else {
            Self::Rejected(fault)
        }
    }

    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self::NotFound(ApiFault::new(code, message))
    }

    pub fn duplicate(code: &str, message: impl Into<String>) -> Self {
        Self::Duplicate(ApiFault::new(code, message))
    }

    pub fn rejected(code: &str, message: impl Into<String>) -> Self {
        Self::Rejected(ApiFault::new(code, message))
    }

    /// The control-plane error code, when the error came from a fault body.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::NotFound(f) | Self::Duplicate(f) | Self::Rejected(f) => Some(&f.code),
            Self::Transient(_) | Self::Serialization(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

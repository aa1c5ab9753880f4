//! Error handling module
//!
//! Structured error types for the graph engine. Routine lookups that find
//! nothing return `Option`; these variants cover malformed input and the
//! structural problems that must abort a load.

use thiserror::Error;

/// Main error type for entity store and codec operations
#[derive(Error, Debug)]
pub enum PwnError {
    /// Binary or textual SID that does not follow the MS-DTYP layout
    #[error("Invalid SID: {0}")]
    InvalidSid(String),

    /// GUID that is not 16 bytes or not parseable text
    #[error("Invalid GUID: {0}")]
    InvalidGuid(String),

    /// Distinguished name with unbalanced escaping or no components
    #[error("Invalid distinguished name: {0}")]
    InvalidDistinguishedName(String),

    /// Object has no cached security descriptor
    #[error("No security descriptor on {0}")]
    NoSecurityDescriptor(String),

    /// Object cannot be indexed because it has neither a DN nor a SID
    #[error("Object {0} has no distinguished name and no SID to derive one from")]
    MissingDistinguishedName(u32),

    /// Loader-supplied security descriptor parser failed
    #[error("Failed to parse security descriptor: {0}")]
    DescriptorParse(String),

    /// Unknown technique name in a filter list
    #[error("Unknown pwn method: {0}")]
    UnknownMethod(String),

    /// Snapshot producer failed during bulk loading
    #[error("Load failed: {0}")]
    LoadFailed(String),

    /// Invalid configuration document
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<anyhow::Error> for PwnError {
    fn from(err: anyhow::Error) -> Self {
        PwnError::DescriptorParse(err.to_string())
    }
}

impl From<serde_json::Error> for PwnError {
    fn from(err: serde_json::Error) -> Self {
        PwnError::ConfigError(format!("JSON parse error: {}", err))
    }
}

/// Result type alias for graph engine operations
pub type Result<T> = std::result::Result<T, PwnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PwnError::InvalidSid("S-1".to_string());
        assert_eq!(err.to_string(), "Invalid SID: S-1");

        let err = PwnError::NoSecurityDescriptor("CN=Bob,DC=corp,DC=local".to_string());
        assert_eq!(err.to_string(), "No security descriptor on CN=Bob,DC=corp,DC=local");

        let err = PwnError::MissingDistinguishedName(17);
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn test_anyhow_error_conversion() {
        let anyhow_err = anyhow::anyhow!("truncated ACL");
        let err: PwnError = anyhow_err.into();
        assert!(matches!(err, PwnError::DescriptorParse(ref m) if m == "truncated ACL"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PwnError = json_err.into();
        assert!(matches!(err, PwnError::ConfigError(_)));
    }
}

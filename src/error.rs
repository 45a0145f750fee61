//! Error types for the basket batch submitter.

use thiserror::Error;

/// Result type alias using the caddie error type.
pub type Result<T> = std::result::Result<T, CaddieError>;

/// Main error type for the submitter.
///
/// Only conditions that stop a run (or a CLI command) before it starts live here.
/// Per-item failures during a run are data, see [`crate::domain::outcome::ItemFailure`].
#[derive(Error, Debug)]
pub enum CaddieError {
    /// Device or workstation id has not been captured yet
    #[error("Request identity incomplete, missing: {}", .0.join(", "))]
    IdentityMissing(Vec<&'static str>),

    /// Validation error (e.g., malformed SKU, non-positive quantity)
    #[error("Validation error: {0}")]
    Validation(String),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tabular input could not be read
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Reading an input file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_missing_lists_fields() {
        let err = CaddieError::IdentityMissing(vec!["kits-device-id", "kits-workstation-id"]);
        assert_eq!(
            err.to_string(),
            "Request identity incomplete, missing: kits-device-id, kits-workstation-id"
        );
    }
}

//! Error types for the shelf_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for shelf_core operations
///
/// The first group of variants are domain outcomes a caller is expected to
/// translate into user-facing text. The rest are infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No copies of the title are left to lend
    #[error("No copies of '{title}' are available")]
    Unavailable { title: String },

    /// The borrower already holds an open loan for this title
    #[error("{borrower} has already borrowed '{title}'")]
    AlreadyBorrowed { borrower: String, title: String },

    /// Return requested but nothing is open for this borrower and title
    #[error("{borrower} has no open loan for '{title}'")]
    NoActiveLoan { borrower: String, title: String },

    /// The title is not in the catalog
    #[error("Unknown title: '{0}'")]
    UnknownTitle(String),

    /// Account registration or lookup problem
    #[error("Account error: {0}")]
    Account(String),

    /// Rejected input
    #[error("Invalid input: {0}")]
    Validation(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted state is unreadable or the store lock is unusable
    #[error("State error: {0}")]
    State(String),
}

impl Error {
    /// True for the recoverable, user-facing outcomes of library operations.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Error::Unavailable { .. }
                | Error::AlreadyBorrowed { .. }
                | Error::NoActiveLoan { .. }
                | Error::UnknownTitle(_)
                | Error::Account(_)
                | Error::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_classification() {
        assert!(Error::Unavailable { title: "Dune".into() }.is_domain());
        assert!(Error::UnknownTitle("Dune".into()).is_domain());
        assert!(!Error::State("poisoned".into()).is_domain());
        assert!(!Error::Io(io::Error::new(io::ErrorKind::Other, "disk")).is_domain());
    }

    #[test]
    fn test_messages_name_the_title() {
        let err = Error::NoActiveLoan {
            borrower: "alice".into(),
            title: "Dune".into(),
        };
        assert_eq!(err.to_string(), "alice has no open loan for 'Dune'");
    }
}

//! Error types for connection assembly.

use thiserror::Error;

use crate::connection::profile::Profile;

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors that abort a connection attempt.
///
/// None of these are retried: parse-time errors end the process right away,
/// the others end the initiation job and request termination.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A traffic selector could not be parsed
    #[error("invalid traffic selector: {0}")]
    InvalidSelector(String),

    /// The profile name is not one we know
    #[error("unknown connection profile: {0}")]
    UnknownProfile(String),

    /// The profile needs a private key that was never supplied
    #[error("missing private key for profile {0}")]
    MissingCredential(Profile),

    /// Host or identity was not given
    #[error("unable to initiate, missing --{0} option")]
    MissingRequiredField(&'static str),

    /// The daemon could not be queried or refused the connection
    #[error("daemon error: {0}")]
    Daemon(String),
}

/// Errors reported by the daemon-side collaborators.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The daemon could not be reached
    #[error("daemon unavailable: {0}")]
    Unavailable(String),

    /// The daemon refused the request
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<ControllerError> for ConnectionError {
    fn from(err: ControllerError) -> Self {
        ConnectionError::Daemon(err.to_string())
    }
}

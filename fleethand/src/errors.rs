//! Error types for fleethand

use thiserror::Error;

/// Main error type for fleethand
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("roster line has no recognizable field separator: {0}")]
    AuthFormat(String),

    #[error("walk range out of bounds: {0}")]
    RangeValidation(String),

    #[error("remote command timed out after {0}s")]
    RemoteTimeout(u64),

    #[error("remote channel closed mid-command")]
    RemoteEof,

    #[error("connection reset, the host may be offline: {0}")]
    ConnectionReset(String),

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("SFTP error: {0}")]
    Sftp(String),

    #[error("auth rejected for {user}@{host}")]
    AuthRejected { user: String, host: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("tunnel toggle failed: {0}")]
    Tunnel(String),

    #[error("provisioning error: {0}")]
    Provision(String),
}

impl From<rusqlite::Error> for FleetError {
    fn from(err: rusqlite::Error) -> Self {
        FleetError::Store(err.to_string())
    }
}

impl From<russh::Error> for FleetError {
    fn from(err: russh::Error) -> Self {
        match err {
            russh::Error::Disconnect => FleetError::RemoteEof,
            russh::Error::IO(ref io)
                if io.kind() == std::io::ErrorKind::ConnectionReset
                    || io.kind() == std::io::ErrorKind::ConnectionRefused =>
            {
                FleetError::ConnectionReset(io.to_string())
            }
            other => FleetError::Ssh(other.to_string()),
        }
    }
}

impl From<russh_keys::Error> for FleetError {
    fn from(err: russh_keys::Error) -> Self {
        FleetError::Ssh(err.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for FleetError {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        FleetError::Sftp(err.to_string())
    }
}

impl From<anyhow::Error> for FleetError {
    fn from(err: anyhow::Error) -> Self {
        FleetError::Config(err.to_string())
    }
}

//! Remote execution transport interface
//!
//! The walker and the stage runner only ever talk to these traits; the russh
//! implementation lives in [`crate::remote::ssh`] and tests substitute mocks.

use std::path::Path;

use async_trait::async_trait;

use crate::errors::FleetError;
use crate::remote::auth::ConnectParams;

/// Result of one remote command
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub stdout: String,
    pub exit_ok: bool,
}

/// Per-command options. Every command carries its own timeout, enforced by
/// the transport.
#[derive(Debug, Clone)]
pub struct RunOpts {
    /// Request a PTY for the command
    pub pty: bool,

    /// Command timeout in seconds
    pub timeout_secs: u64,

    /// When true, a nonzero exit is reported in `exit_ok` instead of
    /// failing the call
    pub warn: bool,
}

impl Default for RunOpts {
    fn default() -> Self {
        Self {
            pty: false,
            timeout_secs: 100,
            warn: false,
        }
    }
}

impl RunOpts {
    /// Tolerate nonzero exits, with a PTY (the probe style used by most
    /// detection commands)
    pub fn probe() -> Self {
        Self {
            pty: true,
            timeout_secs: 100,
            warn: true,
        }
    }

    /// Long-running install action
    pub fn install() -> Self {
        Self {
            pty: true,
            timeout_secs: 4900,
            warn: true,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// An open session to one server, discarded after that server's stage loop
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a shell command and collect its output
    async fn run(&mut self, command: &str, opts: RunOpts) -> Result<CmdOutput, FleetError>;

    /// Upload a local file
    async fn put(&mut self, local: &Path, remote: &str) -> Result<(), FleetError>;

    /// Download a remote file
    async fn get(&mut self, remote: &str, local: &Path) -> Result<(), FleetError>;

    /// Close the session
    async fn close(&mut self) -> Result<(), FleetError>;
}

/// Session factory, one connection per walk iteration
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, params: &ConnectParams)
        -> Result<Box<dyn RemoteSession>, FleetError>;
}

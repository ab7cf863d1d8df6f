//! Mock remote transport for walker and runner tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fleethand::errors::FleetError;
use fleethand::remote::auth::{AuthMethod, ConnectParams};
use fleethand::remote::session::{CmdOutput, Connect, RemoteSession, RunOpts};
use fleethand::walker::{JobContext, ServerJob};

/// Scripted response: the first rule whose pattern is contained in the
/// command wins, so more specific patterns must come first.
#[derive(Clone)]
pub struct Rule {
    pub pattern: String,
    pub stdout: String,
    pub exit_ok: bool,
}

/// Rules plus an error trigger shared between sessions of one connector
#[derive(Clone, Default)]
pub struct Script {
    pub rules: Vec<Rule>,
    /// Commands containing this pattern fail with a timeout
    pub timeout_on: Option<String>,
}

impl Script {
    pub fn respond(mut self, pattern: &str, stdout: &str, exit_ok: bool) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            stdout: stdout.to_string(),
            exit_ok,
        });
        self
    }

    pub fn timeout_on(mut self, pattern: &str) -> Self {
        self.timeout_on = Some(pattern.to_string());
        self
    }
}

pub struct MockSession {
    script: Script,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl MockSession {
    pub fn new(script: Script, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self { script, log }
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn run(&mut self, command: &str, _opts: RunOpts) -> Result<CmdOutput, FleetError> {
        self.log.lock().unwrap().push(command.to_string());
        if let Some(pattern) = &self.script.timeout_on {
            if command.contains(pattern.as_str()) {
                return Err(FleetError::RemoteTimeout(1));
            }
        }
        for rule in &self.script.rules {
            if command.contains(rule.pattern.as_str()) {
                return Ok(CmdOutput {
                    stdout: rule.stdout.clone(),
                    exit_ok: rule.exit_ok,
                });
            }
        }
        Ok(CmdOutput {
            stdout: String::new(),
            exit_ok: true,
        })
    }

    async fn put(&mut self, local: &Path, remote: &str) -> Result<(), FleetError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("PUT {} {}", local.display(), remote));
        Ok(())
    }

    async fn get(&mut self, remote: &str, local: &Path) -> Result<(), FleetError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("GET {} {}", remote, local.display()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FleetError> {
        Ok(())
    }
}

/// How a connect attempt for one host should fail
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    Generic,
    Reset,
}

#[derive(Default)]
pub struct MockConnector {
    script: Script,
    fail_hosts: Vec<(String, ConnectFailure)>,
    /// One entry per attempt: "password user@host:port" or "key user@host:port"
    pub connect_log: Arc<Mutex<Vec<String>>>,
    /// Commands run across every session created by this connector
    pub command_log: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    pub fn fail_host(mut self, host: &str, failure: ConnectFailure) -> Self {
        self.fail_hosts.push((host.to_string(), failure));
        self
    }
}

#[async_trait]
impl Connect for MockConnector {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn RemoteSession>, FleetError> {
        let kind = match &params.auth {
            AuthMethod::Password(_) => "password",
            AuthMethod::KeyFile(_) => "key",
        };
        self.connect_log.lock().unwrap().push(format!(
            "{} {}@{}:{}",
            kind, params.user, params.host, params.port
        ));

        for (host, failure) in &self.fail_hosts {
            if host == &params.host {
                return Err(match failure {
                    ConnectFailure::Generic => FleetError::Ssh("mock connect refused".into()),
                    ConnectFailure::Reset => {
                        FleetError::ConnectionReset("mock reset".into())
                    }
                });
            }
        }

        Ok(Box::new(MockSession::new(
            self.script.clone(),
            self.command_log.clone(),
        )))
    }
}

/// Counts successful job invocations across a walk
#[derive(Default)]
pub struct CountingJob {
    pub calls: AtomicUsize,
}

#[async_trait(?Send)]
impl ServerJob for CountingJob {
    async fn run(&self, _cx: &mut JobContext<'_>) -> Result<(), FleetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

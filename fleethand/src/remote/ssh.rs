//! SSH transport built on russh

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use russh_sftp::client::SftpSession;
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::FleetError;
use crate::remote::auth::{AuthMethod, ConnectParams};
use crate::remote::session::{CmdOutput, Connect, RemoteSession, RunOpts};

/// Fleet hosts are personal machines added by the operator, so the server
/// key is accepted on first contact.
struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Connector that opens one [`SshSession`] per walk iteration
pub struct SshConnector {
    config: Arc<client::Config>,
    connect_timeout: Duration,
}

impl SshConnector {
    pub fn new(connect_timeout_secs: u64) -> Self {
        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        }
    }
}

#[async_trait]
impl Connect for SshConnector {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<Box<dyn RemoteSession>, FleetError> {
        debug!(
            "opening SSH session to {}@{}:{}",
            params.user, params.host, params.port
        );

        let mut handle = timeout(
            self.connect_timeout,
            client::connect(
                self.config.clone(),
                (params.host.as_str(), params.port),
                ClientHandler,
            ),
        )
        .await
        .map_err(|_| FleetError::RemoteTimeout(self.connect_timeout.as_secs()))??;

        let authed = match &params.auth {
            AuthMethod::Password(password) => {
                handle
                    .authenticate_password(&params.user, password.expose_secret())
                    .await?
            }
            AuthMethod::KeyFile(path) => {
                let key_pair = russh_keys::load_secret_key(path, None)?;
                handle
                    .authenticate_publickey(&params.user, Arc::new(key_pair))
                    .await?
            }
        };

        if !authed {
            return Err(FleetError::AuthRejected {
                user: params.user.clone(),
                host: params.host.clone(),
            });
        }

        Ok(Box::new(SshSession { handle }))
    }
}

/// An authenticated SSH session to one server
pub struct SshSession {
    handle: Handle<ClientHandler>,
}

impl SshSession {
    async fn exec(&mut self, command: &str, opts: &RunOpts) -> Result<CmdOutput, FleetError> {
        let mut channel = self.handle.channel_open_session().await?;
        if opts.pty {
            channel
                .request_pty(false, "xterm", 80, 24, 0, 0, &[])
                .await?;
        }
        channel.exec(true, command).await?;

        let mut stdout = String::new();
        let mut exit_status = None;
        loop {
            let Some(msg) = channel.wait().await else {
                break;
            };
            match msg {
                ChannelMsg::Data { ref data } => {
                    stdout.push_str(&String::from_utf8_lossy(data));
                }
                ChannelMsg::ExtendedData { ref data, .. } => {
                    stdout.push_str(&String::from_utf8_lossy(data));
                }
                ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code);
                }
                _ => {}
            }
        }

        let Some(code) = exit_status else {
            return Err(FleetError::RemoteEof);
        };
        Ok(CmdOutput {
            stdout,
            exit_ok: code == 0,
        })
    }

    async fn sftp(&mut self) -> Result<SftpSession, FleetError> {
        let channel = self.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(sftp)
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str, opts: RunOpts) -> Result<CmdOutput, FleetError> {
        let secs = opts.timeout_secs;
        let output = timeout(Duration::from_secs(secs), self.exec(command, &opts))
            .await
            .map_err(|_| FleetError::RemoteTimeout(secs))??;

        if !output.exit_ok && !opts.warn {
            return Err(FleetError::Provision(format!(
                "remote command exited nonzero: {}",
                command
            )));
        }
        if !output.exit_ok {
            warn!("remote command exited nonzero (tolerated): {}", command);
        }
        Ok(output)
    }

    async fn put(&mut self, local: &Path, remote: &str) -> Result<(), FleetError> {
        let data = tokio::fs::read(local).await?;
        let sftp = self.sftp().await?;
        let mut remote_file = sftp.create(remote).await?;
        remote_file.write_all(&data).await?;
        remote_file.shutdown().await?;
        sftp.close().await?;
        Ok(())
    }

    async fn get(&mut self, remote: &str, local: &Path) -> Result<(), FleetError> {
        let sftp = self.sftp().await?;
        let mut remote_file = sftp.open(remote).await?;
        let mut data = Vec::new();
        remote_file.read_to_end(&mut data).await?;
        sftp.close().await?;
        tokio::fs::write(local, data).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FleetError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

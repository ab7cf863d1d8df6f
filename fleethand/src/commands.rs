//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::errors::FleetError;
use crate::provision::runner::StageRunner;
use crate::provision::stage::CERT_FLAG;
use crate::remote::ssh::SshConnector;
use crate::report;
use crate::roster::Roster;
use crate::storage::layout::{expand_home, StorageLayout};
use crate::storage::settings::Settings;
use crate::storage::store::ServerStore;
use crate::tunnel::TunnelGate;
use crate::walker::jobs::{
    AddCertJob, OffCertJob, ProvisionJob, RemoveCustomCertJob, RetireJob,
};
use crate::walker::{FleetWalker, WalkRange};

/// Shared command context: layout, operator settings, open store
pub struct App {
    layout: StorageLayout,
    settings: Arc<Settings>,
    store: ServerStore,
}

impl App {
    /// Resolve the layout, read the settings and open the store
    pub async fn bootstrap() -> Result<Self, FleetError> {
        let layout = StorageLayout::default();
        let settings = Arc::new(Settings::load(&layout.settings_file()).await);
        let store = ServerStore::open(layout.db_path())?;
        Ok(Self {
            layout,
            settings,
            store,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn resolve_roster(&self, name: &str) -> Result<PathBuf, FleetError> {
        let path = self.layout.roster_path(name);
        if !path.exists() {
            return Err(FleetError::Config(format!(
                "wrong path, cannot open roster file {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// `ls`: one status line per known server
    pub fn ls(&self) -> Result<(), FleetError> {
        println!("Here is my machine room...");
        for summary in self.store.list_all()? {
            println!("{}", report::status_line(&summary));
        }
        Ok(())
    }

    /// `import <roster>`: walk and provision every server
    pub async fn import(&self, roster_name: &str) -> Result<(), FleetError> {
        let roster = Roster::load(self.resolve_roster(roster_name)?).await?;
        let connector = SshConnector::new(self.settings.connect_timeout_secs);
        let runner = StageRunner::new(
            StageRunner::default_stages(&self.settings),
            self.settings.clone(),
        );
        let walker = FleetWalker::new(&roster, &self.store, &connector, self.settings.clone())
            .with_on_reset_exit(true);
        walker
            .walk(WalkRange::From(0), &ProvisionJob::new(runner))
            .await?;
        Ok(())
    }

    /// `retire <roster>`: mark every listed server retired, offline
    pub async fn retire(&self, roster_name: &str) -> Result<(), FleetError> {
        let roster = Roster::load(self.resolve_roster(roster_name)?).await?;
        let connector = SshConnector::new(self.settings.connect_timeout_secs);
        let walker = FleetWalker::new(&roster, &self.store, &connector, self.settings.clone());
        walker.walk_offline(WalkRange::From(0), &RetireJob).await?;
        Ok(())
    }

    /// `off-cert <roster>`: clear the operator cert flag, offline
    pub async fn off_cert(&self, roster_name: &str) -> Result<(), FleetError> {
        let roster = Roster::load(self.resolve_roster(roster_name)?).await?;
        let connector = SshConnector::new(self.settings.connect_timeout_secs);
        let walker = FleetWalker::new(&roster, &self.store, &connector, self.settings.clone());
        walker.walk_offline(WalkRange::From(0), &OffCertJob).await?;
        Ok(())
    }

    /// `add-cert <roster> <name> <pubkey>`: push an additional named key
    pub async fn add_cert(
        &self,
        roster_name: &str,
        name: &str,
        pubkey_path: &str,
    ) -> Result<(), FleetError> {
        let roster = Roster::load(self.resolve_roster(roster_name)?).await?;
        let connector = SshConnector::new(self.settings.connect_timeout_secs);
        let walker = FleetWalker::new(&roster, &self.store, &connector, self.settings.clone())
            .with_on_reset_exit(true);
        walker
            .walk(WalkRange::From(0), &AddCertJob::new(name, pubkey_path))
            .await?;
        Ok(())
    }

    /// `remove-custom-cert <roster> <name>`: forget a named key marker
    pub async fn remove_custom_cert(
        &self,
        roster_name: &str,
        name: &str,
    ) -> Result<(), FleetError> {
        let roster = Roster::load(self.resolve_roster(roster_name)?).await?;
        let connector = SshConnector::new(self.settings.connect_timeout_secs);
        let walker = FleetWalker::new(&roster, &self.store, &connector, self.settings.clone());
        walker
            .walk_offline(WalkRange::From(0), &RemoveCustomCertJob::new(name))
            .await?;
        Ok(())
    }

    /// `set-home <serverId> <path>`: record the remote home directory
    pub fn set_home(&self, server_id: &str, path: &str) -> Result<(), FleetError> {
        let state = self.store.session(server_id);
        if !state.exists()? {
            return Err(FleetError::Config(format!(
                "there is no such server for ---> {server_id}"
            )));
        }
        state.set_kv("home_path", Value::from(path))?;
        info!("home path for {} set to {}", server_id, path);
        Ok(())
    }

    /// Bare `<serverId>`: open an interactive shell with cached credentials
    pub async fn shell(&self, server_id: &str) -> Result<(), FleetError> {
        let state = self.store.session(server_id);
        if !state.exists()? {
            return Err(FleetError::Config(format!(
                "there is no such server for ---> {server_id}"
            )));
        }
        let identity = state.identity()?.ok_or_else(|| {
            FleetError::Store(format!("no identity row for {server_id}"))
        })?;

        let profile = state.get_kv_str("tunnel_profile")?;
        if !profile.is_empty() {
            println!("TUNNEL PROFILE: {profile}");
            let gate = TunnelGate::from_directive(&crate::roster::TunnelDirective {
                profile,
                kind: crate::roster::TunnelKind::Vpn,
            });
            if let Some(gate) = gate {
                if let Err(e) = gate.enable().await {
                    tracing::warn!("tunnel enable failed: {}", e);
                }
            }
        }

        let mut command = std::process::Command::new("ssh");
        if identity.port != 22 {
            command.args(["-p", &identity.port.to_string()]);
        }
        if state.get_flag(CERT_FLAG)? {
            let key = expand_home(&self.settings.private_key_path);
            command.arg("-i").arg(key);
        }
        command.arg("-t");
        command.arg(format!("{}@{}", identity.user, identity.host));

        let home = state.get_kv_str("home_path")?;
        if !home.is_empty() {
            command.arg(format!("cd {home}; bash"));
        }

        let status = command.status()?;
        if !status.success() {
            info!("ssh exited with {status}");
        }
        Ok(())
    }

    /// `v`: print the version
    pub fn version() {
        println!("version. {}", env!("CARGO_PKG_VERSION"));
    }
}

//! Per-server jobs used by the CLI commands

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::errors::FleetError;
use crate::provision::probes;
use crate::provision::runner::{push_public_key, StageRunner};
use crate::provision::stage::{CERT_FLAG, RETIRED_FLAG};
use crate::storage::store::StateSession;
use crate::walker::{JobContext, OfflineJob, ServerJob};

/// Default import job: run the configured provisioning stage list
pub struct ProvisionJob {
    runner: StageRunner,
}

impl ProvisionJob {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }
}

#[async_trait(?Send)]
impl ServerJob for ProvisionJob {
    async fn run(&self, cx: &mut JobContext<'_>) -> Result<(), FleetError> {
        self.runner.run_all(cx.session, cx.state).await?;
        Ok(())
    }
}

/// Push an additional named public key and record it per server
pub struct AddCertJob {
    name: String,
    pubkey_path: String,
}

impl AddCertJob {
    pub fn new(name: impl Into<String>, pubkey_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pubkey_path: pubkey_path.into(),
        }
    }

    fn marker_key(&self) -> String {
        format!("custom_cert_{}", self.name)
    }
}

#[async_trait(?Send)]
impl ServerJob for AddCertJob {
    async fn run(&self, cx: &mut JobContext<'_>) -> Result<(), FleetError> {
        if probes::detect_cert(cx.session, &self.name).await? {
            return Ok(());
        }
        push_public_key(cx.session, &self.pubkey_path).await?;
        cx.state.set_kv(&self.marker_key(), Value::Bool(true))?;
        info!("custom cert {} installed on {}", self.name, cx.state.id());
        Ok(())
    }
}

/// Mark every visited server retired
pub struct RetireJob;

#[async_trait(?Send)]
impl OfflineJob for RetireJob {
    async fn run(&self, state: &StateSession<'_>) -> Result<(), FleetError> {
        state.set_flag(RETIRED_FLAG)
    }
}

/// Clear the operator cert flag so the next walk re-authenticates with the
/// roster password
pub struct OffCertJob;

#[async_trait(?Send)]
impl OfflineJob for OffCertJob {
    async fn run(&self, state: &StateSession<'_>) -> Result<(), FleetError> {
        state.delete_kv(CERT_FLAG)
    }
}

/// Forget a named custom cert marker
pub struct RemoveCustomCertJob {
    name: String,
}

impl RemoveCustomCertJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait(?Send)]
impl OfflineJob for RemoveCustomCertJob {
    async fn run(&self, state: &StateSession<'_>) -> Result<(), FleetError> {
        state.delete_kv(&format!("custom_cert_{}", self.name))
    }
}

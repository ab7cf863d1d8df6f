//! Fleet walk driver
//!
//! Walks roster indices in order, opens one connection per server, runs a
//! per-server job, and keeps going: a failure on one server never takes
//! down the rest of the fleet. Only a connection reset may abort the walk,
//! and only when the call site asked for that.

pub mod jobs;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::errors::FleetError;
use crate::provision::stage::CERT_FLAG;
use crate::remote::auth::select_auth;
use crate::remote::session::{Connect, RemoteSession};
use crate::roster::{Roster, ServerRecord};
use crate::storage::layout::expand_home;
use crate::storage::settings::Settings;
use crate::storage::store::{ServerStore, StateSession};
use crate::tunnel::TunnelGate;

/// Which roster indices to visit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkRange {
    /// From a start index to the end of the roster
    From(usize),
    /// A closed sub-range [start, stop)
    Span(usize, usize),
    /// One explicit index
    Single(usize),
}

/// Outcome of one walk pass. Partial failure across the fleet is reported
/// here, not in the process exit code.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkSummary {
    pub visited: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Everything a connected per-server job may touch
pub struct JobContext<'a> {
    pub record: &'a ServerRecord,
    pub session: &'a mut dyn RemoteSession,
    pub state: &'a StateSession<'a>,
}

/// A job run against each connected server.
///
/// The store handle inside the context is single-threaded, so job futures
/// are not required to be Send; the walk runs on a current-thread runtime.
#[async_trait(?Send)]
pub trait ServerJob: Sync {
    async fn run(&self, cx: &mut JobContext<'_>) -> Result<(), FleetError>;
}

/// A job run against each server without a connection
#[async_trait(?Send)]
pub trait OfflineJob: Sync {
    async fn run(&self, state: &StateSession<'_>) -> Result<(), FleetError>;
}

/// Drives the outer loop over the roster
pub struct FleetWalker<'a> {
    roster: &'a Roster,
    store: &'a ServerStore,
    connector: &'a dyn Connect,
    settings: Arc<Settings>,
    gate: Option<TunnelGate>,
    on_reset_exit: bool,
}

impl<'a> FleetWalker<'a> {
    pub fn new(
        roster: &'a Roster,
        store: &'a ServerStore,
        connector: &'a dyn Connect,
        settings: Arc<Settings>,
    ) -> Self {
        let gate = roster.tunnel().and_then(TunnelGate::from_directive);
        Self {
            roster,
            store,
            connector,
            settings,
            gate,
            on_reset_exit: false,
        }
    }

    /// Make a connection reset fatal to the whole walk (interactive
    /// foreground flows). Default is log-and-continue.
    pub fn with_on_reset_exit(mut self, on_reset_exit: bool) -> Self {
        self.on_reset_exit = on_reset_exit;
        self
    }

    /// Validate a range against the roster before any connection attempt
    fn resolve_range(&self, range: WalkRange) -> Result<(usize, usize), FleetError> {
        let count = self.roster.count();
        match range {
            WalkRange::From(start) if start < count => Ok((start, count)),
            WalkRange::From(start) => Err(FleetError::RangeValidation(format!(
                "cannot start from server {start}, roster holds {count}"
            ))),
            WalkRange::Single(index) if index < count => Ok((index, index + 1)),
            WalkRange::Single(index) => Err(FleetError::RangeValidation(format!(
                "no server index {index}, roster holds {count}"
            ))),
            WalkRange::Span(start, stop) if start < stop && stop <= count => Ok((start, stop)),
            WalkRange::Span(start, stop) => Err(FleetError::RangeValidation(format!(
                "invalid span [{start}, {stop}) over {count} servers"
            ))),
        }
    }

    /// Walk the range, connecting to each server and running `job`
    pub async fn walk(
        &self,
        range: WalkRange,
        job: &dyn ServerJob,
    ) -> Result<WalkSummary, FleetError> {
        let (start, stop) = self.resolve_range(range)?;

        if let Some(gate) = &self.gate {
            if let Err(e) = gate.enable().await {
                warn!("tunnel enable failed, proceeding without it: {}", e);
            }
        }

        let mut summary = WalkSummary::default();
        let mut abort = None;
        for k in start..stop {
            // count validated above, so the roster is non-empty
            let Some(record) = self.roster.read_at(k) else {
                break;
            };
            info!("######## now enter server #{k}: {} {}", record.id, record.host);
            summary.visited += 1;

            match self.visit(record, job).await {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    self.report_failure(record, &e);
                    if matches!(e, FleetError::ConnectionReset(_)) && self.on_reset_exit {
                        abort = Some(e);
                        break;
                    }
                }
            }
        }

        if let Some(gate) = &self.gate {
            if let Err(e) = gate.disable().await {
                warn!("tunnel disable failed: {}", e);
            }
        }

        if let Some(e) = abort {
            return Err(e);
        }
        info!(
            "walk done: {} visited, {} ok, {} failed",
            summary.visited, summary.succeeded, summary.failed
        );
        Ok(summary)
    }

    async fn visit(&self, record: &ServerRecord, job: &dyn ServerJob) -> Result<(), FleetError> {
        let state = self.store.session(&record.id);
        // identity first, so every visited server has at least a row
        state.upsert_identity(record)?;
        if let Some(gate) = &self.gate {
            state.set_kv("tunnel_profile", gate.profile().into())?;
        }

        let params = select_auth(
            state.exists()?,
            state.get_flag(CERT_FLAG)?,
            record,
            expand_home(&self.settings.private_key_path),
        );
        let mut session = self.connector.connect(&params).await?;

        let result = {
            let mut cx = JobContext {
                record,
                session: session.as_mut(),
                state: &state,
            };
            job.run(&mut cx).await
        };

        if let Err(e) = session.close().await {
            warn!("session close failed for {}: {}", record.id, e);
        }
        result
    }

    /// Offline variant: identity upsert plus a local job, no connection
    pub async fn walk_offline(
        &self,
        range: WalkRange,
        job: &dyn OfflineJob,
    ) -> Result<WalkSummary, FleetError> {
        let (start, stop) = self.resolve_range(range)?;

        let mut summary = WalkSummary::default();
        for k in start..stop {
            let Some(record) = self.roster.read_at(k) else {
                break;
            };
            summary.visited += 1;

            let state = self.store.session(&record.id);
            let outcome = async {
                state.upsert_identity(record)?;
                job.run(&state).await
            }
            .await;

            match outcome {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    self.report_failure(record, &e);
                }
            }
        }
        Ok(summary)
    }

    /// One bracketed banner per failed server, classified by kind
    fn report_failure(&self, record: &ServerRecord, err: &FleetError) {
        error!("[ {} @ {} ]", record.id, record.host);
        match err {
            FleetError::RemoteTimeout(_) | FleetError::RemoteEof => {
                warn!("maybe a time out: {}", err);
            }
            FleetError::ConnectionReset(_) => {
                error!("maybe offline: {}", err);
            }
            other => {
                error!("server failed: {}", other);
            }
        }
    }
}

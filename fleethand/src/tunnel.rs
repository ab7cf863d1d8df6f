//! Tunnel/VPN toggling around a fleet walk

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::FleetError;
use crate::roster::{TunnelDirective, TunnelKind};

/// Brings a named tunnel profile up before the walk and down after it
#[derive(Debug, Clone)]
pub struct TunnelGate {
    kind: TunnelKind,
    profile: String,
}

impl TunnelGate {
    /// Build a gate from a roster directive. Directives with kind `None`
    /// need no gate.
    pub fn from_directive(directive: &TunnelDirective) -> Option<Self> {
        if directive.kind == TunnelKind::None {
            return None;
        }
        Some(Self {
            kind: directive.kind,
            profile: directive.profile.clone(),
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Bring the tunnel up
    pub async fn enable(&self) -> Result<(), FleetError> {
        info!("tunnel profile {} up", self.profile);
        self.toggle(true).await
    }

    /// Tear the tunnel down
    pub async fn disable(&self) -> Result<(), FleetError> {
        info!("tunnel profile {} down", self.profile);
        self.toggle(false).await
    }

    async fn toggle(&self, up: bool) -> Result<(), FleetError> {
        let (program, args): (&str, Vec<&str>) = match self.kind {
            TunnelKind::Wireguard => (
                "wg-quick",
                vec![if up { "up" } else { "down" }, self.profile.as_str()],
            ),
            TunnelKind::Vpn => (
                "vpnutil",
                vec![if up { "start" } else { "stop" }, self.profile.as_str()],
            ),
            TunnelKind::None => return Ok(()),
        };

        debug!("running {} {}", program, args.join(" "));
        let status = Command::new(program)
            .args(&args)
            .status()
            .await
            .map_err(|e| FleetError::Tunnel(format!("{program}: {e}")))?;

        if !status.success() {
            return Err(FleetError::Tunnel(format!(
                "{program} exited with {status} for profile {}",
                self.profile
            )));
        }
        Ok(())
    }
}

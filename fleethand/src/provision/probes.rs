//! Remote detection probes

use crate::errors::FleetError;
use crate::remote::session::{RemoteSession, RunOpts};

/// Check whether `program` resolves on the remote PATH. Uses a NOTFOUND
/// sentinel so the result does not depend on the remote shell's exit-code
/// conventions under a PTY.
pub async fn detect_program(
    session: &mut dyn RemoteSession,
    program: &str,
) -> Result<bool, FleetError> {
    let command = format!(
        "command -v {program} >/dev/null 2>&1 || {{ echo \"{program} NOTFOUND\"; }}"
    );
    let out = session.run(&command, RunOpts::probe()).await?;
    Ok(!out.stdout.contains("NOTFOUND"))
}

/// Resolve the remote path of `program`, None when it is not on PATH
pub async fn remote_path_of(
    session: &mut dyn RemoteSession,
    program: &str,
) -> Result<Option<String>, FleetError> {
    let out = session
        .run(&format!("command -v {program}"), RunOpts::probe())
        .await?;
    let line = out.stdout.trim();
    if line.is_empty() || line.contains("not found") {
        Ok(None)
    } else {
        Ok(Some(line.lines().next().unwrap_or(line).trim().to_string()))
    }
}

/// Check the remote authorized_keys for the operator key feature string.
/// An empty feature never matches.
pub async fn detect_cert(
    session: &mut dyn RemoteSession,
    key_feature: &str,
) -> Result<bool, FleetError> {
    if key_feature.is_empty() {
        return Ok(false);
    }
    let out = session
        .run("cat ~/.ssh/authorized_keys", RunOpts::probe())
        .await?;
    Ok(out.stdout.contains(key_feature))
}

/// Check whether a path exists on the remote
pub async fn path_exists(
    session: &mut dyn RemoteSession,
    path: &str,
) -> Result<bool, FleetError> {
    let out = session
        .run(&format!("stat {path}"), RunOpts::probe())
        .await?;
    Ok(!out.stdout.contains("No such file or directory"))
}

/// Check `docker ps` output for all of the given keywords
pub async fn check_docker_ps(
    session: &mut dyn RemoteSession,
    keywords: &[&str],
) -> Result<bool, FleetError> {
    let out = session
        .run("docker ps", RunOpts::probe().with_timeout(10))
        .await?;
    if !out.exit_ok {
        return Ok(false);
    }
    Ok(keywords.iter().all(|k| out.stdout.contains(k)))
}

/// Repair a docker-compose binary that lost its execute bit
pub async fn ensure_compose_permission(
    session: &mut dyn RemoteSession,
    compose_path: &str,
) -> Result<(), FleetError> {
    let out = session.run(compose_path, RunOpts::probe()).await?;
    if !out.exit_ok && out.stdout.contains("Permission denied") {
        session
            .run(&format!("chmod +x {compose_path}"), RunOpts::probe())
            .await?;
    }
    Ok(())
}

//! Connection parameter selection
//!
//! A pure decision over persisted state: servers we have certified get the
//! operator key, everything else gets the roster password.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::roster::ServerRecord;

/// Authentication mode for the upcoming session
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Password(SecretString),
    KeyFile(PathBuf),
}

/// Everything the transport needs to open a session
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: AuthMethod,
}

/// Decide how to authenticate against one server.
///
/// No record yet, or the cert flag unset: use the roster-supplied password.
/// Otherwise the public half of `private_key` has been provisioned onto the
/// remote authorized_keys, so the roster password is ignored entirely.
pub fn select_auth(
    record_exists: bool,
    cert_installed: bool,
    record: &ServerRecord,
    private_key: PathBuf,
) -> ConnectParams {
    let auth = if record_exists && cert_installed {
        AuthMethod::KeyFile(private_key)
    } else {
        AuthMethod::Password(record.pass.clone())
    };

    ConnectParams {
        host: record.host.clone(),
        port: record.port,
        user: record.user.clone(),
        auth,
    }
}

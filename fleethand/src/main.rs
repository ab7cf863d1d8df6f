//! Fleethand - Entry Point
//!
//! A personal fleet-management CLI: walks a flat-text server roster,
//! provisions baseline software over SSH, and remembers what is installed
//! where.

use std::env;
use std::process::ExitCode;

use fleethand::commands::App;
use fleethand::logs::init_logging;

const LS_ALIASES: [&str; 4] = ["ls", "show", "list", "tell"];

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str);

    if matches!(cmd, Some("v") | Some("version")) {
        App::version();
        return ExitCode::SUCCESS;
    }

    let app = match App::bootstrap().await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&app.settings().log_level) {
        eprintln!("failed to initialize logging: {e}");
    }

    let result = match cmd {
        Some(c) if LS_ALIASES.contains(&c) => app.ls(),
        Some("import") => match args.get(1) {
            Some(file) => app.import(file).await,
            None => usage("import <rosterFile>"),
        },
        Some("retire") => match args.get(1) {
            Some(file) => app.retire(file).await,
            None => usage("retire <rosterFile>"),
        },
        Some("off-cert") => match args.get(1) {
            Some(file) => app.off_cert(file).await,
            None => usage("off-cert <rosterFile>"),
        },
        Some("add-cert") => match (args.get(1), args.get(2), args.get(3)) {
            (Some(file), Some(name), Some(pubkey)) => {
                app.add_cert(file, name, pubkey).await
            }
            _ => usage("add-cert <rosterFile> <name> <pubkeyPath>"),
        },
        Some("remove-custom-cert") => match (args.get(1), args.get(2)) {
            (Some(file), Some(name)) => app.remove_custom_cert(file, name).await,
            _ => usage("remove-custom-cert <rosterFile> <name>"),
        },
        Some("set-home") => match (args.get(1), args.get(2)) {
            (Some(id), Some(path)) => app.set_home(id, path),
            _ => usage("set-home <serverId> <path>"),
        },
        Some(server_id) => app.shell(server_id).await,
        None => usage("ls | import | retire | off-cert | add-cert | remove-custom-cert | set-home | v | <serverId>"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn usage(hint: &str) -> Result<(), fleethand::errors::FleetError> {
    Err(fleethand::errors::FleetError::Config(format!(
        "usage: fleethand {hint}"
    )))
}

//! Status table rendering for the `ls` command

use colored::Colorize;
use serde_json::Value;

use crate::provision::stage::{
    CERT_FLAG, CLASH_FLAG, COMPOSE_FLAG, DAED_FLAG, PYTHON_FLAG, RETIRED_FLAG, WATCHTOWER_FLAG,
    YACHT_FLAG,
};
use crate::storage::store::ServerSummary;

fn flag_on(res: &serde_json::Map<String, Value>, key: &str) -> bool {
    matches!(res.get(key), Some(Value::Bool(true)))
}

/// One status line per server: id, host, tunnel profile and the installed
/// software icons.
pub fn status_line(summary: &ServerSummary) -> String {
    let mut line = format!("{:<12} -> {:<16}", summary.id, summary.host);

    let profile = summary
        .res
        .get("tunnel_profile")
        .and_then(Value::as_str)
        .unwrap_or("");
    if !profile.is_empty() {
        line.push_str(&format!("  TUNNEL {}", profile.cyan()));
    }

    let mut icon = |on: bool, label: &str, red: bool| {
        if on {
            let painted = if red { label.red() } else { label.green() };
            line.push_str(&format!("  {painted}"));
        }
    };

    icon(flag_on(&summary.res, RETIRED_FLAG), "EXPIRED", true);
    icon(flag_on(&summary.res, CERT_FLAG), "CERT", false);
    icon(flag_on(&summary.res, COMPOSE_FLAG), "DOCKER", false);
    icon(flag_on(&summary.res, DAED_FLAG), "DAED", false);
    icon(flag_on(&summary.res, CLASH_FLAG), "CLASH", false);
    icon(flag_on(&summary.res, WATCHTOWER_FLAG), "WATCH", false);
    icon(flag_on(&summary.res, YACHT_FLAG), "YACHT", false);
    icon(flag_on(&summary.res, PYTHON_FLAG), "PY", false);

    line
}

use anyhow::Result;
use std::env;
use std::path::Path;

use crate::commands::CommandReport;
use crate::syre::config::load_config;
use crate::syre::context::{current_user, project_paths};
use crate::syre::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/syre_env_allowlist.rs"));

fn describe(label: &str, path: &Path) -> String {
    let state = if path.exists() { "present" } else { "missing" };
    format!("{label}={} ({state})", path.display())
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let config = load_config()?;
    let mut report = CommandReport::new("status");

    report.detail(describe("config_dir", &paths.config_dir));
    report.detail(describe("user_manifest", &paths.user_manifest));
    report.detail(describe("project_manifest", &paths.project_manifest));
    report.detail(describe("local_config", &paths.local_config));
    if paths.legacy_local_settings.exists() {
        report.detail(describe("legacy_settings", &paths.legacy_local_settings));
    }
    report.detail(format!(
        "continue_on_error={}",
        config.chain.continue_on_error
    ));
    report.detail(format!(
        "script_extensions={}",
        config.legacy.script_extensions.join(",")
    ));

    match current_user(&paths) {
        Ok(Some(user)) => report.detail(format!("user={user}")),
        Ok(None) => report.detail("user=<none>"),
        Err(err) => report.issue(format!("unreadable local config: {err}")),
    }

    match project_paths(&paths) {
        Ok(projects) => {
            report.detail(format!("projects={}", projects.len()));
            for project in projects {
                if project.is_dir() {
                    report.detail(format!("project {}", project.display()));
                } else {
                    report.issue(format!("registered project missing: {}", project.display()));
                }
            }
        }
        Err(err) => report.issue(format!("unreadable project manifest: {err}")),
    }

    for key in GENERATED_SYRE_ENV_ALLOWLIST {
        if let Ok(value) = env::var(key) {
            report.detail(format!("env {key}={value}"));
        }
    }

    Ok(report)
}

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::syre::chain::{self, FailurePolicy, VersionRegistry};
use crate::syre::config::load_config;
use crate::syre::context::{MigrationContext, project_paths};
use crate::syre::paths::resolve_paths;

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub initial: String,
    pub target: String,
    /// Convert only this project instead of every registered one.
    pub project: Option<PathBuf>,
    pub best_effort: bool,
}

pub fn run(opts: &ConvertOptions) -> Result<CommandReport> {
    let registry = VersionRegistry::builtin();
    let chain = registry.resolve(&opts.initial, &opts.target)?;

    let config = load_config()?;
    let paths = resolve_paths()?;
    let ctx = MigrationContext::new(paths, config).context("failed to read the global config")?;

    let projects = match &opts.project {
        Some(project) => vec![project.clone()],
        None => project_paths(&ctx.paths)?,
    };
    let policy = if opts.best_effort || ctx.config.chain.continue_on_error {
        FailurePolicy::ContinueOnError
    } else {
        FailurePolicy::StopOnFirstError
    };

    let mut report = CommandReport::new("convert");
    report.detail(format!("from={}", opts.initial));
    report.detail(format!("to={}", opts.target));
    report.detail(format!(
        "steps={}",
        chain
            .steps()
            .iter()
            .map(|step| format!("{}->{}", step.from, step.to))
            .collect::<Vec<_>>()
            .join(",")
    ));
    report.detail(format!("config_dir={}", ctx.paths.config_dir.display()));
    report.detail(format!("projects={}", projects.len()));
    tracing::info!(
        from = %opts.initial,
        to = %opts.target,
        steps = chain.steps().len(),
        projects = projects.len(),
        "starting conversion"
    );

    let outcome = chain::run(&chain, &ctx, &projects, policy)?;
    for project in &outcome.projects {
        match &project.error {
            None => report.detail(format!("converted {}", project.project.display())),
            Some(err) => report.issue(format!("{}: {err}", project.project.display())),
        }
    }
    report.detail(format!("converted={}", outcome.converted()));
    if outcome.failed() > 0 {
        report.detail(format!("failed={}", outcome.failed()));
    }
    Ok(report)
}

use anyhow::Result;

use crate::commands::CommandReport;
use crate::syre::chain::{LATEST_VERSION, VersionRegistry};

pub fn run() -> Result<CommandReport> {
    let registry = VersionRegistry::builtin();
    let mut report = CommandReport::new("versions");

    let versions = registry.versions();
    report.detail(format!("versions={}", versions.join(",")));
    report.detail(format!("latest={LATEST_VERSION}"));
    for pair in versions.windows(2) {
        let state = if registry.has_converter(&pair[0]) {
            "available"
        } else {
            "missing"
        };
        report.detail(format!("{}->{} {state}", pair[0], pair[1]));
    }
    Ok(report)
}

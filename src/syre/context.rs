use crate::error::{MigrationError, MigrationResult};
use crate::syre::config::ConverterConfig;
use crate::syre::document;
use crate::syre::paths::{SyrePaths, strip_windows_unc};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Everything a converter may need from outside the project it works on.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub paths: SyrePaths,
    /// Active user id, if one is configured.
    pub user: Option<String>,
    pub config: ConverterConfig,
}

impl MigrationContext {
    pub fn new(paths: SyrePaths, config: ConverterConfig) -> MigrationResult<Self> {
        let user = current_user(&paths)?;
        Ok(Self {
            paths,
            user,
            config,
        })
    }
}

fn string_field(doc: &Value, key: &str) -> Option<String> {
    doc.get(key).and_then(Value::as_str).map(ToOwned::to_owned)
}

/// Active user from `local_config.json`, falling back to the pre-0.11
/// `settings.json` so the lookup works on either side of the split.
pub fn current_user(paths: &SyrePaths) -> MigrationResult<Option<String>> {
    if paths.local_config.is_file() {
        let doc = document::load(&paths.local_config)?;
        return Ok(string_field(&doc, "user"));
    }
    if paths.legacy_local_settings.is_file() {
        let doc = document::load(&paths.legacy_local_settings)?;
        return Ok(string_field(&doc, "active_user"));
    }
    Ok(None)
}

/// Registered project roots from the project manifest.
pub fn project_paths(paths: &SyrePaths) -> MigrationResult<Vec<PathBuf>> {
    let manifest = &paths.project_manifest;
    if !manifest.is_file() {
        tracing::info!(manifest = %manifest.display(), "no project manifest, nothing registered");
        return Ok(Vec::new());
    }

    let doc = document::load(manifest)?;
    let Value::Array(entries) = doc else {
        return Err(MigrationError::malformed(
            manifest,
            "project manifest must be a list of paths",
        ));
    };
    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(|raw| PathBuf::from(strip_windows_unc(raw)))
                .ok_or_else(|| {
                    MigrationError::malformed(manifest, format!("invalid project entry {entry}"))
                })
        })
        .collect()
}

/// Absolute data root of a project, read from its `project.json`.
pub fn project_data_path(project: &Path) -> MigrationResult<PathBuf> {
    let properties_path = crate::syre::paths::project_properties_of(project);
    let properties = document::load(&properties_path)?;
    match properties.get("data_root").and_then(Value::as_str) {
        Some(root) if !root.is_empty() => Ok(project.join(root)),
        _ => Err(MigrationError::malformed(
            &properties_path,
            "project has no data root",
        )),
    }
}

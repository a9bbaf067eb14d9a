//! 0.10.1 -> 0.10.2
//!
//! Project `scripts.json` becomes `analyses.json` with a `type` on every
//! entry, and containers rename `scripts` to `analyses`.

use crate::error::{IoContext, MigrationError, MigrationResult};
use crate::syre::chain::Converter;
use crate::syre::context::{MigrationContext, project_data_path};
use crate::syre::document::JsonDocument;
use crate::syre::paths::{self, CONTAINER_PROPERTIES_FILE};
use crate::syre::shapes::{AssociationsShape, as_object_mut, unwrap_relative_path};
use crate::syre::tree;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub struct Convert0_10_1;

impl Converter for Convert0_10_1 {
    fn convert(&self, _ctx: &MigrationContext, project: &Path) -> MigrationResult<()> {
        convert_project_scripts(project)?;
        let data_root = project_data_path(project)?;
        for container in tree::dirs_with_metadata(&data_root, CONTAINER_PROPERTIES_FILE)? {
            convert_container_associations(&paths::container_properties_of(&container))?;
        }
        Ok(())
    }
}

pub fn convert_project_scripts(project: &Path) -> MigrationResult<()> {
    let scripts_path = paths::legacy_project_scripts_of(project);
    let analyses_path = paths::project_analyses_of(project);
    match (scripts_path.is_file(), analyses_path.is_file()) {
        (true, false) => {
            fs::rename(&scripts_path, &analyses_path).io_context(|| {
                format!(
                    "failed to rename {} to {}",
                    scripts_path.display(),
                    analyses_path.display()
                )
            })?;
        }
        (true, true) => {
            tracing::warn!(
                scripts = %scripts_path.display(),
                "both scripts.json and analyses.json exist, converting analyses.json only"
            );
        }
        (false, false) => {
            tracing::info!(project = %project.display(), "project has no analyses document");
            return Ok(());
        }
        (false, true) => {}
    }

    let mut doc = JsonDocument::open(&analyses_path)?;
    let Value::Array(analyses) = &mut doc.value else {
        return Err(MigrationError::malformed(
            &analyses_path,
            "analyses must be a list",
        ));
    };

    let mut changed = false;
    for analysis in analyses.iter_mut() {
        let record = as_object_mut(analysis, &analyses_path)?;
        if !record.contains_key("type") {
            record.insert("type".to_string(), Value::String("Script".to_string()));
            changed = true;
        }
        let owner = match record.get("rid").and_then(Value::as_str) {
            Some(rid) => format!("analysis {rid}"),
            None => "analysis".to_string(),
        };
        changed |= unwrap_relative_path(record, &analyses_path, &owner)?;
    }

    if changed {
        doc.overwrite()?;
    }
    Ok(())
}

/// Rename `Container.scripts` to `Container.analyses`.
pub fn convert_container_associations(properties_path: &Path) -> MigrationResult<bool> {
    let mut doc = JsonDocument::open(properties_path)?;
    let container = as_object_mut(&mut doc.value, properties_path)?;
    match AssociationsShape::decode(container, properties_path)? {
        AssociationsShape::Map | AssociationsShape::List => return Ok(false),
        AssociationsShape::Scripts => {
            let scripts = container.remove("scripts").unwrap_or(Value::Null);
            container.insert("analyses".to_string(), scripts);
        }
        AssociationsShape::Missing => {
            container.insert("analyses".to_string(), Value::Object(Map::new()));
        }
    }

    doc.overwrite()?;
    Ok(true)
}

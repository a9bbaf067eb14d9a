//! 0.10.0 -> 0.10.1
//!
//! Renames every `.thot` folder to `.syre` and drops the `Relative` tag from
//! asset paths.

use crate::error::{IoContext, MigrationError, MigrationResult};
use crate::syre::chain::Converter;
use crate::syre::context::{MigrationContext, project_data_path};
use crate::syre::document::JsonDocument;
use crate::syre::paths::{self, CONTAINER_ASSETS_FILE, LEGACY_THOT_FOLDER, SYRE_FOLDER};
use crate::syre::shapes::{RecordsShape, unwrap_relative_path};
use crate::syre::tree;
use serde_json::Value;
use std::fs;
use std::path::Path;

pub struct Convert0_10_0;

impl Converter for Convert0_10_0 {
    fn convert(&self, _ctx: &MigrationContext, project: &Path) -> MigrationResult<()> {
        rename_thot_folders(project)?;
        let data_root = project_data_path(project)?;
        for container in tree::dirs_with_metadata(&data_root, CONTAINER_ASSETS_FILE)? {
            remove_relative_path_tags(&paths::assets_of(&container))?;
        }
        Ok(())
    }
}

/// Rename `.thot` to `.syre` at the project root and in every subtree.
pub fn rename_thot_folders(project: &Path) -> MigrationResult<usize> {
    let legacy = tree::find_dirs_named(project, LEGACY_THOT_FOLDER)?;
    for thot in &legacy {
        let syre = thot.with_file_name(SYRE_FOLDER);
        if syre.exists() {
            return Err(MigrationError::corrupt(
                thot,
                format!("both {LEGACY_THOT_FOLDER} and {SYRE_FOLDER} exist"),
            ));
        }
        tracing::debug!(from = %thot.display(), "renaming legacy metadata folder");
        fs::rename(thot, &syre).io_context(|| {
            format!("failed to rename {} to {}", thot.display(), syre.display())
        })?;
    }
    if legacy.is_empty() {
        tracing::info!(project = %project.display(), "no legacy metadata folders");
    }
    Ok(legacy.len())
}

/// Strip `{"Relative": ..}` wrappers from every asset path in an assets
/// document. Written back only if something changed.
pub fn remove_relative_path_tags(assets_path: &Path) -> MigrationResult<bool> {
    let mut doc = JsonDocument::open(assets_path)?;
    let mut changed = false;
    for asset in RecordsShape::decode(&mut doc.value, assets_path)?.records_mut() {
        let owner = asset
            .get("rid")
            .and_then(Value::as_str)
            .map(|rid| format!("asset {rid}"))
            .unwrap_or_else(|| "asset".to_string());
        let Some(record) = asset.as_object_mut() else {
            return Err(MigrationError::malformed(assets_path, "asset is not an object"));
        };
        changed |= unwrap_relative_path(record, assets_path, &owner)?;
    }

    if changed {
        doc.overwrite()?;
    }
    Ok(changed)
}

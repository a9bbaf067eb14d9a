//! 0.9.x containers: `_container.json` and `_scripts.json` markers in the
//! container folder, converted into `.syre` documents.

use super::assets::{self, PlannedAsset};
use super::metadata::flatten_metadata;
use super::{
    AnalysisMap, CONTAINER_MARKER, LegacyImportOutcome, SCRIPT_ROOT_PREFIX, SCRIPTS_MARKER,
    ensure_syre_dir,
};
use crate::error::{IoContext, MigrationError, MigrationResult};
use crate::syre::document::{self, JsonDocument};
use crate::syre::paths::{self, syre_dir_of};
use crate::syre::tree;
use crate::syre::util::{new_rid, now_timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct LegacyContainer {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    description: Option<String>,
    tags: Option<Vec<Value>>,
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct LegacyScriptAssociation {
    script: String,
    autorun: bool,
    priority: i64,
}

#[derive(Debug, Serialize)]
struct ContainerProperties {
    name: Option<String>,
    kind: Option<String>,
    description: Option<String>,
    tags: Vec<Value>,
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct AnalysisAssociation {
    analysis: String,
    autorun: bool,
    priority: i64,
}

#[derive(Debug, Serialize)]
struct ContainerRecord {
    rid: String,
    properties: ContainerProperties,
    analyses: Vec<AnalysisAssociation>,
}

#[derive(Debug, Serialize)]
struct ContainerSettings {
    creator: Option<String>,
    created: String,
    permissions: Map<String, Value>,
}

/// Everything needed to convert one container, gathered before any write.
#[derive(Debug)]
struct ContainerPlan {
    dir: PathBuf,
    record: ContainerRecord,
    created: String,
    assets: Vec<PlannedAsset>,
}

fn read_marker<T: DeserializeOwned>(path: &Path) -> MigrationResult<T> {
    serde_json::from_value(document::load(path)?)
        .map_err(|err| MigrationError::malformed(path, err.to_string()))
}

fn resolve_associations(
    scripts_marker: &Path,
    scripts: Vec<LegacyScriptAssociation>,
    analyses: &AnalysisMap,
) -> MigrationResult<Vec<AnalysisAssociation>> {
    scripts
        .into_iter()
        .map(|assoc| {
            let Some(script) = assoc.script.strip_prefix(SCRIPT_ROOT_PREFIX) else {
                return Err(MigrationError::unknown_reference(
                    scripts_marker,
                    format!(
                        "script path `{}` does not start with `{SCRIPT_ROOT_PREFIX}`",
                        assoc.script
                    ),
                ));
            };
            let rid = analyses.get(script).ok_or_else(|| {
                MigrationError::unknown_reference(
                    scripts_marker,
                    format!("script `{script}` is not a known analysis"),
                )
            })?;
            Ok(AnalysisAssociation {
                analysis: rid.clone(),
                autorun: assoc.autorun,
                priority: assoc.priority,
            })
        })
        .collect()
}

/// Rid of a `container.json` left behind by an interrupted run.
fn existing_rid(dir: &Path) -> MigrationResult<Option<String>> {
    let path = paths::container_properties_of(dir);
    if !path.is_file() {
        return Ok(None);
    }
    let doc = document::load(&path)?;
    Ok(doc.get("rid").and_then(Value::as_str).map(ToOwned::to_owned))
}

fn plan_container(dir: &Path, analyses: &AnalysisMap) -> MigrationResult<ContainerPlan> {
    let container_marker = dir.join(CONTAINER_MARKER);
    let legacy: LegacyContainer = read_marker(&container_marker)?;

    let scripts_marker = dir.join(SCRIPTS_MARKER);
    let scripts: Vec<LegacyScriptAssociation> = if scripts_marker.is_file() {
        read_marker(&scripts_marker)?
    } else {
        Vec::new()
    };

    let metadata = flatten_metadata(&legacy.metadata.unwrap_or_default()).map_err(|key| {
        MigrationError::malformed(
            &container_marker,
            format!("metadata key `{key}` collides after flattening"),
        )
    })?;
    let associations = resolve_associations(&scripts_marker, scripts, analyses)?;
    let rid = existing_rid(dir)?.unwrap_or_else(new_rid);

    let created = now_timestamp();
    let assets = assets::plan_assets(dir, analyses, &created)?;

    Ok(ContainerPlan {
        dir: dir.to_path_buf(),
        record: ContainerRecord {
            rid,
            properties: ContainerProperties {
                name: legacy.name,
                kind: legacy.kind,
                description: legacy.description,
                tags: legacy.tags.unwrap_or_default(),
                metadata,
            },
            analyses: associations,
        },
        created,
        assets,
    })
}

fn append_assets(dir: &Path, planned: &[PlannedAsset]) -> MigrationResult<usize> {
    let assets_path = paths::assets_of(dir);
    let mut doc = JsonDocument::open_or_default(&assets_path, Value::Array(Vec::new()))?;
    let Value::Array(records) = &mut doc.value else {
        return Err(MigrationError::malformed(&assets_path, "assets must be a list"));
    };

    let known: BTreeSet<String> = records
        .iter()
        .filter_map(|record| record.get("path").and_then(Value::as_str))
        .map(ToOwned::to_owned)
        .collect();

    let mut appended = 0;
    for asset in planned {
        if known.contains(&asset.record.path) {
            tracing::debug!(path = %asset.record.path, "asset already recorded, keeping its id");
            continue;
        }
        let value = serde_json::to_value(&asset.record).map_err(|err| {
            MigrationError::malformed(&assets_path, format!("failed to serialize asset: {err}"))
        })?;
        records.push(value);
        appended += 1;
    }

    if appended > 0 || doc.was_defaulted() {
        doc.overwrite()?;
    }
    Ok(appended)
}

fn remove_marker(path: &Path) -> MigrationResult<()> {
    if path.is_file() {
        fs::remove_file(path).io_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}

fn commit_container(plan: ContainerPlan, outcome: &mut LegacyImportOutcome) -> MigrationResult<()> {
    let dir = &plan.dir;
    ensure_syre_dir(dir)?;

    let properties_path = paths::container_properties_of(dir);
    let mut properties = JsonDocument::open_or_default(&properties_path, Value::Null)?;
    properties.value = serde_json::to_value(&plan.record).map_err(|err| {
        MigrationError::malformed(&properties_path, format!("failed to serialize: {err}"))
    })?;
    properties.overwrite()?;

    document::create_new(
        &paths::container_settings_of(dir),
        &ContainerSettings {
            creator: None,
            created: plan.created.clone(),
            permissions: Map::new(),
        },
    )?;

    outcome.assets += append_assets(dir, &plan.assets)?;
    for asset in &plan.assets {
        if let Some(dest) = assets::relocate(dir, asset)? {
            outcome.leftover_folders.push(dest);
        }
        if asset.unresolved_creator {
            outcome.unresolved_creators.push(asset.folder.clone());
        }
    }

    remove_marker(&dir.join(CONTAINER_MARKER))?;
    remove_marker(&dir.join(SCRIPTS_MARKER))?;
    outcome.containers += 1;
    tracing::debug!(container = %dir.display(), assets = plan.assets.len(), "container converted");
    Ok(())
}

fn is_container(dir: &Path) -> bool {
    dir.join(CONTAINER_MARKER).is_file() || paths::container_properties_of(dir).is_file()
}

/// Convert the container tree below `data_root`, depth first. Containers
/// already converted by an interrupted run are walked but not rewritten.
pub fn convert_containers(
    data_root: &Path,
    analyses: &AnalysisMap,
) -> MigrationResult<LegacyImportOutcome> {
    if !data_root.join(CONTAINER_MARKER).is_file() && !syre_dir_of(data_root).is_dir() {
        return Err(MigrationError::corrupt(
            data_root,
            "data root is not a container",
        ));
    }

    let mut outcome = LegacyImportOutcome::default();
    let mut stack = vec![data_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if dir.join(CONTAINER_MARKER).is_file() {
            let plan = plan_container(&dir, analyses)?;
            commit_container(plan, &mut outcome)?;
        }

        let children = tree::child_dirs(&dir)?;
        for child in children.into_iter().rev() {
            if child.file_name().and_then(|s| s.to_str()) == Some(paths::SYRE_FOLDER) {
                continue;
            }
            if is_container(&child) {
                stack.push(child);
            }
        }
    }
    Ok(outcome)
}

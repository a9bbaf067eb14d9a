//! 0.10.2 -> 0.11.0
//!
//! Config: `users.json` becomes a list; `settings.json` is reduced to
//! `local_config.json`.
//! Projects and containers: `creator`/`created` move into settings,
//! associations become a list and permissions a map keyed by user.

use crate::error::{MigrationError, MigrationResult};
use crate::syre::chain::{Converter, LATEST_VERSION};
use crate::syre::context::{MigrationContext, project_data_path};
use crate::syre::document::{self, JsonDocument};
use crate::syre::paths::{self, CONTAINER_PROPERTIES_FILE};
use crate::syre::shapes::{AssociationsShape, CreatorPlacement, PermissionsShape, as_object_mut};
use crate::syre::tree;
use serde_json::{Map, Value, json};
use std::path::Path;

const SOURCE_VERSION: &str = "0.10.2";

pub struct Convert0_10_2;

impl Converter for Convert0_10_2 {
    fn convert_config(&self, ctx: &MigrationContext) -> MigrationResult<()> {
        convert_user_manifest(&ctx.paths.user_manifest)?;
        split_local_settings(&ctx.paths.legacy_local_settings, &ctx.paths.local_config)?;
        Ok(())
    }

    fn convert(&self, _ctx: &MigrationContext, project: &Path) -> MigrationResult<()> {
        convert_project_settings(project)?;
        let data_root = project_data_path(project)?;
        for container in tree::dirs_with_metadata(&data_root, CONTAINER_PROPERTIES_FILE)? {
            convert_container(&container)?;
        }
        Ok(())
    }
}

/// Rewrite the id-keyed user manifest as a list, after backing it up.
pub fn convert_user_manifest(manifest: &Path) -> MigrationResult<bool> {
    if !manifest.is_file() {
        tracing::info!(manifest = %manifest.display(), "no user manifest");
        return Ok(false);
    }

    let mut doc = JsonDocument::open(manifest)?;
    let users = match &doc.value {
        Value::Array(_) => {
            tracing::info!(manifest = %manifest.display(), "user manifest already a list");
            return Ok(false);
        }
        Value::Object(by_id) => by_id.values().cloned().collect::<Vec<_>>(),
        other => {
            return Err(MigrationError::malformed(
                manifest,
                format!("expected users map or list, found {other}"),
            ));
        }
    };

    let backup = document::backup(manifest, SOURCE_VERSION)?;
    tracing::info!(backup = %backup.display(), "backed up user manifest");
    doc.value = Value::Array(users);
    doc.overwrite()?;
    Ok(true)
}

/// Write `local_config.json` carrying only the active user. An existing
/// `local_config.json` is never replaced; the legacy file is left in place.
pub fn split_local_settings(legacy: &Path, local_config: &Path) -> MigrationResult<bool> {
    if local_config.exists() {
        tracing::info!(path = %local_config.display(), "local config already exists");
        return Ok(false);
    }
    if !legacy.is_file() {
        return Ok(false);
    }

    let settings = document::load(legacy)?;
    let user = match settings.get("active_user") {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(user)) => Value::String(user.clone()),
        Some(other) => {
            return Err(MigrationError::malformed(
                legacy,
                format!("invalid active user {other}"),
            ));
        }
    };
    document::create_new(local_config, &json!({ "user": user }))
}

/// Open a settings document, or start an empty one that is only written if
/// the conversion changes it.
fn open_settings(path: &Path) -> MigrationResult<JsonDocument> {
    JsonDocument::open_or_default(path, Value::Object(Map::new()))
}

/// Move `creator`/`created` from `properties` into `settings`. Returns
/// whether the settings value changed; the properties value is updated in
/// memory as well.
fn move_creator_fields(
    properties: &mut Map<String, Value>,
    settings: &mut Map<String, Value>,
    at: &Path,
) -> MigrationResult<bool> {
    match CreatorPlacement::decode(properties, settings, at)? {
        CreatorPlacement::InSettings => Ok(false),
        CreatorPlacement::InProperties { creator, created } => {
            settings.insert("creator".to_string(), creator);
            settings.insert("created".to_string(), created);
            properties.remove("creator");
            properties.remove("created");
            Ok(true)
        }
    }
}

fn convert_permissions(settings: &mut Map<String, Value>, doc: &Path) -> MigrationResult<bool> {
    match PermissionsShape::decode(settings, doc)? {
        PermissionsShape::Map => Ok(false),
        PermissionsShape::Missing => {
            settings.insert("permissions".to_string(), Value::Object(Map::new()));
            Ok(true)
        }
        PermissionsShape::List(entries) => {
            let mut by_user = Map::new();
            for entry in entries {
                let Value::Object(mut entry) = entry else {
                    return Err(MigrationError::malformed(doc, "permission is not an object"));
                };
                let Some(Value::String(user)) = entry.remove("user") else {
                    return Err(MigrationError::malformed(doc, "permission has no user"));
                };
                by_user.insert(user, Value::Object(entry));
            }
            settings.insert("permissions".to_string(), Value::Object(by_user));
            Ok(true)
        }
    }
}

pub fn convert_project_settings(project: &Path) -> MigrationResult<()> {
    let properties_path = paths::project_properties_of(project);
    let settings_path = paths::project_settings_of(project);
    let mut properties_doc = JsonDocument::open(&properties_path)?;
    let mut settings_doc = open_settings(&settings_path)?;
    let properties = as_object_mut(&mut properties_doc.value, &properties_path)?;
    let settings = as_object_mut(&mut settings_doc.value, &settings_path)?;

    let moved = move_creator_fields(properties, settings, project)?;
    if moved {
        settings.insert(
            "local_format_version".to_string(),
            Value::String(LATEST_VERSION.to_string()),
        );
    }
    let permissions_changed = convert_permissions(settings, &settings_path)?;

    // Settings first: a crash in between leaves both documents carrying the
    // fields, which the guard reports instead of losing them.
    if moved || permissions_changed {
        settings_doc.overwrite()?;
    }
    if moved {
        properties_doc.overwrite()?;
    }
    Ok(())
}

fn associations_to_list(
    container: &mut Map<String, Value>,
    doc: &Path,
) -> MigrationResult<bool> {
    match AssociationsShape::decode(container, doc)? {
        AssociationsShape::Missing => {
            container.insert("analyses".to_string(), Value::Array(Vec::new()));
            Ok(true)
        }
        AssociationsShape::Scripts => {
            let scripts = container.remove("scripts").unwrap_or(Value::Null);
            container.insert("analyses".to_string(), scripts);
            associations_to_list(container, doc)?;
            Ok(true)
        }
        AssociationsShape::Map => {
            let Some(Value::Object(by_id)) = container.remove("analyses") else {
                return Err(MigrationError::malformed(doc, "analyses changed shape"));
            };
            let mut list = Vec::with_capacity(by_id.len());
            for (rid, association) in by_id {
                let Value::Object(mut association) = association else {
                    return Err(MigrationError::malformed(
                        doc,
                        format!("association for {rid} is not an object"),
                    ));
                };
                association.remove("script");
                association.remove("analysis");
                let mut entry = Map::new();
                entry.insert("analysis".to_string(), Value::String(rid));
                entry.extend(association);
                list.push(Value::Object(entry));
            }
            container.insert("analyses".to_string(), Value::Array(list));
            Ok(true)
        }
        AssociationsShape::List => {
            let Some(Value::Array(list)) = container.get_mut("analyses") else {
                return Err(MigrationError::malformed(doc, "analyses changed shape"));
            };
            let mut changed = false;
            for association in list.iter_mut() {
                let association = as_object_mut(association, doc)?;
                if !association.contains_key("analysis") {
                    if let Some(script) = association.remove("script") {
                        association.insert("analysis".to_string(), script);
                        changed = true;
                    }
                }
            }
            Ok(changed)
        }
    }
}

pub fn convert_container(container_path: &Path) -> MigrationResult<()> {
    let properties_path = paths::container_properties_of(container_path);
    let settings_path = paths::container_settings_of(container_path);
    let mut properties_doc = JsonDocument::open(&properties_path)?;
    let mut settings_doc = open_settings(&settings_path)?;
    let properties = as_object_mut(&mut properties_doc.value, &properties_path)?;
    let settings = as_object_mut(&mut settings_doc.value, &settings_path)?;

    let moved = move_creator_fields(properties, settings, container_path)?;
    let associations_changed = associations_to_list(properties, &properties_path)?;
    let permissions_changed = convert_permissions(settings, &settings_path)?;

    if moved || permissions_changed {
        settings_doc.overwrite()?;
    }
    if moved || associations_changed {
        properties_doc.overwrite()?;
    }
    Ok(())
}

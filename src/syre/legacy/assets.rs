//! Asset folders of a 0.9.x container: `<container>/<folder>/_asset.json`
//! next to the data file it describes.

use super::metadata::flatten_metadata;
use super::{ASSET_MARKER, AnalysisMap, CONTAINER_MARKER, file_basename, move_path};
use crate::error::{IoContext, MigrationError, MigrationResult};
use crate::syre::document;
use crate::syre::paths::syre_dir_of;
use crate::syre::tree;
use crate::syre::util::new_rid;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct LegacyAsset {
    file: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    description: Option<String>,
    tags: Option<Vec<Value>>,
    metadata: Option<Map<String, Value>>,
    creator_type: Option<String>,
    creator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AssetCreator {
    User(Option<String>),
    Script(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetProperties {
    pub created: String,
    pub creator: AssetCreator,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<Value>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    pub rid: String,
    pub properties: AssetProperties,
    pub path: String,
}

/// An asset folder that passed every pre-flight check.
#[derive(Debug, Clone)]
pub struct PlannedAsset {
    pub folder: PathBuf,
    pub folder_name: String,
    pub file: String,
    /// The folder holds files besides the marker and the data file.
    pub has_leftovers: bool,
    pub unresolved_creator: bool,
    pub record: AssetRecord,
}

fn tmp_path(folder: &Path, folder_name: &str) -> PathBuf {
    folder.with_file_name(format!("{folder_name}.tmp"))
}

fn resolve_creator(
    asset: &LegacyAsset,
    analyses: &AnalysisMap,
    marker: &Path,
) -> MigrationResult<(AssetCreator, bool)> {
    match asset.creator_type.as_deref() {
        None | Some("user") => Ok((AssetCreator::User(None), false)),
        Some("script") => {
            let rid = asset
                .creator
                .as_deref()
                .map(file_basename)
                .and_then(|script| analyses.get(script));
            match rid {
                Some(rid) => Ok((AssetCreator::Script(rid.clone()), false)),
                None => {
                    tracing::warn!(
                        marker = %marker.display(),
                        script = asset.creator.as_deref().unwrap_or("<none>"),
                        "creator script is not a known analysis, recording an anonymous user"
                    );
                    Ok((AssetCreator::User(None), true))
                }
            }
        }
        Some(other) => Err(MigrationError::unknown_reference(
            marker,
            format!("unknown creator type `{other}`"),
        )),
    }
}

fn has_other_entries(folder: &Path, file: &str) -> MigrationResult<bool> {
    let entries =
        fs::read_dir(folder).io_context(|| format!("failed to read {}", folder.display()))?;
    for entry in entries {
        let entry = entry.io_context(|| format!("failed to read {}", folder.display()))?;
        let name = entry.file_name();
        if name != ASSET_MARKER && name != file {
            return Ok(true);
        }
    }
    Ok(false)
}

fn plan_asset(
    container: &Path,
    folder: &Path,
    analyses: &AnalysisMap,
    created: &str,
) -> MigrationResult<PlannedAsset> {
    let marker = folder.join(ASSET_MARKER);
    let folder_name = folder
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MigrationError::malformed(folder, "asset folder name is not valid UTF-8"))?
        .to_string();

    if folder.join(CONTAINER_MARKER).is_file() {
        return Err(MigrationError::corrupt(
            folder,
            "folder is marked as both an asset and a container",
        ));
    }

    let legacy: LegacyAsset = serde_json::from_value(document::load(&marker)?)
        .map_err(|err| MigrationError::malformed(&marker, err.to_string()))?;

    let file = legacy.file.clone().unwrap_or_else(|| folder_name.clone());
    if Path::new(&file).file_name().and_then(|s| s.to_str()) != Some(file.as_str()) {
        return Err(MigrationError::corrupt(
            &marker,
            format!("asset file `{file}` is not a plain file name"),
        ));
    }
    if !folder.join(&file).is_file() {
        return Err(MigrationError::corrupt(
            folder,
            format!("asset data file `{file}` is missing"),
        ));
    }

    // The data file may share its folder's name; that folder is moved aside first.
    let target = container.join(&file);
    if target.exists() && file != folder_name {
        return Err(MigrationError::corrupt(
            &target,
            "relocation target already exists",
        ));
    }
    let tmp = tmp_path(folder, &folder_name);
    if tmp.exists() {
        return Err(MigrationError::corrupt(&tmp, "temporary relocation path is taken"));
    }

    let has_leftovers = has_other_entries(folder, &file)?;
    if has_leftovers {
        let dest = syre_dir_of(container).join(&folder_name);
        if dest.exists() {
            return Err(MigrationError::corrupt(
                &dest,
                "destination for leftover asset files already exists",
            ));
        }
    }

    let (creator, unresolved_creator) = resolve_creator(&legacy, analyses, &marker)?;
    let metadata = flatten_metadata(&legacy.metadata.unwrap_or_default()).map_err(|key| {
        MigrationError::malformed(&marker, format!("metadata key `{key}` collides after flattening"))
    })?;

    Ok(PlannedAsset {
        folder: folder.to_path_buf(),
        folder_name,
        file: file.clone(),
        has_leftovers,
        unresolved_creator,
        record: AssetRecord {
            rid: new_rid(),
            properties: AssetProperties {
                created: created.to_string(),
                creator,
                name: legacy.name,
                kind: legacy.kind,
                description: legacy.description,
                tags: legacy.tags.unwrap_or_default(),
                metadata,
            },
            path: file,
        },
    })
}

/// Read and check every asset folder directly below `container`, in name
/// order. Nothing on disk changes.
pub fn plan_assets(
    container: &Path,
    analyses: &AnalysisMap,
    created: &str,
) -> MigrationResult<Vec<PlannedAsset>> {
    let mut planned = Vec::new();
    let mut targets = BTreeSet::new();
    for folder in tree::child_dirs(container)? {
        if !folder.join(ASSET_MARKER).is_file() {
            continue;
        }
        let asset = plan_asset(container, &folder, analyses, created)?;
        if !targets.insert(asset.file.clone()) {
            return Err(MigrationError::corrupt(
                &container.join(&asset.file),
                "two assets relocate to the same file",
            ));
        }
        planned.push(asset);
    }
    Ok(planned)
}

fn dir_is_empty(dir: &Path) -> MigrationResult<bool> {
    let mut entries =
        fs::read_dir(dir).io_context(|| format!("failed to read {}", dir.display()))?;
    Ok(entries.next().is_none())
}

/// Move an asset's data file up into its container and dispose of the
/// folder. Returns where leftover files went, if there were any.
pub fn relocate(container: &Path, asset: &PlannedAsset) -> MigrationResult<Option<PathBuf>> {
    let tmp = tmp_path(&asset.folder, &asset.folder_name);
    move_path(&asset.folder, &tmp)?;
    move_path(&tmp.join(&asset.file), &container.join(&asset.file))?;

    let marker = tmp.join(ASSET_MARKER);
    fs::remove_file(&marker).io_context(|| format!("failed to remove {}", marker.display()))?;

    if dir_is_empty(&tmp)? {
        fs::remove_dir(&tmp).io_context(|| format!("failed to remove {}", tmp.display()))?;
        return Ok(None);
    }

    let dest = syre_dir_of(container).join(&asset.folder_name);
    tracing::warn!(
        folder = %asset.folder.display(),
        dest = %dest.display(),
        "asset folder holds additional files, moving them into the container metadata folder"
    );
    move_path(&tmp, &dest)?;
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn asset_folder(container: &Path, folder: &str, marker: Value, data: Option<&str>) {
        let dir = container.join(folder);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(ASSET_MARKER), marker.to_string()).expect("marker");
        if let Some(name) = data {
            fs::write(dir.join(name), "1,2,3\n").expect("data");
        }
    }

    fn analyses() -> AnalysisMap {
        AnalysisMap::from([("fit.py".to_string(), "r-fit".to_string())])
    }

    #[test]
    fn script_creator_resolves_by_basename() {
        let tmp = tempdir().expect("tempdir");
        asset_folder(
            tmp.path(),
            "out",
            json!({"file": "out.csv", "creator_type": "script", "creator": "root:/../scripts/fit.py"}),
            Some("out.csv"),
        );
        let planned = plan_assets(tmp.path(), &analyses(), "now").expect("plan");
        assert_eq!(planned.len(), 1);
        assert_eq!(
            planned[0].record.properties.creator,
            AssetCreator::Script("r-fit".to_string())
        );
        assert!(!planned[0].unresolved_creator);
    }

    #[test]
    fn unknown_script_creator_falls_back_to_anonymous_user() {
        let tmp = tempdir().expect("tempdir");
        asset_folder(
            tmp.path(),
            "out",
            json!({"file": "out.csv", "creator_type": "script", "creator": "gone.py"}),
            Some("out.csv"),
        );
        let planned = plan_assets(tmp.path(), &analyses(), "now").expect("plan");
        assert_eq!(planned[0].record.properties.creator, AssetCreator::User(None));
        assert!(planned[0].unresolved_creator);
    }

    #[test]
    fn unknown_creator_type_is_fatal() {
        let tmp = tempdir().expect("tempdir");
        asset_folder(
            tmp.path(),
            "out",
            json!({"file": "out.csv", "creator_type": "robot"}),
            Some("out.csv"),
        );
        let err = plan_assets(tmp.path(), &analyses(), "now").expect_err("fatal");
        assert!(matches!(err, MigrationError::UnknownReference { .. }));
    }

    #[test]
    fn file_defaults_to_folder_name_and_relocates_over_it() {
        let tmp = tempdir().expect("tempdir");
        asset_folder(tmp.path(), "raw.csv", json!({"name": "Raw"}), Some("raw.csv"));

        let planned = plan_assets(tmp.path(), &analyses(), "now").expect("plan");
        assert_eq!(planned[0].file, "raw.csv");
        assert_eq!(
            serde_json::to_value(&planned[0].record.properties.creator).expect("json"),
            json!({"User": null})
        );

        let leftover = relocate(tmp.path(), &planned[0]).expect("relocate");
        assert!(leftover.is_none());
        assert!(tmp.path().join("raw.csv").is_file());
        assert!(!tmp.path().join("raw.csv.tmp").exists());
    }

    #[test]
    fn leftovers_move_into_metadata_folder() {
        let tmp = tempdir().expect("tempdir");
        fs::create_dir(tmp.path().join(".syre")).expect("mkdir");
        asset_folder(tmp.path(), "img", json!({"file": "a.png"}), Some("a.png"));
        fs::write(tmp.path().join("img/notes.txt"), "keep").expect("notes");

        let planned = plan_assets(tmp.path(), &analyses(), "now").expect("plan");
        assert!(planned[0].has_leftovers);
        let leftover = relocate(tmp.path(), &planned[0]).expect("relocate");

        let dest = tmp.path().join(".syre/img");
        assert_eq!(leftover, Some(dest.clone()));
        assert!(dest.join("notes.txt").is_file());
        assert!(!dest.join(ASSET_MARKER).exists());
        assert!(tmp.path().join("a.png").is_file());
        assert!(!tmp.path().join("img").exists());
    }

    #[test]
    fn missing_data_file_is_corrupt() {
        let tmp = tempdir().expect("tempdir");
        asset_folder(tmp.path(), "img", json!({"file": "a.png"}), None);
        let err = plan_assets(tmp.path(), &analyses(), "now").expect_err("corrupt");
        assert!(matches!(err, MigrationError::Corrupt { .. }));
    }

    #[test]
    fn existing_target_is_corrupt() {
        let tmp = tempdir().expect("tempdir");
        asset_folder(tmp.path(), "img", json!({"file": "a.png"}), Some("a.png"));
        fs::write(tmp.path().join("a.png"), "other").expect("write");
        let err = plan_assets(tmp.path(), &analyses(), "now").expect_err("corrupt");
        assert!(matches!(err, MigrationError::Corrupt { .. }));
    }
}

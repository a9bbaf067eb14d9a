//! 0.9.x -> current
//!
//! 0.9.x projects keep their metadata in marker files scattered through the
//! data tree (`_container.json`, `_scripts.json`, one `_asset.json` folder per
//! asset). This step builds the `.syre` layout from them directly in the
//! latest format; the later steps in the chain find nothing left to change.

mod assets;
mod container;
mod metadata;

use crate::error::{IoContext, MigrationError, MigrationResult};
use crate::syre::chain::{Converter, LATEST_VERSION};
use crate::syre::context::{MigrationContext, project_data_path};
use crate::syre::document;
use crate::syre::paths::{self, syre_dir_of};
use crate::syre::util::{hide_dir, new_rid, now_timestamp};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONTAINER_MARKER: &str = "_container.json";
pub const SCRIPTS_MARKER: &str = "_scripts.json";
pub const ASSET_MARKER: &str = "_asset.json";
pub const LEGACY_SCRIPTS_DIR: &str = "scripts";
pub const SCRIPT_ROOT_PREFIX: &str = "root:/../scripts/";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_ANALYSIS_DIR: &str = "analysis";

/// Legacy script file name -> analysis rid.
pub type AnalysisMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyImportOutcome {
    pub containers: usize,
    pub assets: usize,
    /// Asset folders that held extra files, moved under the container's `.syre`.
    pub leftover_folders: Vec<PathBuf>,
    /// Assets whose creator script could not be matched to an analysis.
    pub unresolved_creators: Vec<PathBuf>,
}

pub struct LegacyImport;

impl Converter for LegacyImport {
    fn convert(&self, ctx: &MigrationContext, project: &Path) -> MigrationResult<()> {
        let outcome = import_project(ctx, project)?;
        tracing::info!(
            project = %project.display(),
            containers = outcome.containers,
            assets = outcome.assets,
            leftover_folders = outcome.leftover_folders.len(),
            unresolved_creators = outcome.unresolved_creators.len(),
            "legacy project imported"
        );
        Ok(())
    }
}

pub fn import_project(ctx: &MigrationContext, project: &Path) -> MigrationResult<LegacyImportOutcome> {
    bootstrap_project(ctx, project)?;
    let analyses = import_analyses(ctx, project)?;
    let data_root = project_data_path(project)?;
    container::convert_containers(&data_root, &analyses)
}

pub(crate) fn move_path(from: &Path, to: &Path) -> MigrationResult<()> {
    fs::rename(from, to)
        .io_context(|| format!("failed to move {} to {}", from.display(), to.display()))
}

pub(crate) fn file_basename(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

/// Create `<dir>/.syre` if missing, hidden on Windows.
pub(crate) fn ensure_syre_dir(dir: &Path) -> MigrationResult<PathBuf> {
    let syre = syre_dir_of(dir);
    if !syre.is_dir() {
        fs::create_dir(&syre).io_context(|| format!("failed to create {}", syre.display()))?;
        hide_dir(&syre);
    }
    Ok(syre)
}

#[derive(Debug, Serialize)]
struct ProjectProperties {
    rid: String,
    name: String,
    description: Option<String>,
    data_root: &'static str,
    analysis_root: &'static str,
    meta_level: u32,
}

#[derive(Debug, Serialize)]
struct DesktopSettings {
    asset_drag_drop_kind: Option<String>,
    disable_analysis_after: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunnerSettings {
    python_path: Option<String>,
    r_path: Option<String>,
    continue_on_error: Option<bool>,
    max_tasks: Option<u32>,
}

#[derive(Debug, Serialize)]
enum ProjectCreator {
    Id(Option<String>),
}

#[derive(Debug, Serialize)]
struct ProjectSettings {
    local_format_version: &'static str,
    created: String,
    creator: ProjectCreator,
    permissions: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ExecutionEnv {
    language: &'static str,
    cmd: &'static str,
    args: Vec<String>,
    env: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct Analysis {
    #[serde(rename = "type")]
    kind: &'static str,
    rid: String,
    path: String,
    name: Option<String>,
    description: Option<String>,
    env: ExecutionEnv,
    creator: Option<String>,
    created: String,
}

/// Directory name of a project, tolerating trailing separators and `.`.
fn project_name(project: &Path) -> String {
    if let Some(name) = project.file_name() {
        return name.to_string_lossy().into_owned();
    }
    fs::canonicalize(project)
        .ok()
        .and_then(|abs| abs.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| project.display().to_string())
}

fn create_logged<T: Serialize>(path: &Path, value: &T) -> MigrationResult<()> {
    if document::create_new(path, value)? {
        tracing::debug!(path = %path.display(), "created");
    } else {
        tracing::debug!(path = %path.display(), "already present, left as is");
    }
    Ok(())
}

/// Create the project's `.syre` folder and its four documents, each only
/// when absent.
pub fn bootstrap_project(ctx: &MigrationContext, project: &Path) -> MigrationResult<()> {
    if !project.is_dir() {
        return Err(MigrationError::corrupt(project, "project folder does not exist"));
    }
    ensure_syre_dir(project)?;

    create_logged(
        &paths::project_properties_of(project),
        &ProjectProperties {
            rid: new_rid(),
            name: project_name(project),
            description: None,
            data_root: DEFAULT_DATA_DIR,
            analysis_root: DEFAULT_ANALYSIS_DIR,
            meta_level: 0,
        },
    )?;
    create_logged(
        &paths::project_desktop_settings_of(project),
        &DesktopSettings {
            asset_drag_drop_kind: None,
            disable_analysis_after: None,
        },
    )?;
    create_logged(
        &paths::project_runner_settings_of(project),
        &RunnerSettings {
            python_path: None,
            r_path: None,
            continue_on_error: None,
            max_tasks: None,
        },
    )?;

    let mut permissions = Map::new();
    if let Some(user) = &ctx.user {
        permissions.insert(
            user.clone(),
            json!({"read": true, "write": true, "execute": true}),
        );
    }
    create_logged(
        &paths::project_settings_of(project),
        &ProjectSettings {
            local_format_version: LATEST_VERSION,
            created: now_timestamp(),
            creator: ProjectCreator::Id(ctx.user.clone()),
            permissions,
        },
    )
}

fn has_script_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed == ext))
}

fn scan_scripts(scripts_dir: &Path, extensions: &[String]) -> MigrationResult<Vec<String>> {
    if !scripts_dir.is_dir() {
        tracing::info!(dir = %scripts_dir.display(), "no legacy scripts folder");
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(scripts_dir)
        .io_context(|| format!("failed to read {}", scripts_dir.display()))?;
    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.io_context(|| format!("failed to read {}", scripts_dir.display()))?;
        let path = entry.path();
        if !path.is_file() || !has_script_extension(&path, extensions) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
            scripts.push(name.to_string());
        }
    }
    scripts.sort();
    Ok(scripts)
}

fn create_analyses(
    ctx: &MigrationContext,
    scripts_dir: &Path,
    analyses_path: &Path,
) -> MigrationResult<AnalysisMap> {
    let scripts = scan_scripts(scripts_dir, &ctx.config.legacy.script_extensions)?;
    let created = now_timestamp();
    let analyses: Vec<Analysis> = scripts
        .into_iter()
        .map(|path| Analysis {
            kind: "Script",
            rid: new_rid(),
            path,
            name: None,
            description: None,
            env: ExecutionEnv {
                language: "Python",
                cmd: "python3",
                args: Vec::new(),
                env: Map::new(),
            },
            creator: ctx.user.clone(),
            created: created.clone(),
        })
        .collect();

    document::create_new(analyses_path, &analyses)?;
    Ok(analyses
        .into_iter()
        .map(|analysis| (analysis.path, analysis.rid))
        .collect())
}

fn read_analysis_map(analyses_path: &Path) -> MigrationResult<AnalysisMap> {
    let Value::Array(entries) = document::load(analyses_path)? else {
        return Err(MigrationError::malformed(analyses_path, "analyses must be a list"));
    };
    entries
        .iter()
        .map(|entry| {
            let path = entry.get("path").and_then(Value::as_str);
            let rid = entry.get("rid").and_then(Value::as_str);
            match (path, rid) {
                (Some(path), Some(rid)) => Ok((path.to_string(), rid.to_string())),
                _ => Err(MigrationError::malformed(
                    analyses_path,
                    format!("analysis without path or rid: {entry}"),
                )),
            }
        })
        .collect()
}

fn analysis_root(project: &Path) -> MigrationResult<PathBuf> {
    let properties = document::load(&paths::project_properties_of(project))?;
    let root = properties
        .get("analysis_root")
        .and_then(Value::as_str)
        .filter(|root| !root.is_empty())
        .unwrap_or(DEFAULT_ANALYSIS_DIR);
    Ok(project.join(root))
}

/// Write `analyses.json` from the legacy `scripts` folder unless it already
/// exists, then move `scripts` to the analysis root.
pub fn import_analyses(ctx: &MigrationContext, project: &Path) -> MigrationResult<AnalysisMap> {
    let analyses_path = paths::project_analyses_of(project);
    let scripts_dir = project.join(LEGACY_SCRIPTS_DIR);
    let map = if analyses_path.is_file() {
        read_analysis_map(&analyses_path)?
    } else {
        create_analyses(ctx, &scripts_dir, &analyses_path)?
    };

    if scripts_dir.is_dir() {
        let target = analysis_root(project)?;
        if target.exists() {
            return Err(MigrationError::corrupt(
                &target,
                format!("both {LEGACY_SCRIPTS_DIR} and the analysis root exist"),
            ));
        }
        move_path(&scripts_dir, &target)?;
    }
    Ok(map)
}

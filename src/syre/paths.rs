use crate::error::{MigrationError, MigrationResult};
use std::env;
use std::path::{Path, PathBuf};

pub const SYRE_FOLDER: &str = ".syre";
pub const LEGACY_THOT_FOLDER: &str = ".thot";

pub const PROJECT_PROPERTIES_FILE: &str = "project.json";
pub const PROJECT_SETTINGS_FILE: &str = "project_settings.json";
pub const PROJECT_ANALYSES_FILE: &str = "analyses.json";
pub const PROJECT_DESKTOP_SETTINGS_FILE: &str = "desktop_settings.json";
pub const PROJECT_RUNNER_SETTINGS_FILE: &str = "runner_settings.json";
pub const LEGACY_PROJECT_SCRIPTS_FILE: &str = "scripts.json";

pub const CONTAINER_PROPERTIES_FILE: &str = "container.json";
pub const CONTAINER_SETTINGS_FILE: &str = "container_settings.json";
pub const CONTAINER_ASSETS_FILE: &str = "assets.json";

pub const USER_MANIFEST_FILE: &str = "users.json";
pub const PROJECT_MANIFEST_FILE: &str = "project_manifest.json";
pub const LOCAL_CONFIG_FILE: &str = "local_config.json";
pub const LEGACY_LOCAL_SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Windows,
    MacOs,
    Linux,
}

impl Os {
    pub fn current() -> MigrationResult<Self> {
        Self::from_identity(env::consts::OS)
    }

    pub fn from_identity(identity: &str) -> MigrationResult<Self> {
        match identity {
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            other => Err(MigrationError::UnsupportedOs(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        }
    }
}

/// Locations of the global Syre store (user manifest, project manifest,
/// local config) that sit outside any single project.
#[derive(Debug, Clone)]
pub struct SyrePaths {
    pub config_dir: PathBuf,
    pub user_manifest: PathBuf,
    pub project_manifest: PathBuf,
    pub local_config: PathBuf,
    pub legacy_local_settings: PathBuf,
}

impl SyrePaths {
    pub fn in_dir(config_dir: PathBuf) -> Self {
        Self {
            user_manifest: config_dir.join(USER_MANIFEST_FILE),
            project_manifest: config_dir.join(PROJECT_MANIFEST_FILE),
            local_config: config_dir.join(LOCAL_CONFIG_FILE),
            legacy_local_settings: config_dir.join(LEGACY_LOCAL_SETTINGS_FILE),
            config_dir,
        }
    }
}

/// Store directory for `os`, given the platform's roaming data dir
/// (Windows), application support dir (macOS) or XDG config dir (Linux).
pub fn config_dir_for(os: Os, base: &Path) -> PathBuf {
    match os {
        Os::Windows => base.join("syre").join("syre-local").join("config"),
        Os::MacOs => base.join("ai.syre.syre-local"),
        Os::Linux => base.join("syre-local"),
    }
}

fn platform_base_dir(os: Os) -> MigrationResult<PathBuf> {
    let base = match os {
        Os::Windows | Os::MacOs => dirs::data_dir(),
        Os::Linux => dirs::config_dir(),
    };
    base.ok_or_else(|| {
        MigrationError::UnsupportedOs(format!(
            "{}: platform data directory could not be resolved",
            os.as_str()
        ))
    })
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

pub fn resolve_paths() -> MigrationResult<SyrePaths> {
    let os = Os::current()?;
    if let Some(dir) = env_path("SYRE_CONFIG_DIR") {
        return Ok(SyrePaths::in_dir(dir));
    }

    let base = platform_base_dir(os)?;
    Ok(SyrePaths::in_dir(config_dir_for(os, &base)))
}

/// Strips a Windows verbatim (`\\?\`) prefix from a manifest entry.
pub fn strip_windows_unc(path: &str) -> &str {
    path.strip_prefix(r"\\?\").unwrap_or(path)
}

pub fn syre_dir_of(base: &Path) -> PathBuf {
    base.join(SYRE_FOLDER)
}

pub fn project_properties_of(project: &Path) -> PathBuf {
    syre_dir_of(project).join(PROJECT_PROPERTIES_FILE)
}

pub fn project_settings_of(project: &Path) -> PathBuf {
    syre_dir_of(project).join(PROJECT_SETTINGS_FILE)
}

pub fn project_analyses_of(project: &Path) -> PathBuf {
    syre_dir_of(project).join(PROJECT_ANALYSES_FILE)
}

pub fn project_desktop_settings_of(project: &Path) -> PathBuf {
    syre_dir_of(project).join(PROJECT_DESKTOP_SETTINGS_FILE)
}

pub fn project_runner_settings_of(project: &Path) -> PathBuf {
    syre_dir_of(project).join(PROJECT_RUNNER_SETTINGS_FILE)
}

pub fn legacy_project_scripts_of(project: &Path) -> PathBuf {
    syre_dir_of(project).join(LEGACY_PROJECT_SCRIPTS_FILE)
}

pub fn container_properties_of(container: &Path) -> PathBuf {
    syre_dir_of(container).join(CONTAINER_PROPERTIES_FILE)
}

pub fn container_settings_of(container: &Path) -> PathBuf {
    syre_dir_of(container).join(CONTAINER_SETTINGS_FILE)
}

pub fn assets_of(container: &Path) -> PathBuf {
    syre_dir_of(container).join(CONTAINER_ASSETS_FILE)
}

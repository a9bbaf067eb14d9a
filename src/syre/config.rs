use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Keep converting the remaining projects after one fails.
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyConfig {
    pub script_extensions: Vec<String>,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        // 0.9.x only ran Python scripts.
        Self {
            script_extensions: vec!["py".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConverterConfig {
    pub chain: ChainConfig,
    pub legacy: LegacyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialConverterConfig {
    chain: Option<ChainConfig>,
    legacy: Option<LegacyConfig>,
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "on" => Some(true),
        "0" | "false" | "FALSE" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_start_matches('.').to_string())
        .collect()
}

fn validate(cfg: &ConverterConfig) -> Result<()> {
    if cfg.legacy.script_extensions.is_empty() {
        return Err(anyhow!(
            "invalid legacy script extensions: at least one is required"
        ));
    }
    for ext in &cfg.legacy.script_extensions {
        if ext.trim().is_empty() || ext.contains('.') || ext.contains(char::is_whitespace) {
            return Err(anyhow!(
                "invalid legacy script extension `{ext}`: use bare extensions such as `py`"
            ));
        }
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("SYRE_CONVERTER_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".syre").join("converter.toml"))
}

fn merge_toml(base: &mut ConverterConfig, raw: &str) -> Result<()> {
    let parsed: PartialConverterConfig = toml::from_str(raw)?;
    if let Some(chain) = parsed.chain {
        base.chain = chain;
    }
    if let Some(legacy) = parsed.legacy {
        base.legacy = legacy;
    }
    Ok(())
}

fn merge_file_config(base: &mut ConverterConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse converter config {}: {err}", path.display()))
}

fn apply_env_overrides<F>(cfg: &mut ConverterConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("SYRE_CONVERTER_CONTINUE_ON_ERROR").as_deref().and_then(parse_bool) {
        cfg.chain.continue_on_error = v;
    }
    if let Some(raw) = lookup("SYRE_CONVERTER_SCRIPT_EXTENSIONS") {
        let exts = parse_csv(&raw);
        if !exts.is_empty() {
            cfg.legacy.script_extensions = exts;
        }
    }
}

pub fn load_config() -> Result<ConverterConfig> {
    let mut cfg = ConverterConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg, |var| env::var(var).ok());
    validate(&cfg)?;
    Ok(cfg)
}

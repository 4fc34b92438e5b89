use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::QuillConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["quill.toml", "quill.yaml", "quill.yml", "quill.json"];

static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);
static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

fn read_override(slot: &RwLock<Option<PathBuf>>) -> Option<PathBuf> {
    slot.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write_override(slot: &RwLock<Option<PathBuf>>, value: Option<PathBuf>) {
    *slot.write().unwrap_or_else(|e| e.into_inner()) = value;
}

/// Override the config directory (e.g. from `--config-dir`).
pub fn set_config_dir(path: PathBuf) {
    write_override(&CONFIG_DIR_OVERRIDE, Some(path));
}

pub fn clear_config_dir() {
    write_override(&CONFIG_DIR_OVERRIDE, None);
}

/// Override the data directory (e.g. from `--data-dir`).
pub fn set_data_dir(path: PathBuf) {
    write_override(&DATA_DIR_OVERRIDE, Some(path));
}

pub fn clear_data_dir() {
    write_override(&DATA_DIR_OVERRIDE, None);
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<QuillConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./quill.{toml,yaml,yml,json}` (project-local)
/// 2. `<config dir>/quill.{toml,yaml,yml,json}` (user-global)
///
/// Returns `QuillConfig::default()` if no config file is found or it fails
/// to parse.
pub fn discover_and_load() -> QuillConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    QuillConfig::default()
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    // An explicit config dir replaces both search locations.
    if let Some(dir) = read_override(&CONFIG_DIR_OVERRIDE) {
        return CONFIG_FILENAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists());
    }

    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the config directory: the override, else `~/.config/quill/`.
pub fn config_dir() -> Option<PathBuf> {
    read_override(&CONFIG_DIR_OVERRIDE).or_else(|| {
        directories::ProjectDirs::from("", "", "quill").map(|d| d.config_dir().to_path_buf())
    })
}

/// Returns the data directory: the override, else the platform data dir,
/// else `./.quill`.
pub fn data_dir() -> PathBuf {
    read_override(&DATA_DIR_OVERRIDE)
        .or_else(|| {
            directories::ProjectDirs::from("", "", "quill").map(|d| d.data_dir().to_path_buf())
        })
        .unwrap_or_else(|| PathBuf::from(".quill"))
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill.toml")
}

/// Serialize `config` to TOML and write it to the config path.
///
/// Creates parent directories if needed. Returns the path written to.
pub fn save_config(config: &QuillConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> anyhow::Result<QuillConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

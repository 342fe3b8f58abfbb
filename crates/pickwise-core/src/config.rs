// Configuration loading and parsing (pickwise.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store::RemovalPolicy;

/// Name of the config file under `config/` (and its template under
/// `defaults/`).
pub const CONFIG_FILE: &str = "pickwise.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub event: EventConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub picklists: PicklistConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    /// Event key, e.g. `2025mndu`.
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. Empty means the platform data directory.
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PicklistConfig {
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "pickwise=info,warn".to_string()
}

impl Config {
    /// Where the SQLite file lives: the configured path, or `pickwise.db` in
    /// the platform data directory when none is set.
    pub fn resolved_db_path(&self) -> Result<PathBuf, ConfigError> {
        let configured = self.database.path.trim();
        if !configured.is_empty() {
            return Ok(PathBuf::from(configured));
        }
        let dirs = directories::ProjectDirs::from("org", "pickwise", "pickwise").ok_or_else(
            || ConfigError::ValidationError {
                field: "database.path".into(),
                message: "empty and no platform data directory is available".into(),
            },
        )?;
        Ok(dirs.data_dir().join("pickwise.db"))
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/pickwise.toml` relative to `base_dir`.
///
/// Does not copy defaults; see [`load_config`].
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = std::fs::read_to_string(&path).map_err(|_| ConfigError::FileNotFound {
        path: path.clone(),
    })?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    Ok(config)
}

/// Copy `defaults/pickwise.toml` to `config/pickwise.toml` when the latter
/// does not exist yet. Returns the path written, or `None` if a config was
/// already in place. An existing config is never touched.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.is_file() {
        return Ok(None);
    }

    let template = base_dir.join("defaults").join(CONFIG_FILE);
    if !template.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no {} and no template at {}",
                target.display(),
                template.display()
            ),
        });
    }

    if let Some(config_dir) = target.parent() {
        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", config_dir.display()),
        })?;
    }
    std::fs::copy(&template, &target).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {}: {e}", template.display()),
    })?;
    Ok(Some(target))
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let id = &config.event.id;
    if id.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "event.id".into(),
            message: "must not be empty".into(),
        });
    }
    if id.chars().any(char::is_whitespace) {
        return Err(ConfigError::ValidationError {
            field: "event.id".into(),
            message: format!("must not contain whitespace, got {id:?}"),
        });
    }

    if config.logging.filter.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "logging.filter".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// The workspace root, where `defaults/` lives.
    fn project_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    /// Fresh scratch dir with `config/pickwise.toml` containing `toml`.
    fn scratch_with_config(name: &str, toml: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config").join(CONFIG_FILE), toml).unwrap();
        tmp
    }

    #[test]
    fn load_shipped_defaults() {
        let tmp = std::env::temp_dir().join("pickwise_config_defaults");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::copy(
            project_root().join("defaults").join(CONFIG_FILE),
            tmp.join("defaults").join(CONFIG_FILE),
        )
        .unwrap();

        ensure_config_file(&tmp).unwrap();
        let config = load_config_from(&tmp).expect("defaults should be valid");

        assert_eq!(config.event.id, "2025mndu");
        assert_eq!(config.database.path, "pickwise.db");
        assert_eq!(config.picklists.removal_policy, RemovalPolicy::Strict);
        assert_eq!(config.logging.filter, "pickwise=info,warn");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn optional_sections_fall_back_to_defaults() {
        let tmp = scratch_with_config(
            "pickwise_config_minimal",
            "[event]\nid = \"2024casj\"\n",
        );

        let config = load_config_from(&tmp).unwrap();

        assert_eq!(config.event.id, "2024casj");
        assert!(config.database.path.is_empty());
        assert_eq!(config.picklists.removal_policy, RemovalPolicy::Strict);
        assert_eq!(config.logging.filter, "pickwise=info,warn");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parses_legacy_splice_policy() {
        let tmp = scratch_with_config(
            "pickwise_config_legacy_policy",
            "[event]\nid = \"2024casj\"\n\n[picklists]\nremoval_policy = \"legacy_splice\"\n",
        );

        let config = load_config_from(&tmp).unwrap();

        assert_eq!(
            config.picklists.removal_policy,
            RemovalPolicy::LegacySplice
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_event_id() {
        let tmp = scratch_with_config("pickwise_config_empty_event", "[event]\nid = \"  \"\n");

        let err = load_config_from(&tmp).unwrap_err();

        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "event.id"),
            other => panic!("expected ValidationError, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_event_id_with_spaces() {
        let tmp = scratch_with_config(
            "pickwise_config_spaced_event",
            "[event]\nid = \"2024 casj\"\n",
        );

        let err = load_config_from(&tmp).unwrap_err();

        assert!(matches!(err, ConfigError::ValidationError { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let tmp = scratch_with_config(
            "pickwise_config_bad_policy",
            "[event]\nid = \"2024casj\"\n\n[picklists]\nremoval_policy = \"loose\"\n",
        );

        let err = load_config_from(&tmp).unwrap_err();

        assert!(matches!(err, ConfigError::ParseError { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_config() {
        let tmp = std::env::temp_dir().join("pickwise_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = load_config_from(&tmp).unwrap_err();

        assert!(matches!(err, ConfigError::FileNotFound { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn configured_db_path_is_used_verbatim() {
        let tmp = scratch_with_config(
            "pickwise_config_db_path",
            "[event]\nid = \"2024casj\"\n\n[database]\npath = \"data/scout.db\"\n",
        );

        let config = load_config_from(&tmp).unwrap();

        assert_eq!(
            config.resolved_db_path().unwrap(),
            PathBuf::from("data/scout.db")
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn existing_config_is_left_alone() {
        let tmp = std::env::temp_dir().join("pickwise_config_ensure_skips");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), "from defaults").unwrap();
        fs::write(tmp.join("config").join(CONFIG_FILE), "user edited").unwrap();

        assert_eq!(ensure_config_file(&tmp).unwrap(), None);
        assert_eq!(
            fs::read_to_string(tmp.join("config").join(CONFIG_FILE)).unwrap(),
            "user edited"
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_config_is_copied_from_template() {
        let tmp = std::env::temp_dir().join("pickwise_config_ensure_copies");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), "x = 1").unwrap();
        fs::write(tmp.join("defaults").join("notes.txt"), "not a config").unwrap();

        let copied = ensure_config_file(&tmp).unwrap();

        let target = tmp.join("config").join(CONFIG_FILE);
        assert_eq!(copied, Some(target.clone()));
        assert_eq!(fs::read_to_string(&target).unwrap(), "x = 1");
        assert!(!tmp.join("config").join("notes.txt").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_config_and_template_is_an_error() {
        let tmp = std::env::temp_dir().join("pickwise_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = ensure_config_file(&tmp).unwrap_err();

        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }
}

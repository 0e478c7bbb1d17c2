mod config;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::config::YtconvConfig;
use ytconv_core::{Bitrate, ConvertError, ConvertResult, OutputType, QualityPolicy};

pub use config::{
    ApiConfig, DEFAULT_BASE_URL, DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUALITY, DEFAULT_TIMEOUT_SECS,
    DefaultConfig, OutputConfig, PollConfig, YtconvConfig as YtconvConfigData,
};

pub const ENV_BASE_URL: &str = "YTCONV_API_BASE_URL";
pub const ENV_DEFAULT_FORMAT: &str = "YTCONV_DEFAULT_FORMAT";
pub const ENV_OUTPUT_SIMPLE: &str = "YTCONV_OUTPUT_SIMPLE";

pub fn config_path() -> ConvertResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ConvertError::Config("home directory not found".to_string()))?;
    Ok(home.join(".ytconv").join("config.toml"))
}

pub fn load_config() -> ConvertResult<YtconvConfig> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> ConvertResult<YtconvConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file missing, using defaults");
        return Ok(YtconvConfig::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|err| ConvertError::Config(format!("failed to read config: {err}")))?;
    let config = toml::from_str(&content)
        .map_err(|err| ConvertError::Config(format!("failed to parse config: {err}")))?;
    Ok(config)
}

pub fn save_config(config: &YtconvConfig) -> ConvertResult<()> {
    save_config_to(&config_path()?, config)
}

pub fn save_config_to(path: &Path, config: &YtconvConfig) -> ConvertResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| ConvertError::Config(format!("failed to create config dir: {err}")))?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|err| ConvertError::Config(format!("failed to serialize config: {err}")))?;
    fs::write(path, content)
        .map_err(|err| ConvertError::Config(format!("failed to write config: {err}")))?;
    Ok(())
}

pub fn config_exists() -> ConvertResult<bool> {
    let path = config_path()?;
    Ok(path.exists())
}

/// Backend base URL without a trailing slash.
pub fn resolve_base_url(config: &YtconvConfig) -> String {
    pick_base_url(env::var(ENV_BASE_URL).ok(), config)
}

fn pick_base_url(env_value: Option<String>, config: &YtconvConfig) -> String {
    let raw = env_value
        .filter(|value| !value.trim().is_empty())
        .or_else(|| config.api.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    normalize_base_url(&raw)
}

pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

pub fn resolve_timeout(config: &YtconvConfig) -> Duration {
    Duration::from_secs(config.api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
}

pub fn resolve_default_format(config: &YtconvConfig) -> ConvertResult<Option<OutputType>> {
    pick_default_format(env::var(ENV_DEFAULT_FORMAT).ok(), config)
}

fn pick_default_format(
    env_value: Option<String>,
    config: &YtconvConfig,
) -> ConvertResult<Option<OutputType>> {
    env_value
        .filter(|value| !value.trim().is_empty())
        .or_else(|| config.default.format.clone())
        .map(|value| value.parse::<OutputType>())
        .transpose()
}

pub fn resolve_default_quality(config: &YtconvConfig) -> String {
    config
        .default
        .quality
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_QUALITY.to_string())
}

pub fn resolve_default_bitrate(config: &YtconvConfig) -> ConvertResult<Bitrate> {
    config
        .default
        .bitrate
        .map(Bitrate::new)
        .transpose()
        .map(Option::unwrap_or_default)
}

pub fn resolve_quality_policy(config: &YtconvConfig) -> ConvertResult<QualityPolicy> {
    config
        .default
        .quality_policy
        .as_deref()
        .map(str::parse::<QualityPolicy>)
        .transpose()
        .map(Option::unwrap_or_default)
}

pub fn resolve_poll_interval(config: &YtconvConfig) -> Duration {
    Duration::from_millis(config.poll.interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
}

pub fn resolve_max_poll_failures(config: &YtconvConfig) -> Option<u32> {
    config.poll.max_failures.filter(|limit| *limit > 0)
}

pub fn resolve_simple_output(config: &YtconvConfig) -> Option<bool> {
    if let Ok(value) = env::var(ENV_OUTPUT_SIMPLE) {
        return Some(parse_flag(&value));
    }
    config.output.simple
}

fn parse_flag(value: &str) -> bool {
    let normalized = value.trim().to_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes"
}

pub fn set_config_value(key_path: &str, value: &str) -> ConvertResult<()> {
    set_config_value_at(&config_path()?, key_path, value)
}

pub fn set_config_value_at(path: &Path, key_path: &str, value: &str) -> ConvertResult<()> {
    let content = if path.exists() {
        fs::read_to_string(path)
            .map_err(|err| ConvertError::Config(format!("failed to read config: {err}")))?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .unwrap_or_default();

    let parts: Vec<&str> = key_path.split('.').collect();
    let Some((last_part, parents)) = parts.split_last().filter(|_| parts.len() >= 2) else {
        return Err(ConvertError::Config(
            "key path must have at least 2 parts (e.g., 'api.base_url')".to_string(),
        ));
    };

    let mut current = doc.as_table_mut();
    for part in parents {
        current = current
            .entry(part)
            .or_insert(toml_edit::Item::Table(Default::default()))
            .as_table_mut()
            .ok_or_else(|| {
                ConvertError::Config(format!("cannot set nested value in '{}'", key_path))
            })?;
    }

    current[*last_part] = typed_value(value);

    // Validate against the schema before touching the file.
    let content = doc.to_string();
    toml::from_str::<YtconvConfig>(&content)
        .map_err(|err| ConvertError::Config(format!("invalid value for '{key_path}': {err}")))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| ConvertError::Config(format!("failed to create config dir: {err}")))?;
    }
    fs::write(path, content)
        .map_err(|err| ConvertError::Config(format!("failed to write config: {err}")))?;

    Ok(())
}

fn typed_value(value: &str) -> toml_edit::Item {
    if let Ok(number) = value.parse::<i64>() {
        return toml_edit::value(number);
    }
    match value {
        "true" => toml_edit::value(true),
        "false" => toml_edit::value(false),
        _ => toml_edit::value(value),
    }
}

pub fn open_in_editor() -> ConvertResult<()> {
    let path = config_path()?;
    if !path.exists() {
        save_config(&YtconvConfig::default())?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| {
        if cfg!(target_os = "macos") {
            "vim".to_string()
        } else if cfg!(target_os = "windows") {
            "notepad".to_string()
        } else {
            "nano".to_string()
        }
    });

    let status = Command::new(&editor)
        .arg(&path)
        .status()
        .map_err(|err| {
            ConvertError::Config(format!("failed to open editor '{}': {}", editor, err))
        })?;

    if !status.success() {
        return Err(ConvertError::Config(format!(
            "editor exited with status: {}",
            status
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use ytconv_core::{Bitrate, OutputType, QualityPolicy};

    use super::*;

    #[test]
    fn base_url_defaults_to_loopback() {
        let config = YtconvConfig::default();
        assert_eq!(pick_base_url(None, &config), "http://127.0.0.1:8000");
    }

    #[test]
    fn base_url_env_overrides_file_and_strips_slash() {
        let mut config = YtconvConfig::default();
        config.api.base_url = Some("http://files.local:9000".to_string());
        assert_eq!(pick_base_url(None, &config), "http://files.local:9000");
        assert_eq!(
            pick_base_url(Some("https://api.example.com/".to_string()), &config),
            "https://api.example.com"
        );
        assert_eq!(
            pick_base_url(Some("   ".to_string()), &config),
            "http://files.local:9000"
        );
    }

    #[test]
    fn default_format_prefers_env() {
        let mut config = YtconvConfig::default();
        assert_eq!(pick_default_format(None, &config).unwrap(), None);

        config.default.format = Some("mp4".to_string());
        assert_eq!(
            pick_default_format(None, &config).unwrap(),
            Some(OutputType::Mp4)
        );
        assert_eq!(
            pick_default_format(Some("mp3".to_string()), &config).unwrap(),
            Some(OutputType::Mp3)
        );
        assert!(pick_default_format(Some("ogg".to_string()), &config).is_err());
    }

    #[test]
    fn defaults_fill_missing_values() {
        let config = YtconvConfig::default();
        assert_eq!(resolve_timeout(&config), Duration::from_secs(60));
        assert_eq!(resolve_poll_interval(&config), Duration::from_millis(1000));
        assert_eq!(resolve_default_quality(&config), "720p");
        assert_eq!(resolve_default_bitrate(&config).unwrap(), Bitrate::default());
        assert_eq!(resolve_quality_policy(&config).unwrap(), QualityPolicy::Last);
        assert_eq!(resolve_max_poll_failures(&config), None);
    }

    #[test]
    fn invalid_bitrate_in_config_is_rejected() {
        let mut config = YtconvConfig::default();
        config.default.bitrate = Some(256);
        assert!(resolve_default_bitrate(&config).is_err());
    }

    #[test]
    fn zero_failure_limit_means_unlimited() {
        let mut config = YtconvConfig::default();
        config.poll.max_failures = Some(0);
        assert_eq!(resolve_max_poll_failures(&config), None);
        config.poll.max_failures = Some(5);
        assert_eq!(resolve_max_poll_failures(&config), Some(5));
    }

    #[test]
    fn set_value_keeps_types_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        set_config_value_at(&path, "api.base_url", "http://10.0.0.2:8000").unwrap();
        set_config_value_at(&path, "default.bitrate", "320").unwrap();
        set_config_value_at(&path, "output.simple", "true").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.api.base_url.as_deref(), Some("http://10.0.0.2:8000"));
        assert_eq!(config.default.bitrate, Some(320));
        assert_eq!(config.output.simple, Some(true));
    }

    #[test]
    fn set_value_rejects_short_paths_and_bad_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        assert!(matches!(
            set_config_value_at(&path, "base_url", "x"),
            Err(ConvertError::Config(_))
        ));
        assert!(matches!(
            set_config_value_at(&path, "default.bitrate", "fast"),
            Err(ConvertError::Config(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = YtconvConfig::default();
        config.default.quality = Some("1080p".to_string());
        config.poll.interval_ms = Some(250);

        save_config_to(&path, &config).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(resolve_default_quality(&loaded), "1080p");
        assert_eq!(resolve_poll_interval(&loaded), Duration::from_millis(250));
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("YES"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("off"));
    }
}

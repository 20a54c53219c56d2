//! Configuration for Telegram API, transfer and upload limits
//!
//! Loads configuration from config.yml file

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default constants (fallback if config.yml not found)
pub const SESSION_NAME: &str = "tg_turbo";
pub const CHECKPOINT_FILE: &str = "progress.json";
pub const DOWNLOADS_DIR: &str = "downloads";
pub const HISTORY_PAGE_SIZE: usize = 100;
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;
pub const CHANNEL_TITLE_PREFIX: &str = "#DRIVE";
pub const CLONE_ITEM_DELAY_MS: u64 = 2000;

/// Telegram accepts 2000 MB per file for regular accounts.
pub const SAFE_SIZE_LIMIT: u64 = 2000 * 1024 * 1024;
pub const CAPTION_LIMIT: usize = 1024;
pub const MESSAGE_LIMIT: usize = 4000;
pub const SEGMENT_SECONDS: u64 = 3600;
pub const MAX_UPLOAD_PASSES: u32 = 3;
pub const SUMMARY_FOOTER: &str = "Sent with tg_turbo";

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramConfig>,
    paths: Option<PathsConfig>,
    history: Option<HistoryConfig>,
    transfer: Option<TransferConfig>,
    #[serde(rename = "clone")]
    clone_section: Option<CloneConfig>,
    upload: Option<UploadConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    api_id: Option<String>,
    api_hash: Option<String>,
    phone: Option<String>,
    session_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsConfig {
    downloads: Option<PathBuf>,
    checkpoint_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryConfig {
    page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TransferConfig {
    max_rate_limit_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CloneConfig {
    title_prefix: Option<String>,
    #[serde(default)]
    admins: Vec<String>,
    item_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct UploadConfig {
    safe_size_mb: Option<u64>,
    caption_limit: Option<usize>,
    message_limit: Option<usize>,
    segment_seconds: Option<u64>,
    max_passes: Option<u32>,
    footer: Option<String>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Limits for the upload pipeline.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Largest file or archive volume the pipeline will try to send
    pub safe_size_limit: u64,
    pub caption_limit: usize,
    pub message_limit: usize,
    /// Fallback segment length when a video duration cannot be probed
    pub segment_seconds: u64,
    pub max_passes: u32,
    pub footer: String,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            safe_size_limit: SAFE_SIZE_LIMIT,
            caption_limit: CAPTION_LIMIT,
            message_limit: MESSAGE_LIMIT,
            segment_seconds: SEGMENT_SECONDS,
            max_passes: MAX_UPLOAD_PASSES,
            footer: SUMMARY_FOOTER.to_string(),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub phone: String,
    pub api_id: i32,
    pub api_hash: String,
    pub session_name: String,
    pub lock_file: String,
    pub downloads_dir: PathBuf,
    pub checkpoint_file: PathBuf,
    pub history_page_size: usize,
    pub max_rate_limit_retries: u32,
    pub channel_title_prefix: String,
    pub admins: Vec<String>,
    pub clone_item_delay: Duration,
    pub upload: UploadLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml values
    pub fn new() -> Self {
        Self::load_from_file("config.yml")
            .or_else(|_| Self::load_from_file("../config.yml"))
            .unwrap_or_else(|_| Self::from_yaml(YamlConfig::default()))
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> String {
        if let Some(ref v) = value {
            if let Some(var_name) = v.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
                if let Ok(env_val) = std::env::var(var_name) {
                    return env_val;
                }
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return env_val;
        }
        value.unwrap_or_default()
    }

    /// Resolve an integer value from string config or env var.
    /// Literal numbers in YAML win over the environment.
    fn resolve_env_i32(value: Option<String>, env_key: &str) -> i32 {
        if let Some(ref v) = value {
            if let Ok(parsed) = v.parse::<i32>() {
                return parsed;
            }
        }
        Self::resolve_env_string(value, env_key)
            .parse::<i32>()
            .unwrap_or(0)
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let yaml: YamlConfig = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        Ok(Self::from_yaml(yaml))
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let telegram = yaml.telegram.unwrap_or_default();
        let paths = yaml.paths.unwrap_or_default();
        let history = yaml.history.unwrap_or_default();
        let transfer = yaml.transfer.unwrap_or_default();
        let clone = yaml.clone_section.unwrap_or_default();
        let upload = yaml.upload.unwrap_or_default();

        let session_name = telegram
            .session_name
            .unwrap_or_else(|| SESSION_NAME.to_string());

        let defaults = UploadLimits::default();
        let upload = UploadLimits {
            safe_size_limit: upload
                .safe_size_mb
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.safe_size_limit),
            caption_limit: upload.caption_limit.unwrap_or(defaults.caption_limit),
            message_limit: upload.message_limit.unwrap_or(defaults.message_limit),
            segment_seconds: upload.segment_seconds.unwrap_or(defaults.segment_seconds),
            max_passes: upload.max_passes.unwrap_or(defaults.max_passes).max(1),
            footer: upload.footer.unwrap_or(defaults.footer),
        };

        Self {
            api_id: Self::resolve_env_i32(telegram.api_id, "TELEGRAM_API_ID"),
            api_hash: Self::resolve_env_string(telegram.api_hash, "TELEGRAM_API_HASH"),
            phone: Self::resolve_env_string(telegram.phone, "TELEGRAM_PHONE"),
            lock_file: format!("{}.lock", session_name),
            session_name,
            downloads_dir: paths
                .downloads
                .unwrap_or_else(|| PathBuf::from(DOWNLOADS_DIR)),
            checkpoint_file: paths
                .checkpoint_file
                .unwrap_or_else(|| PathBuf::from(CHECKPOINT_FILE)),
            history_page_size: history.page_size.unwrap_or(HISTORY_PAGE_SIZE).max(1),
            max_rate_limit_retries: transfer
                .max_rate_limit_retries
                .unwrap_or(MAX_RATE_LIMIT_RETRIES),
            channel_title_prefix: clone
                .title_prefix
                .unwrap_or_else(|| CHANNEL_TITLE_PREFIX.to_string()),
            admins: clone.admins,
            clone_item_delay: Duration::from_millis(
                clone.item_delay_ms.unwrap_or(CLONE_ITEM_DELAY_MS),
            ),
            upload,
        }
    }

    /// Path of the grammers session database.
    pub fn session_file(&self) -> String {
        format!("{}.session", self.session_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    static ENV_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(value) => std::env::set_var(&self.key, value),
                None => std::env::remove_var(&self.key),
            }
        }
    }

    fn set_envs(vars: &[(&str, &str)]) -> Vec<EnvGuard> {
        vars.iter().map(|(k, v)| EnvGuard::set(k, v)).collect()
    }

    fn write_yaml(name: &str, yaml: &str) -> PathBuf {
        let temp_file = std::env::temp_dir().join(name);
        std::fs::write(&temp_file, yaml).unwrap();
        temp_file
    }

    #[test]
    fn defaults_cover_every_section() {
        let config = Config::from_yaml(YamlConfig::default());

        assert_eq!(config.session_name, SESSION_NAME);
        assert_eq!(config.lock_file, "tg_turbo.lock");
        assert_eq!(config.checkpoint_file, PathBuf::from(CHECKPOINT_FILE));
        assert_eq!(config.downloads_dir, PathBuf::from(DOWNLOADS_DIR));
        assert_eq!(config.history_page_size, HISTORY_PAGE_SIZE);
        assert_eq!(config.channel_title_prefix, "#DRIVE");
        assert_eq!(config.clone_item_delay, Duration::from_secs(2));
        assert!(config.admins.is_empty());
        assert_eq!(config.upload.safe_size_limit, 2000 * 1024 * 1024);
        assert_eq!(config.upload.caption_limit, 1024);
        assert_eq!(config.upload.message_limit, 4000);
    }

    #[test]
    fn test_load_from_yaml() {
        let _lock = ENV_LOCK.lock().unwrap();
        let yaml = r##"
telegram:
  api_id: 12345
  api_hash: "test_hash"
  session_name: "media"

paths:
  downloads: "/data/downloads"
  checkpoint_file: "/data/progress.json"

history:
  page_size: 50

clone:
  title_prefix: "#ARCHIVE"
  admins: ["alice", "bob"]
  item_delay_ms: 0

upload:
  safe_size_mb: 1900
  caption_limit: 900
  max_passes: 0
"##;
        let temp_file = write_yaml("tg_turbo_config_full.yml", yaml);
        let config = Config::load_from_file(&temp_file).unwrap();

        assert_eq!(config.api_id, 12345);
        assert_eq!(config.session_name, "media");
        assert_eq!(config.session_file(), "media.session");
        assert_eq!(config.downloads_dir, PathBuf::from("/data/downloads"));
        assert_eq!(config.checkpoint_file, PathBuf::from("/data/progress.json"));
        assert_eq!(config.history_page_size, 50);
        assert_eq!(config.channel_title_prefix, "#ARCHIVE");
        assert_eq!(config.admins, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(config.clone_item_delay, Duration::ZERO);
        assert_eq!(config.upload.safe_size_limit, 1900 * 1024 * 1024);
        assert_eq!(config.upload.caption_limit, 900);
        assert_eq!(config.upload.max_passes, 1);
        assert_eq!(config.upload.message_limit, MESSAGE_LIMIT);

        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn env_placeholders_are_resolved_from_environment() {
        let _lock = ENV_LOCK.lock().unwrap();
        let yaml = r#"
telegram:
  api_id: "${TELEGRAM_API_ID}"
  api_hash: "${TELEGRAM_API_HASH}"
  phone: "+should_be_overridden"
"#;
        let temp_file = write_yaml("tg_turbo_config_env.yml", yaml);

        let _guards = set_envs(&[
            ("TELEGRAM_API_ID", "4242"),
            ("TELEGRAM_API_HASH", "hash_from_env"),
            ("TELEGRAM_PHONE", "+1999"),
        ]);

        let config = Config::load_from_file(&temp_file).unwrap();

        assert_eq!(config.api_id, 4242);
        assert_eq!(config.api_hash, "hash_from_env");
        assert_eq!(config.phone, "+1999");

        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn env_does_not_override_numeric_yaml_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let yaml = r#"
telegram:
  api_id: 321
  phone: "from_yaml"
"#;
        let temp_file = write_yaml("tg_turbo_config_numeric.yml", yaml);

        let _guards = set_envs(&[("TELEGRAM_API_ID", "9999"), ("TELEGRAM_PHONE", "+8888")]);

        let config = Config::load_from_file(&temp_file).unwrap();

        assert_eq!(config.api_id, 321);
        assert_eq!(config.phone, "+8888");

        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn load_from_file_fails_on_missing_file() {
        let result = Config::load_from_file("/nonexistent/path/config.yml");
        assert!(result.is_err());
    }

    #[test]
    fn load_from_file_fails_on_invalid_yaml() {
        let temp_file = write_yaml("tg_turbo_config_invalid.yml", "{ invalid yaml [");

        let result = Config::load_from_file(&temp_file);
        assert!(result.is_err());

        std::fs::remove_file(temp_file).ok();
    }
}

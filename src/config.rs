use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::errors::{AppError, Result};

/// Environment variables with this prefix override the config file,
/// e.g. `SONG_RESOLVER__SPOTIFY__CLIENT_ID`.
pub const ENV_PREFIX: &str = "SONG_RESOLVER";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Path suffixes treated as direct links to raw media files.
    pub supported_extensions: Vec<String>,
    pub ytdlp_path: String,
    pub cookie_path: Option<PathBuf>,
    pub worker_threads: usize,
    pub search_results: usize,
    pub title_cache_ttl_secs: u64,
    pub spotify: SpotifyCredentials,
    pub http: HttpConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SpotifyCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supported_extensions: [
                ".webm", ".mp4", ".mp3", ".avi", ".wav", ".m4v", ".ogg", ".mov", ".flac", ".m4a",
                ".opus",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
            ytdlp_path: "yt-dlp".to_string(),
            cookie_path: None,
            worker_threads: 1,
            search_results: 5,
            title_cache_ttl_secs: 3600,
            spotify: SpotifyCredentials::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            )
            .to_string(),
            timeout_secs: 15,
            proxy: None,
        }
    }
}

impl SpotifyCredentials {
    /// Both halves of the client credentials, if configured.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Loads the config from the user's config directory, writing the
    /// defaults there first if no file exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            AppConfig::default().save_to(&config_path)?;
            log::info!("📝 [CONFIG] Wrote default configuration to {:?}", config_path);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: &Path, env_prefix: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("supported_extensions"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent() {
            if !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Could not find config directory".to_string(),
            ))
        })?;

        Ok(config_dir.join("song-resolver").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "worker_threads": 2, "spotify": { "client_id": "abc" } }"#)
            .expect("write config");

        let config = AppConfig::load_from(&path).expect("load config");
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.spotify.client_id.as_deref(), Some("abc"));
        assert!(config.spotify.pair().is_none());
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert!(config.supported_extensions.contains(&".mp3".to_string()));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config =
            AppConfig::load_from(&temp_dir.path().join("absent.json")).expect("load config");
        assert_eq!(config.search_results, 5);
        assert_eq!(config.http.timeout_secs, 15);
    }

    #[test]
    fn save_then_load() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.cookie_path = Some(PathBuf::from("/tmp/cookies.txt"));
        config.save_to(&path).expect("save config");

        let loaded = AppConfig::load_from(&path).expect("load config");
        assert_eq!(loaded.cookie_path, config.cookie_path);
    }

    #[test]
    fn environment_overrides_file() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "search_results": 3 }"#).expect("write config");

        std::env::set_var("SONG_RESOLVER_ENVTEST__SEARCH_RESULTS", "9");
        std::env::set_var("SONG_RESOLVER_ENVTEST__SPOTIFY__CLIENT_SECRET", "shh");
        let config =
            AppConfig::load_with_prefix(&path, "SONG_RESOLVER_ENVTEST").expect("load config");
        std::env::remove_var("SONG_RESOLVER_ENVTEST__SEARCH_RESULTS");
        std::env::remove_var("SONG_RESOLVER_ENVTEST__SPOTIFY__CLIENT_SECRET");

        assert_eq!(config.search_results, 9);
        assert_eq!(config.spotify.client_secret.as_deref(), Some("shh"));
    }
}

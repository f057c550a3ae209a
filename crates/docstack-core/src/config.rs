//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/docstack/config.toml)
//! 3. Environment variables (DOCSTACK_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable prefix
const ENV_PREFIX: &str = "DOCSTACK";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Prefix applied to every logical endpoint name
    #[serde(default)]
    pub endpoint_prefix: String,

    /// Whether the cache tier is used; when false, cache operations pass
    /// through to the authoritative tier
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// The closed set of logical collection names
    #[serde(default)]
    pub collections: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_prefix: String::new(),
            cache_enabled: true,
            collections: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (DOCSTACK_ENDPOINT_PREFIX, DOCSTACK_CACHE_ENABLED,
    ///    DOCSTACK_COLLECTIONS)
    /// 2. Config file (~/.config/docstack/config.toml or DOCSTACK_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build a configuration directly (embedded and test use)
    pub fn with_collections(prefix: &str, collections: &[&str]) -> Self {
        Self {
            endpoint_prefix: prefix.to_string(),
            cache_enabled: true,
            collections: collections.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // DOCSTACK_ENDPOINT_PREFIX
        if let Ok(val) = std::env::var(format!("{}_ENDPOINT_PREFIX", ENV_PREFIX)) {
            self.endpoint_prefix = val;
        }

        // DOCSTACK_CACHE_ENABLED
        if let Ok(val) = std::env::var(format!("{}_CACHE_ENABLED", ENV_PREFIX)) {
            self.cache_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // DOCSTACK_COLLECTIONS (comma-separated)
        if let Ok(val) = std::env::var(format!("{}_COLLECTIONS", ENV_PREFIX)) {
            self.collections = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with DOCSTACK_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docstack")
            .join("config.toml")
    }
}

fn default_cache_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap();
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            // Clear all the vars
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "DOCSTACK_ENDPOINT_PREFIX",
        "DOCSTACK_CACHE_ENABLED",
        "DOCSTACK_COLLECTIONS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.cache_enabled);
        assert!(config.endpoint_prefix.is_empty());
        assert!(config.collections.is_empty());
    }

    #[test]
    fn test_env_override_endpoint_prefix() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("DOCSTACK_ENDPOINT_PREFIX", "staging_");
        config.apply_env_overrides();

        assert_eq!(config.endpoint_prefix, "staging_");
    }

    #[test]
    fn test_env_override_cache_enabled() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(config.cache_enabled);

        env::set_var("DOCSTACK_CACHE_ENABLED", "false");
        config.apply_env_overrides();
        assert!(!config.cache_enabled);

        env::set_var("DOCSTACK_CACHE_ENABLED", "1");
        config.apply_env_overrides();
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_env_override_collections() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("DOCSTACK_COLLECTIONS", "items, users,orders");
        config.apply_env_overrides();

        assert_eq!(config.collections, vec!["items", "users", "orders"]);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            endpoint_prefix: "dev_".to_string(),
            cache_enabled: false,
            collections: vec!["items".to_string()],
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("endpoint_prefix"));
        assert!(toml_str.contains("cache_enabled"));
        assert!(toml_str.contains("collections"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.endpoint_prefix, config.endpoint_prefix);
        assert_eq!(parsed.cache_enabled, config.cache_enabled);
        assert_eq!(parsed.collections, config.collections);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            endpoint_prefix = "prod_"
            cache_enabled = false
            collections = ["items", "users"]
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.endpoint_prefix, "prod_");
        assert!(!config.cache_enabled);
        assert_eq!(config.collections, vec!["items", "users"]);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        // Should return defaults when file doesn't exist
        assert!(config.cache_enabled);
        assert!(config.collections.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "endpoint_prefix = \"dev_\"\ncollections = [\"items\"]\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.endpoint_prefix, "dev_");
        assert_eq!(config.collections, vec!["items"]);
        assert!(config.cache_enabled);
    }
}

use serde::{Deserialize, Serialize};

pub use estatemap_cache::{CacheConfig, MAX_EXPIRATION_MINUTES, RedisConfig};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Cache validations
        if self.cache.memory_size_limit == 0 {
            return Err("cache.memory_size_limit must be > 0".into());
        }
        if self.cache.max_payload_bytes == 0 {
            return Err("cache.max_payload_bytes must be > 0".into());
        }
        if self.cache.absolute_expiration_minutes > MAX_EXPIRATION_MINUTES {
            return Err(format!(
                "cache.absolute_expiration_minutes must be <= {MAX_EXPIRATION_MINUTES}"
            ));
        }
        if self.cache.sliding_expiration_minutes > MAX_EXPIRATION_MINUTES {
            return Err(format!(
                "cache.sliding_expiration_minutes must be <= {MAX_EXPIRATION_MINUTES}"
            ));
        }
        // Redis validations
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.redis.timeout_ms == 0 {
            return Err("redis.timeout_ms must be > 0".into());
        }
        let schemes = ["redis://", "rediss://", "redis+unix://"];
        if let Some(url) = self.redis.url.as_deref().filter(|u| !u.trim().is_empty()) {
            if !schemes.iter().any(|s| url.starts_with(s)) {
                return Err(format!("redis.url must start with one of {schemes:?}"));
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

/// Where house data comes from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DataSourceConfig {
    /// Read from the database. When false, data comes from a generator and
    /// the startup warmup is skipped.
    #[serde(default)]
    pub use_database: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "estatemap.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        // Environment variable overrides, e.g., ESTATEMAP__CACHE__ENABLE_SHARED_STORE=true
        builder = builder.add_source(
            Environment::with_prefix("ESTATEMAP")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

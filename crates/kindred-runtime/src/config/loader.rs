//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides ([`ConfigLoader::merge`])
//! 3. Main config file (`kindred.toml`)
//! 4. Profile-specific config file (`kindred.{profile}.toml`)
//! 5. Environment variables (`KINDRED_*`)
//!
//! Files are searched in the current directory, then in the user config
//! directory (`~/.config/kindred` on Linux). An explicit [`ConfigLoader::file`]
//! skips the search and must exist.
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `KINDRED_` prefix with `__` as separator:
//!
//! - `KINDRED_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `KINDRED_IRC__TOKEN=oauth:xxx` → `irc.token = "oauth:xxx"`
//! - `KINDRED_PLUGINS__RUNES__REGION=euw1` → `plugins.runes.region = "euw1"`
//!
//! # Example
//!
//! ```rust,ignore
//! use kindred_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::KindredConfig;

const FILE_STEM: &str = "kindred";
const ENV_PREFIX: &str = "KINDRED_";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `prod` and `dev` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `KINDRED_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var(format!("{ENV_PREFIX}PROFILE"))
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: KindredConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration. Validation is left to the caller.
    pub fn load(self) -> ConfigResult<KindredConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: KindredConfig = figment.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            irc = config.irc.enabled,
            webhook = config.webhook.enabled,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(KindredConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(FILE_STEM));
        }
        paths
    }

    /// Merges the first directory holding `kindred.toml`, plus its profile
    /// variant when present.
    #[cfg(feature = "toml-config")]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        for dir in self.resolve_search_paths() {
            let base = dir.join(format!("{FILE_STEM}.toml"));
            if !base.exists() {
                continue;
            }
            info!(path = %base.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(&base));

            let profiled = dir.join(format!("{FILE_STEM}.{}.toml", self.profile));
            if profiled.exists() {
                debug!(path = %profiled.display(), "Loading profile-specific config");
                figment = figment.merge(Toml::file(&profiled));
            }
            return figment;
        }
        warn!("No configuration file found, using defaults");
        figment
    }

    #[cfg(not(feature = "toml-config"))]
    fn load_config_files(&self, figment: Figment) -> Figment {
        debug!(paths = ?self.resolve_search_paths(), "No configuration file format enabled");
        figment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;

    #[test]
    fn test_default_config() {
        figment::Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Info);
            assert_eq!(config.dispatch.sigil, "!");
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "kindred.toml",
                r##"
                    admins = ["Streamer"]

                    [dispatch]
                    sigil = "?"

                    [irc]
                    enabled = true
                    nick = "filebot"
                    channels = ["#stream"]

                    [plugins.runes]
                    region = "euw1"
                "##,
            )?;
            jail.set_env("KINDRED_IRC__NICK", "envbot");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.admins, vec!["Streamer"]);
            assert_eq!(config.dispatch.sigil, "?");
            assert_eq!(config.irc.nick, "envbot");
            assert_eq!(config.irc.channels, vec!["#stream"]);
            assert_eq!(config.plugins["runes"]["region"], "euw1");
            // untouched sections keep their defaults
            assert_eq!(config.webhook.path, "/twitch_webhook");
            Ok(())
        });
    }

    #[test]
    fn test_profile_file_overrides_base() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("kindred.toml", "[logging]\nlevel = \"info\"\n")?;
            jail.create_file("kindred.production.toml", "[logging]\nlevel = \"warn\"\n")?;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .profile("prod")
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Warn);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let result = ConfigLoader::new()
            .file("/definitely/not/here/kindred.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_bad_value_is_parse_error() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("kindred.toml", "[logging]\nlevel = \"loud\"\n")?;
            let result = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load();
            assert!(matches!(result, Err(ConfigError::ParseError(_))));
            Ok(())
        });
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }
}

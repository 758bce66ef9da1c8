use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Name of the settings file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "calcrelay.yaml";

/// Prefix of environment overrides, e.g. `CALCRELAY__RUN__TIMEOUT_SECS=60`.
pub const ENV_PREFIX: &str = "CALCRELAY";

const ENV_SEPARATOR: &str = "__";

/// Configuration manager for loading and saving `calcrelay.yaml`.
///
/// Settings are layered: built-in defaults, then the YAML file (optional),
/// then `CALCRELAY__SECTION__KEY` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration from the file and the process environment.
    ///
    /// # Returns
    /// The loaded AppConfig, or defaults (plus any environment overrides) if
    /// the file doesn't exist
    pub fn load_config(&self) -> Result<AppConfig> {
        self.load_with(Self::environment())
    }

    /// Load the configuration with environment overrides taken from `vars`
    /// instead of the process environment.
    pub fn load_config_from_vars<I>(&self, vars: I) -> Result<AppConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: config::Map<String, String> = vars.into_iter().collect();
        self.load_with(Self::environment().source(Some(vars)))
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    fn load_with(&self, environment: Environment) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let settings = Config::builder()
            .add_source(
                File::from(self.config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!(
            "Loaded config: executable={}, mode={:?}, timeout={}s",
            config.executable.name,
            config.executable.mode,
            config.run.timeout_secs
        );
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the configuration file path.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModeSetting;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.config_path().ends_with(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        let config = manager.load_config_from_vars(Vec::new()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_save_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut config = AppConfig::default();
        config.run.timeout_secs = 90;
        config.executable.mode = ModeSetting::Packaged;
        config.ui.default_options.use_gbk = true;
        manager.save_config(&config).unwrap();

        let loaded = manager.load_config_from_vars(Vec::new()).unwrap();
        assert_eq!(loaded.run, config.run);
        assert_eq!(loaded.executable, config.executable);
        assert_eq!(loaded.ui.default_options, config.ui.default_options);
        assert_eq!(loaded.ui.file_filters.len(), 2);
    }

    #[test]
    fn test_environment_overrides_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.config_path(), "run:\n  timeout_secs: 10\n").unwrap();

        let loaded = manager
            .load_config_from_vars(vec![
                ("CALCRELAY__RUN__TIMEOUT_SECS".to_string(), "45".to_string()),
                ("CALCRELAY__EXECUTABLE__NAME".to_string(), "engine2".to_string()),
            ])
            .unwrap();

        assert_eq!(loaded.run.timeout_secs, 45);
        assert_eq!(loaded.executable.name, "engine2");
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.config_path(), "run: [unterminated\n").unwrap();

        assert!(manager.load_config_from_vars(Vec::new()).is_err());
    }
}

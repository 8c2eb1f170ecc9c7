use crate::error::EngineError;
use crate::types::ModelId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "phishscan.toml";
pub const ENV_PREFIX: &str = "PHISHSCAN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub model_dir: PathBuf,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
    pub preload_models: bool,
    pub default_model: ModelId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            fetch_timeout_secs: 6,
            user_agent: "Mozilla/5.0".to_string(),
            accept_invalid_certs: true,
            preload_models: false,
            default_model: ModelId::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then `phishscan.toml` (or `path`) if present, then
    /// `PHISHSCAN_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let defaults = Self::default();
        let file = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let settings = config::Config::builder()
            .set_default("model_dir", defaults.model_dir.to_string_lossy().into_owned())?
            .set_default("fetch_timeout_secs", defaults.fetch_timeout_secs)?
            .set_default("user_agent", defaults.user_agent.clone())?
            .set_default("accept_invalid_certs", defaults.accept_invalid_certs)?
            .set_default("preload_models", defaults.preload_models)?
            .set_default("default_model", defaults.default_model.slug())?
            .add_source(
                config::File::new(&file, config::FileFormat::Toml).required(path.is_some()),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.fetch_timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(EngineError::InvalidConfig("user_agent cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_browser_fetch_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.fetch_timeout_secs, 6);
        assert_eq!(config.user_agent, "Mozilla/5.0");
        assert!(config.accept_invalid_certs);
        assert_eq!(config.default_model, ModelId::KNeighbours);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "model_dir = \"/srv/models\"\nfetch_timeout_secs = 10\ndefault_model = \"random-forest\""
        )
        .unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.default_model, ModelId::RandomForest);
        assert_eq!(config.user_agent, "Mozilla/5.0");
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "preload_models = false").unwrap();

        // no other test reads preload_models, so parallel loads are unaffected
        std::env::set_var("PHISHSCAN_PRELOAD_MODELS", "true");
        let config = EngineConfig::load(Some(file.path()));
        std::env::remove_var("PHISHSCAN_PRELOAD_MODELS");

        assert!(config.unwrap().preload_models);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = EngineConfig::load(Some(Path::new("/nonexistent/phishscan.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = EngineConfig {
            fetch_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn renders_as_toml() {
        let rendered = EngineConfig::default().to_toml().unwrap();
        assert!(rendered.contains("fetch_timeout_secs = 6"));
        assert!(rendered.contains("default_model = \"k-neighbours\""));
    }
}

use crate::args::Cli;
use cachet_logger::LogSettings;
use cachet_store::StoreConfig;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = "cachet";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config {
        #[source]
        source: config::ConfigError,
        context: Option<Cow<'static, str>>,
    },
}

trait ConfigResultExt<T> {
    fn context(self, context: &'static str) -> Result<T, ConfigError>;
}

impl<T> ConfigResultExt<T> for Result<T, config::ConfigError> {
    fn context(self, context: &'static str) -> Result<T, ConfigError> {
        self.map_err(|source| ConfigError::Config { source, context: Some(context.into()) })
    }
}

/// Everything the binary reads from its config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub store: StoreConfig,
    pub log: LogSettings,
}

impl CliConfig {
    /// Layers the config sources: an explicit `--config` file (required), otherwise
    /// an optional `cachet.toml` in the working directory, then `CACHET__` environment
    /// variables (`CACHET__STORE__PARTITION` maps to `store.partition`), then flags.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config: Self = load_layers(cli.config.as_deref())?;

        if let Some(partition) = &cli.partition {
            config.store.partition.clone_from(partition);
        }
        if let Some(endpoint) = &cli.endpoint {
            config.store.endpoint = Some(endpoint.clone());
        }
        if let Some(level) = &cli.log_level {
            config.log.level.clone_from(level);
        }

        Ok(config)
    }
}

fn load_layers(path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let (path, required) =
        path.map_or_else(|| (PathBuf::from(DEFAULT_CONFIG), false), |p| (p.to_path_buf(), true));

    Config::builder()
        .add_source(File::from(path.as_path()).required(required))
        .add_source(
            Environment::with_prefix("CACHET")
                .prefix_separator("__")
                .separator("__")
                .convert_case(config::Case::Snake),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<CliConfig>()
        .context("Failed to deserialize config")
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

//! CLI settings.
//!
//! Layered as built-in defaults, then an optional `cadence.yaml` (or any
//! extension the `config` crate understands), then `CADENCE_*` environment
//! variables. A `.env` file is loaded first when present.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_FILE: &str = "cadence";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliSettings {
    /// Approver used when `--user` is not given.
    pub default_user: String,
    pub output_format: OutputFormat,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl CliSettings {
    /// Load settings from the working directory and the environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(Path::new(DEFAULT_FILE))
    }

    /// Load settings with `path` as the optional settings file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .set_default("default_user", "anonymous")?
            .set_default("output_format", "json")?
            .set_default("log_filter", "warn,cadence_scheduler=info,cadence_cli=info")?
            .set_default("log_json", false)?
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("CADENCE"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            default_user: "anonymous".to_string(),
            output_format: OutputFormat::Json,
            log_filter: "warn,cadence_scheduler=info,cadence_cli=info".to_string(),
            log_json: false,
        }
    }
}

//! # Configuration Management
//!
//! Configuration is layered with the `config` crate, lowest to highest
//! priority:
//! 1. Built-in defaults (the `Default` impl below)
//! 2. `config.toml` in the working directory, or the file given by `--config`
//! 3. Environment variables prefixed with `WYOMING_`, sections separated by `__`
//! 4. Command line flags
//!
//! ## Environment Variable Examples:
//! - `WYOMING_SERVER__URI=tcp://0.0.0.0:10300`
//! - `WYOMING_MODEL__NAME=small`
//! - `WYOMING_MODEL__DEVICE=cuda`
//! - `WYOMING_LOGGING__DEBUG=true`
//!
//! A `.env` file is loaded into the environment by `main` before this runs.

use crate::cli::Cli;
use crate::device::DevicePreference;
use crate::error::{AppError, AppResult};
use crate::server::ListenUri;
use crate::transcription::TranscriptionConfig;
use config::{Environment, Source};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `tcp://host:port` or `unix://path`
    pub uri: String,

    /// Address of the optional HTTP health server
    pub health_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Short Whisper name or Hugging Face repository; advertised to clients verbatim
    pub name: String,

    /// auto, cpu, cuda or metal
    pub device: String,

    /// Fixed language code, `None` to auto-detect
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub debug: bool,
    pub format: LogFormat,
}

/// Log line layout of the `tracing` fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Timestamp, level, target, spans and fields
    #[default]
    Full,
    /// Single line, abbreviated spans
    Compact,
    /// Multi-line, human oriented
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Full => "full",
            LogFormat::Compact => "compact",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                uri: "tcp://0.0.0.0:10300".to_string(),  // Wyoming's conventional ASR port
                health_addr: None,
            },
            model: ModelConfig {
                name: "openai/whisper-large-v3-turbo".to_string(),
                device: "auto".to_string(),
                language: None,
            },
            logging: LoggingConfig {
                debug: false,
                format: LogFormat::Full,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all layers and validate it.
    pub fn load(cli: &Cli) -> AppResult<Self> {
        let config = match &cli.config {
            Some(path) => Self::layered(config::File::from(path.as_path()).required(true), environment(), cli)?,
            None => Self::layered(config::File::with_name("config").required(false), environment(), cli)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn layered<F>(file: F, env: Environment, cli: &Cli) -> AppResult<Self>
    where
        F: Source + Send + Sync + 'static,
    {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(env);

        if let Some(uri) = &cli.uri {
            settings = settings.set_override("server.uri", uri.as_str())?;
        }
        if let Some(addr) = &cli.health_addr {
            settings = settings.set_override("server.health_addr", addr.as_str())?;
        }
        if let Some(model) = &cli.model {
            settings = settings.set_override("model.name", model.as_str())?;
        }
        if let Some(device) = &cli.device {
            settings = settings.set_override("model.device", device.as_str())?;
        }
        if let Some(language) = &cli.language {
            settings = settings.set_override("model.language", language.as_str())?;
        }
        if cli.debug {
            settings = settings.set_override("logging.debug", true)?;
        }
        if let Some(format) = cli.log_format {
            settings = settings.set_override("logging.format", format.as_str())?;
        }

        Ok(settings.build()?.try_deserialize()?)
    }

    /// Reject values the server cannot start with.
    pub fn validate(&self) -> AppResult<()> {
        self.listen_uri()?;

        if self.model.name.trim().is_empty() {
            return Err(AppError::Config("model name cannot be empty".to_string()));
        }

        self.device()?;

        if let Some(addr) = &self.server.health_addr {
            addr.parse::<SocketAddr>().map_err(|e| {
                AppError::Config(format!("invalid health address '{}': {}", addr, e))
            })?;
        }

        Ok(())
    }

    pub fn listen_uri(&self) -> AppResult<ListenUri> {
        self.server.uri.parse()
    }

    pub fn device(&self) -> AppResult<DevicePreference> {
        self.model.device.parse()
    }

    /// Engine settings derived from the `model` section.
    pub fn transcription(&self) -> AppResult<TranscriptionConfig> {
        Ok(TranscriptionConfig {
            model: self.model.name.clone(),
            device: self.device()?,
            language: self.model.language.clone(),
        })
    }
}

fn environment() -> Environment {
    Environment::with_prefix("WYOMING")
        .prefix_separator("_")
        .separator("__")
}

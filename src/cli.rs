//! # Command Line
//!
//! Flags are the highest-priority configuration layer. Every flag is
//! optional; anything not given falls through to the environment, the
//! config file and finally the built-in defaults (see `config.rs`).

use crate::config::LogFormat;
use clap::Parser;
use std::path::PathBuf;

/// Wyoming speech-to-text server running Whisper on Candle.
#[derive(Parser, Debug, Default)]
#[command(name = "wyoming-whisper", version, about)]
pub struct Cli {
    /// Whisper model: tiny, base, small, medium, large-v3, turbo or a Hugging Face repository
    #[arg(long)]
    pub model: Option<String>,

    /// Listen address, e.g. tcp://0.0.0.0:10300 or unix:///run/whisper.sock
    #[arg(long)]
    pub uri: Option<String>,

    /// Compute device: auto, cpu, cuda or metal
    #[arg(long)]
    pub device: Option<String>,

    /// Fixed transcription language (e.g. en); auto-detected when omitted
    #[arg(long)]
    pub language: Option<String>,

    /// Log DEBUG messages
    #[arg(long)]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Serve /health and /info over HTTP on this address (e.g. 127.0.0.1:10301)
    #[arg(long)]
    pub health_addr: Option<String>,

    /// Configuration file (defaults to ./config.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "wyoming-whisper",
            "--model",
            "tiny",
            "--uri",
            "tcp://127.0.0.1:10300",
            "--debug",
            "--log-format",
            "compact",
        ])
        .unwrap();

        assert_eq!(cli.model.as_deref(), Some("tiny"));
        assert_eq!(cli.uri.as_deref(), Some("tcp://127.0.0.1:10300"));
        assert!(cli.debug);
        assert_eq!(cli.log_format, Some(LogFormat::Compact));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        assert!(Cli::try_parse_from(["wyoming-whisper", "--log-format", "xml"]).is_err());
    }
}

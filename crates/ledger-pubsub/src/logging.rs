use std::fs::File;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Plain,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    File,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct LogConfig {
    /// A level (`info`) or filter directives (`ledger_pubsub=debug,warn`).
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Required when `output` is `file`.
    pub file_path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            output: LogOutput::Stdout,
            file_path: None,
        }
    }
}

fn filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"))
}

/// Install the global `tracing` subscriber. Fails if one is already set.
pub fn init(config: &LogConfig) -> Result<()> {
    let subscriber = Registry::default().with(filter(&config.level)?);

    match config.output {
        LogOutput::File => {
            let file_path = config
                .file_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("log output is 'file' but 'file-path' is not set"))?;
            let log_file = File::create(file_path)
                .with_context(|| format!("failed to create log file '{file_path}'"))?;

            match config.format {
                LogFormat::Json => subscriber
                    .with(fmt::layer().with_writer(log_file).json())
                    .try_init()?,
                LogFormat::Plain => subscriber
                    .with(fmt::layer().with_writer(log_file).with_ansi(false))
                    .try_init()?,
            }
        }
        LogOutput::Stdout => match config.format {
            LogFormat::Json => subscriber
                .with(fmt::layer().with_writer(std::io::stdout).json())
                .try_init()?,
            LogFormat::Plain => subscriber
                .with(fmt::layer().with_writer(std::io::stdout))
                .try_init()?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_output_requires_path() {
        let config = LogConfig {
            output: LogOutput::File,
            ..LogConfig::default()
        };
        let err = init(&config).unwrap_err();
        assert!(err.to_string().contains("file-path"));
    }

    #[test]
    fn level_directives_parse() {
        assert!(filter("info").is_ok());
        assert!(filter("ledger_pubsub=debug,warn").is_ok());
    }

    #[test]
    fn invalid_level_is_an_error() {
        let err = filter("ledger_pubsub=loud").unwrap_err();
        assert!(err.to_string().contains("ledger_pubsub=loud"));

        let config = LogConfig {
            level: "ledger_pubsub=loud".to_string(),
            ..LogConfig::default()
        };
        assert!(init(&config).is_err());
    }

    #[test]
    fn deserializes_lowercase_enums() {
        let config: LogConfig =
            serde_json::from_str(r#"{"level":"debug","format":"json","output":"file","file-path":"/tmp/x.log"}"#)
                .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.file_path.as_deref(), Some("/tmp/x.log"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LogConfig::default());
    }
}

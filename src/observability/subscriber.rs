//! `tracing-subscriber` initialization.
//!
//! ```rust,ignore
//! use modelgate::observability::{init_subscriber, OutputFormat, SubscriberConfig};
//!
//! let _guard = init_subscriber(
//!     SubscriberConfig::builder()
//!         .log_level(tracing::Level::DEBUG)
//!         .output_format(OutputFormat::Json)
//!         .build(),
//! )?;
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::error::LlmError;

pub const ENV_LOG_LEVEL: &str = "MODELGATE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "MODELGATE_LOG_FORMAT";
pub const ENV_LOG_FILE: &str = "MODELGATE_LOG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonCompact,
}

impl FromStr for OutputFormat {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-compact" => Ok(Self::JsonCompact),
            other => Err(LlmError::ConfigurationError(format!(
                "Invalid log format: {other}. Valid options: text, json, json-compact"
            ))),
        }
    }
}

fn parse_level(level: &str) -> Result<tracing::Level, LlmError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(tracing::Level::TRACE),
        "debug" => Ok(tracing::Level::DEBUG),
        "info" => Ok(tracing::Level::INFO),
        "warn" => Ok(tracing::Level::WARN),
        "error" => Ok(tracing::Level::ERROR),
        other => Err(LlmError::ConfigurationError(format!(
            "Invalid log level: {other}. Valid options: trace, debug, info, warn, error"
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    pub enable_console: bool,
    /// Events are also appended here, through a non-blocking writer.
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            enable_console: true,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    pub fn debug() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
            ..Self::default()
        }
    }

    /// Directive string for the `EnvFilter`, scoped to this crate.
    pub fn filter_directive(&self) -> String {
        format!("modelgate={}", self.log_level.as_str().to_lowercase())
    }
}

#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
    enable_console: Option<bool>,
    log_file: Option<PathBuf>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn log_level_str(mut self, level: &str) -> Result<Self, LlmError> {
        self.log_level = Some(parse_level(level)?);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn enable_console(mut self, enable: bool) -> Self {
        self.enable_console = Some(enable);
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
            enable_console: self.enable_console.unwrap_or(true),
            log_file: self.log_file,
        }
    }

    /// Apply `MODELGATE_LOG_LEVEL`, `MODELGATE_LOG_FORMAT` and
    /// `MODELGATE_LOG_FILE` on top of the current settings.
    pub fn with_env(self) -> Result<Self, LlmError> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        if let Some(level) = var(ENV_LOG_LEVEL) {
            self = self.log_level_str(&level)?;
        }
        if let Some(format) = var(ENV_LOG_FORMAT) {
            self = self.output_format(format.parse()?);
        }
        if let Some(path) = var(ENV_LOG_FILE) {
            self = self.log_file(path);
        }
        Ok(self)
    }
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LlmError> {
    let file_name = path.file_name().ok_or_else(|| {
        LlmError::ConfigurationError(format!("Log file path has no file name: {}", path.display()))
    })?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install a global subscriber.
///
/// Returns the file writer's guard when `log_file` is set; keep it alive for
/// as long as events should reach the file. Calling this when a global
/// subscriber already exists is not an error.
pub fn init_subscriber(config: SubscriberConfig) -> Result<Option<WorkerGuard>, LlmError> {
    let (file, guard) = match &config.log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let writer = match (config.enable_console, file) {
        (true, Some(file)) => BoxMakeWriter::new(std::io::stdout.and(file)),
        (false, Some(file)) => BoxMakeWriter::new(file),
        (true, None) => BoxMakeWriter::new(std::io::stdout),
        (false, None) => BoxMakeWriter::new(std::io::sink),
    };
    let filter = config.filter_directive();

    let init_result = match config.output_format {
        OutputFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .try_init(),
        OutputFormat::JsonCompact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .json()
            .flatten_event(true)
            .try_init(),
        OutputFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .try_init(),
    };

    match init_result {
        Ok(()) => Ok(guard),
        // Either the global dispatcher or the `log` bridge is already installed.
        Err(e) if e.to_string().contains("already") => Ok(guard),
        Err(e) => Err(LlmError::ConfigurationError(format!(
            "Failed to initialize tracing: {e}"
        ))),
    }
}

pub fn init_default() -> Result<Option<WorkerGuard>, LlmError> {
    init_subscriber(SubscriberConfig::default())
}

pub fn init_debug() -> Result<Option<WorkerGuard>, LlmError> {
    init_subscriber(SubscriberConfig::debug())
}

pub fn init_from_env() -> Result<Option<WorkerGuard>, LlmError> {
    init_subscriber(SubscriberConfig::builder().with_env()?.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = SubscriberConfig::builder().build();
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert_eq!(config.output_format, OutputFormat::Text);
        assert!(config.enable_console);
        assert_eq!(config.filter_directive(), "modelgate=info");
    }

    #[test]
    fn env_vars_override_builder() {
        let config = SubscriberConfig::builder()
            .with_vars(|key| match key {
                ENV_LOG_LEVEL => Some("DEBUG".into()),
                ENV_LOG_FORMAT => Some("json-compact".into()),
                ENV_LOG_FILE => Some("/tmp/modelgate.log".into()),
                _ => None,
            })
            .unwrap()
            .build();
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.output_format, OutputFormat::JsonCompact);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/modelgate.log")));
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let err = SubscriberConfig::builder().log_level_str("loud").unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn init_tolerates_an_existing_subscriber() {
        let _ = init_default();
        assert!(init_debug().is_ok());
    }
}

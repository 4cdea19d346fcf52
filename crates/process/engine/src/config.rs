//! Engine configuration

use process_types::{SchemaPolicy, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Attribute schema limits
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Task dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Automated subject execution
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Audit trail configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Attribute schema limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Deepest allowed attribute nesting
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SchemaConfig {
    pub fn policy(&self) -> SchemaPolicy {
        SchemaPolicy {
            max_depth: self.max_depth,
        }
    }
}

/// Task dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound for caller-supplied long-poll timeouts, in milliseconds
    #[serde(default = "default_max_long_poll")]
    pub max_long_poll_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_long_poll_ms: default_max_long_poll(),
        }
    }
}

impl DispatchConfig {
    pub fn max_long_poll(&self) -> Duration {
        Duration::from_millis(self.max_long_poll_ms)
    }
}

/// How automated subjects are driven
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationMode {
    /// Automated tasks run only when the dispatcher is asked to run them
    #[default]
    Manual,
    /// An automation worker polls for automated tasks
    Background,
}

/// Built-in execution strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStrategy {
    /// Take the first available transition
    FirstOption,
    /// Take the transition named by the subject's `next_state` parameter
    ParameterDriven,
}

/// A provider to register at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub strategy: ProviderStrategy,
}

/// Automated subject execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default)]
    pub mode: AutomationMode,

    /// Worker poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Providers resolved once at startup
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            mode: AutomationMode::Manual,
            poll_interval_ms: default_poll_interval(),
            providers: Vec::new(),
        }
    }
}

impl AutomationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Entries fetched per page by audit queries
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_long_poll() -> u64 {
    30_000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_page_size() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `PROCESS_*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PROCESS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Configuration with background automation and both built-in providers
    pub fn with_background_automation() -> Self {
        Self {
            automation: AutomationConfig {
                mode: AutomationMode::Background,
                providers: vec![
                    ProviderConfig {
                        name: "first-option".into(),
                        strategy: ProviderStrategy::FirstOption,
                    },
                    ProviderConfig {
                        name: "parameter-driven".into(),
                        strategy: ProviderStrategy::ParameterDriven,
                    },
                ],
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

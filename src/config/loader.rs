//! Configuration Loader
//!
//! Environment-aware layered loading:
//!
//! 1. built-in defaults
//! 2. `config/bpm-bridge.toml` (or an explicit file)
//! 3. `config/bpm-bridge.{environment}.toml` when present
//! 4. `BPM_BRIDGE__<SECTION>__<KEY>` environment variables
//! 5. the flat variables of earlier listener deployments (`RMQ_HOST`, `CAMUNDA_API_URL`, ...)

use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::BridgeConfig;

const ENV_PREFIX: &str = "BPM_BRIDGE";
const DEFAULT_CONFIG_DIR: &str = "config";
const CONFIG_BASENAME: &str = "bpm-bridge";

/// How a legacy variable maps onto the typed configuration
#[derive(Debug, Clone, Copy)]
enum LegacyValue {
    Text,
    /// `usleep` microseconds converted to milliseconds
    Microseconds,
}

/// Flat variables understood by earlier deployments of the listener
const LEGACY_VARIABLES: &[(&str, &str, LegacyValue)] = &[
    ("RMQ_HOST", "broker.host", LegacyValue::Text),
    ("RMQ_PORT", "broker.port", LegacyValue::Text),
    ("RMQ_USER", "broker.user", LegacyValue::Text),
    ("RMQ_PASS", "broker.password", LegacyValue::Text),
    ("RMQ_VHOST", "broker.vhost", LegacyValue::Text),
    ("RMQ_QUEUE_IN", "broker.queue", LegacyValue::Text),
    ("RMQ_TICK_TIMEOUT", "consumer.tick_interval_ms", LegacyValue::Microseconds),
    ("RMQ_RECONNECT_TIMEOUT", "consumer.reconnect_delay_ms", LegacyValue::Microseconds),
    ("RMQ_QUEUE_LOG", "logging.queue", LegacyValue::Text),
    ("RMQ_VHOST_LOG", "logging.vhost", LegacyValue::Text),
    ("RMQ_USER_LOG", "logging.user", LegacyValue::Text),
    ("RMQ_PASS_LOG", "logging.password", LegacyValue::Text),
    ("LOGGING", "logging.enabled", LegacyValue::Text),
    ("CAMUNDA_API_URL", "engine.base_url", LegacyValue::Text),
    ("CAMUNDA_API_LOGIN", "engine.login", LegacyValue::Text),
    ("CAMUNDA_API_PASS", "engine.password", LegacyValue::Text),
];

pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    config_directory: PathBuf,
    environment: String,
    variables: HashMap<String, String>,
}

impl ConfigLoader {
    /// Loader reading the process environment
    pub fn new() -> Self {
        let variables: HashMap<String, String> = std::env::vars().collect();
        let environment = detect_environment(&variables);
        Self {
            config_file: None,
            config_directory: PathBuf::from(DEFAULT_CONFIG_DIR),
            environment,
            variables,
        }
    }

    /// Loader over an explicit variable set, for tests and embedding
    pub fn with_variables(variables: HashMap<String, String>) -> Self {
        let environment = detect_environment(&variables);
        Self {
            config_file: None,
            config_directory: PathBuf::from(DEFAULT_CONFIG_DIR),
            environment,
            variables,
        }
    }

    /// Use an explicit file instead of `config/bpm-bridge.toml`; it must exist
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn config_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_directory = path.into();
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Build, deserialize and validate the layered configuration
    pub fn load(&self) -> ConfigResult<BridgeConfig> {
        let mut builder = Config::builder();

        match &self.config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigurationError::file_not_found(
                        path.display().to_string(),
                    ));
                }
                builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
            }
            None => {
                let base = self.config_directory.join(format!("{CONFIG_BASENAME}.toml"));
                builder = builder.add_source(
                    File::from(base.as_path())
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let env_file = self
            .config_directory
            .join(format!("{CONFIG_BASENAME}.{}.toml", self.environment));
        builder = builder.add_source(
            File::from(env_file.as_path())
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(self.prefixed_variables())),
        );

        for (variable, key, kind) in LEGACY_VARIABLES {
            let Some(raw) = self.variables.get(*variable) else {
                continue;
            };
            builder = match kind {
                LegacyValue::Text => builder.set_override(*key, raw.clone())?,
                LegacyValue::Microseconds => {
                    let micros: u64 = raw.trim().parse().map_err(|_| {
                        ConfigurationError::environment_override(
                            *variable,
                            format!("expected microseconds, got '{raw}'"),
                        )
                    })?;
                    builder.set_override(*key, (micros / 1000).max(1) as i64)?
                }
            };
        }

        let config: BridgeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            environment = %self.environment,
            config = %sanitize_config_for_logging(&config),
            "Configuration loaded"
        );

        Ok(config)
    }

    fn prefixed_variables(&self) -> HashMap<String, String> {
        let prefix = format!("{ENV_PREFIX}__");
        self.variables
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// `BPM_BRIDGE_ENV || APP_ENV || 'development'`
pub(crate) fn detect_environment(variables: &HashMap<String, String>) -> String {
    variables
        .get("BPM_BRIDGE_ENV")
        .or_else(|| variables.get("APP_ENV"))
        .cloned()
        .unwrap_or_else(|| "development".to_string())
        .to_lowercase()
}

/// Mask credentials so the loaded configuration can be logged
pub fn sanitize_config_for_logging(config: &BridgeConfig) -> serde_json::Value {
    let mut config_json = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
    let sensitive_patterns = ["password", "secret", "token", "credential"];
    sanitize_json_recursive(&mut config_json, &sensitive_patterns);
    config_json
}

fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let is_sensitive = sensitive_patterns
                    .iter()
                    .any(|pattern| key_lower.contains(pattern));

                if !is_sensitive {
                    sanitize_json_recursive(val, sensitive_patterns);
                    continue;
                }

                *val = match val {
                    serde_json::Value::Null => serde_json::Value::Null,
                    serde_json::Value::String(s) if s.is_empty() => {
                        serde_json::Value::String("[EMPTY]".to_string())
                    }
                    _ => serde_json::Value::String("[MASKED]".to_string()),
                };
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                sanitize_json_recursive(item, sensitive_patterns);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn empty_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("temp dir")
    }

    #[test]
    fn test_defaults_without_sources() {
        let dir = empty_dir();
        let config = ConfigLoader::with_variables(HashMap::new())
            .config_directory(dir.path())
            .load()
            .expect("defaults load");
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_toml_file_and_prefixed_env_layering() {
        let dir = empty_dir();
        let mut file = std::fs::File::create(dir.path().join("bpm-bridge.toml")).unwrap();
        writeln!(
            file,
            "[broker]\nhost = \"rabbit\"\nqueue = \"otp_in\"\n\n[consumer]\nreconnect_delay_ms = 750\n"
        )
        .unwrap();

        let config = ConfigLoader::with_variables(vars(&[("BPM_BRIDGE__BROKER__PORT", "5673")]))
            .config_directory(dir.path())
            .load()
            .expect("layered load");

        assert_eq!(config.broker.host, "rabbit");
        assert_eq!(config.broker.queue, "otp_in");
        assert_eq!(config.broker.port, 5673);
        assert_eq!(config.consumer.reconnect_delay_ms, 750);
    }

    #[test]
    fn test_load_rejects_invalid_result() {
        let dir = empty_dir();
        let result = ConfigLoader::with_variables(vars(&[("BPM_BRIDGE__BROKER__PORT", "0")]))
            .config_directory(dir.path())
            .load();

        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "broker.port"
        ));
    }

    #[test]
    fn test_environment_specific_file_overrides_base() {
        let dir = empty_dir();
        std::fs::write(
            dir.path().join("bpm-bridge.toml"),
            "[engine]\nbase_url = \"http://base:8080/engine-rest\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("bpm-bridge.production.toml"),
            "[engine]\nbase_url = \"http://prod:8080/engine-rest\"\n",
        )
        .unwrap();

        let loader = ConfigLoader::with_variables(vars(&[("BPM_BRIDGE_ENV", "production")]))
            .config_directory(dir.path());
        assert_eq!(loader.environment(), "production");

        let config = loader.load().expect("env file load");
        assert_eq!(config.engine.base_url, "http://prod:8080/engine-rest");
    }

    #[test]
    fn test_legacy_variables_are_honoured() {
        let dir = empty_dir();
        let config = ConfigLoader::with_variables(vars(&[
            ("RMQ_HOST", "mq.internal"),
            ("RMQ_PORT", "5674"),
            ("RMQ_QUEUE_IN", "camunda_listener"),
            ("RMQ_TICK_TIMEOUT", "250000"),
            ("RMQ_RECONNECT_TIMEOUT", "5000000"),
            ("LOGGING", "true"),
            ("RMQ_QUEUE_LOG", "bpm_log"),
            ("CAMUNDA_API_URL", "http://camunda:8080/engine-rest"),
            ("CAMUNDA_API_LOGIN", "demo"),
        ]))
        .config_directory(dir.path())
        .load()
        .expect("legacy load");

        assert_eq!(config.broker.host, "mq.internal");
        assert_eq!(config.broker.port, 5674);
        assert_eq!(config.broker.queue, "camunda_listener");
        assert_eq!(config.consumer.tick_interval_ms, 250);
        assert_eq!(config.consumer.reconnect_delay_ms, 5000);
        assert!(config.logging.enabled);
        assert_eq!(config.logging.queue, "bpm_log");
        assert_eq!(config.engine.login, "demo");
    }

    #[test]
    fn test_invalid_legacy_microseconds() {
        let dir = empty_dir();
        let err = ConfigLoader::with_variables(vars(&[("RMQ_TICK_TIMEOUT", "soon")]))
            .config_directory(dir.path())
            .load()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::EnvironmentOverrideError { .. }
        ));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let err = ConfigLoader::with_variables(HashMap::new())
            .config_file("/nonexistent/bpm-bridge.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::FileNotFound { .. }));
    }

    #[test]
    fn test_sanitize_masks_credentials() {
        let mut config = BridgeConfig::default();
        config.engine.password = "hunter22".to_string();

        let sanitized = sanitize_config_for_logging(&config);
        assert_eq!(sanitized["engine"]["password"], "[MASKED]");
        assert_eq!(sanitized["broker"]["password"], "[MASKED]");
        assert_eq!(sanitized["broker"]["host"], "localhost");
        assert!(sanitized["logging"]["password"].is_null());
    }
}

//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError::InvalidValue`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_websocket(config, &mut result);
        Self::validate_sse(config, &mut result);
        Self::validate_routing(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }

        if matches!(config.server.cors_origin_list(), Some(list) if list.is_empty()) {
            result.add_error(ValidationError::new(
                "server.cors_origins",
                "cors_origins must be \"*\" or a comma-separated origin list",
            ));
        }
    }

    fn validate_websocket(config: &Config, result: &mut ValidationResult) {
        let ws = &config.websocket;
        Self::check_path("websocket.path", &ws.path, result);

        if ws.ping_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "websocket.ping_interval_secs",
                "ping_interval_secs must be greater than 0",
            ));
        }
        if ws.ping_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "websocket.ping_timeout_secs",
                "ping_timeout_secs must be greater than 0",
            ));
        }
        if ws.outbound_buffer == 0 {
            result.add_error(ValidationError::new(
                "websocket.outbound_buffer",
                "outbound_buffer must be greater than 0",
            ));
        }
    }

    fn validate_sse(config: &Config, result: &mut ValidationResult) {
        let sse = &config.sse;
        Self::check_path("sse.push_path", &sse.push_path, result);
        Self::check_path("sse.batch_path", &sse.batch_path, result);
        Self::check_path("sse.send_path", &sse.send_path, result);

        let mut paths = vec![
            config.websocket.path.as_str(),
            sse.push_path.as_str(),
            sse.batch_path.as_str(),
            sse.send_path.as_str(),
            "/health",
            "/metrics",
        ];
        paths.sort_unstable();
        if paths.windows(2).any(|pair| pair[0] == pair[1]) {
            result.add_error(ValidationError::new(
                "sse",
                "Endpoint paths must be distinct from each other and from /health and /metrics",
            ));
        }

        if sse.response_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "sse.response_timeout_secs",
                "response_timeout_secs must be greater than 0",
            ));
        }
        if sse.reply_buffer == 0 {
            result.add_error(ValidationError::new(
                "sse.reply_buffer",
                "reply_buffer must be greater than 0",
            ));
        }
    }

    fn validate_routing(config: &Config, result: &mut ValidationResult) {
        let routing = &config.routing;

        for name in &routing.public_accounts {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                result.add_error(ValidationError::new(
                    "routing.public_accounts",
                    format!(
                        "Public account '{}' can never be mentioned, use only ASCII letters, digits, '_' or '-'",
                        name
                    ),
                ));
            }
        }

        if routing.public_accounts.is_empty() {
            result.add_warning(ValidationWarning::new(
                "routing.public_accounts",
                "No public accounts configured, @mention routing is disabled",
            ));
        }

        if routing.mention_fields.is_empty() {
            result.add_warning(ValidationWarning::new(
                "routing.mention_fields",
                "No mention fields configured, payloads will never be scanned",
            ));
        }
    }

    fn check_path(field: &str, path: &str, result: &mut ValidationResult) {
        if !path.starts_with('/') {
            result.add_error(ValidationError::new(field, "Path must start with '/'"));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

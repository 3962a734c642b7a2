//! Wrapper-side configuration, loaded once from the environment.

use me_types::{AppError, AppResult};
use std::time::Duration;
use tracing::warn;

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Wrapper server configuration.
///
/// Immutable once loaded. Environment variables:
/// - `PORT` — HTTP listen port (default 8080)
/// - `MCP_COMMAND` — command to spawn per bridge (required)
/// - `MCP_ARGS` — arguments, split with shell quoting rules
/// - `MCP_REQUEST_TIMEOUT` — per-request timeout in milliseconds (default 30000)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub command: String,
    pub args: Vec<String>,
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Load from the process environment.
    ///
    /// `MCP_COMMAND` is the only fatal omission; malformed numeric values
    /// warn and fall back to defaults.
    pub fn from_env() -> AppResult<Self> {
        let command = std::env::var("MCP_COMMAND").map_err(|_| {
            AppError::Config("MCP_COMMAND is not set; nothing to wrap".to_string())
        })?;

        let args = match std::env::var("MCP_ARGS") {
            Ok(raw) => shell_words::split(&raw)
                .map_err(|e| AppError::Config(format!("Invalid MCP_ARGS: {}", e)))?,
            Err(_) => Vec::new(),
        };

        let port = parse_env_number("PORT", DEFAULT_PORT);
        let timeout_ms = parse_env_number("MCP_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_MS);

        Ok(Self {
            host: "0.0.0.0".to_string(),
            port,
            command,
            args,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Parse a numeric environment variable with warning on invalid values.
///
/// Parses into the target type directly so out-of-range values (a port of
/// 70000, say) fall back rather than wrapping.
fn parse_env_number<T>(var_name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match std::env::var(var_name) {
        Ok(value) => match value.parse::<T>() {
            Ok(n) => n,
            Err(_) => {
                warn!(
                    "Invalid value '{}' for {}, using default {}",
                    value, var_name, default
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in ["PORT", "MCP_COMMAND", "MCP_ARGS", "MCP_REQUEST_TIMEOUT"] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_missing_command_is_fatal() {
        clear_env();
        assert!(ServerConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        std::env::set_var("MCP_COMMAND", "cat");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.command, "cat");
        assert!(config.args.is_empty());
        assert_eq!(
            config.request_timeout,
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_args_split_with_shell_quoting() {
        clear_env();
        std::env::set_var("MCP_COMMAND", "npx");
        std::env::set_var("MCP_ARGS", "-y 'my server' --flag");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.args, vec!["-y", "my server", "--flag"]);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_out_of_range_port_falls_back() {
        clear_env();
        std::env::set_var("MCP_COMMAND", "cat");
        std::env::set_var("PORT", "70000");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_timeout_falls_back() {
        clear_env();
        std::env::set_var("MCP_COMMAND", "cat");
        std::env::set_var("MCP_REQUEST_TIMEOUT", "soon");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(
            config.request_timeout,
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
        );
        clear_env();
    }
}

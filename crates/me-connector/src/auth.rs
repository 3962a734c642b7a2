//! API key and endpoint resolution.

use me_config::ClientConfig;
use tracing::info;

use crate::DEFAULT_BASE_URL;

/// Environment variable that overrides every configured API key.
pub const API_KEY_ENV: &str = "MCPEVERYTHING_API_KEY";

/// Resolve the API key for a target.
///
/// Resolution order:
/// 1. `MCPEVERYTHING_API_KEY` env var
/// 2. Per-target entry in the config file's `apiKeys`
/// 3. The `default` entry
/// 4. None (requests go out unauthenticated)
pub fn resolve_api_key(target_id: &str, config: &ClientConfig) -> Option<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        info!("Using API key from environment variable");
        return Some(key);
    }
    config.api_key_for(target_id).map(str::to_string)
}

/// Resolve the remote base URL: CLI override, then config, then the
/// built-in public endpoint. Trailing slashes are trimmed so path joins
/// stay predictable.
pub fn resolve_base_url(cli_override: Option<String>, config: &ClientConfig) -> String {
    cli_override
        .or_else(|| config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config_with_keys(pairs: &[(&str, &str)]) -> ClientConfig {
        let mut config = ClientConfig::default();
        for (target, key) in pairs {
            config
                .api_keys
                .insert(target.to_string(), key.to_string());
        }
        config
    }

    #[test]
    #[serial]
    fn test_env_var_wins_over_config() {
        std::env::set_var(API_KEY_ENV, "ENV_KEY");
        let config = config_with_keys(&[("svc", "CFG_KEY"), ("default", "DEF_KEY")]);
        assert_eq!(resolve_api_key("svc", &config), Some("ENV_KEY".to_string()));
        std::env::remove_var(API_KEY_ENV);
    }

    #[test]
    #[serial]
    fn test_per_target_beats_default() {
        std::env::remove_var(API_KEY_ENV);
        let config = config_with_keys(&[("svc", "CFG_KEY"), ("default", "DEF_KEY")]);
        assert_eq!(resolve_api_key("svc", &config), Some("CFG_KEY".to_string()));
    }

    #[test]
    #[serial]
    fn test_default_key_fallback_then_none() {
        std::env::remove_var(API_KEY_ENV);
        let config = config_with_keys(&[("default", "DEF_KEY")]);
        assert_eq!(
            resolve_api_key("other", &config),
            Some("DEF_KEY".to_string())
        );
        assert_eq!(resolve_api_key("other", &ClientConfig::default()), None);
    }

    #[test]
    fn test_base_url_resolution_order() {
        let config = ClientConfig {
            base_url: Some("https://cfg.example/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_base_url(Some("https://cli.example".to_string()), &config),
            "https://cli.example"
        );
        assert_eq!(resolve_base_url(None, &config), "https://cfg.example");
        assert_eq!(
            resolve_base_url(None, &ClientConfig::default()),
            DEFAULT_BASE_URL
        );
    }
}

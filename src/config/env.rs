//! `CENTAURI_*` environment overlay.
//!
//! Used by the demo binary and by host apps that want twelve-factor-style
//! configuration without writing builder code. Overlays on top of whatever
//! a [`ConfigBuilder`](super::ConfigBuilder) produced; anything not present
//! in the environment is left untouched.

use crate::error::ConfigError;

use super::Config;

/// Overlay `CENTAURI_*` environment variables onto `config` in place.
pub fn apply_env_overrides<FEnv>(config: &mut Config, env_lookup: FEnv) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(user_id) = env_lookup("CENTAURI_USER_ID") {
        config.user_id = Some(user_id);
    }
    if let Some(base_url) = env_lookup("CENTAURI_BASE_URL") {
        config.base_url = base_url;
    }
    if let Some(value) = env_lookup("CENTAURI_USE_HTTPS") {
        config.use_https = parse_bool(&value, "CENTAURI_USE_HTTPS")?;
    }
    if let Some(value) = env_lookup("CENTAURI_SESSION_IDLE_TIMEOUT_SECS") {
        config.session_idle_timeout_secs = parse_u64(&value, "CENTAURI_SESSION_IDLE_TIMEOUT_SECS")?;
    }
    if let Some(value) = env_lookup("CENTAURI_AUTO_FLUSH_THRESHOLD_BYTES") {
        config.auto_flush_threshold_bytes =
            parse_u64(&value, "CENTAURI_AUTO_FLUSH_THRESHOLD_BYTES")?;
    }
    if let Some(value) = env_lookup("CENTAURI_TEE_TO_SYSTEM_LOG") {
        config.tee_to_system_log = parse_bool(&value, "CENTAURI_TEE_TO_SYSTEM_LOG")?;
    }
    Ok(())
}

fn parse_bool(value: &str, var: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!(
            "invalid {var} value `{value}`: expected a boolean"
        ))),
    }
}

fn parse_u64(value: &str, var: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(format!("invalid {var} value `{value}`: expected a non-negative integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn overlay_overrides_builder_defaults() {
        let mut config = Config::builder("/tmp/x").build();
        let env = env_map(&[
            ("CENTAURI_BASE_URL", "collector.example.com"),
            ("CENTAURI_USE_HTTPS", "true"),
            ("CENTAURI_SESSION_IDLE_TIMEOUT_SECS", "42"),
            ("CENTAURI_AUTO_FLUSH_THRESHOLD_BYTES", "2048"),
            ("CENTAURI_TEE_TO_SYSTEM_LOG", "false"),
            ("CENTAURI_USER_ID", "user-1"),
        ]);
        apply_env_overrides(&mut config, |k| env.get(k).cloned()).unwrap();
        assert_eq!(config.base_url, "collector.example.com");
        assert!(config.use_https);
        assert_eq!(config.session_idle_timeout_secs, 42);
        assert_eq!(config.auto_flush_threshold_bytes, 2048);
        assert!(!config.tee_to_system_log);
        assert_eq!(config.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn absent_vars_leave_defaults_untouched() {
        let mut config = Config::builder("/tmp/x").build();
        let before_idle = config.session_idle_timeout_secs;
        apply_env_overrides(&mut config, |_| None).unwrap();
        assert_eq!(config.session_idle_timeout_secs, before_idle);
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let mut config = Config::builder("/tmp/x").build();
        let env = env_map(&[("CENTAURI_USE_HTTPS", "maybe")]);
        let err = apply_env_overrides(&mut config, |k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("CENTAURI_USE_HTTPS"));
    }

    #[test]
    fn invalid_integer_is_rejected() {
        let mut config = Config::builder("/tmp/x").build();
        let env = env_map(&[("CENTAURI_AUTO_FLUSH_THRESHOLD_BYTES", "not-a-number")]);
        let err = apply_env_overrides(&mut config, |k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("CENTAURI_AUTO_FLUSH_THRESHOLD_BYTES"));
    }
}

//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    DispatchSection, IrcConfig, KindredConfig, LogOutput, LoggingConfig, RetryConfig,
    WebhookConfig,
};

const VALID_LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Validates the entire configuration.
pub fn validate_config(config: &KindredConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_dispatch(&config.dispatch)?;
    if config.irc.enabled {
        validate_irc(&config.irc)?;
    }
    if config.webhook.enabled {
        validate_webhook(&config.webhook)?;
    }
    if config.admins.iter().any(|a| a.trim().is_empty()) {
        return Err(ConfigError::validation("Admin names cannot be empty"));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    for (module, level) in &logging.filters {
        if !VALID_LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            return Err(ConfigError::validation(format!(
                "Invalid log level for '{module}': {level}. Valid values are: {VALID_LOG_LEVELS:?}"
            )));
        }
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    Ok(())
}

fn validate_dispatch(dispatch: &DispatchSection) -> ConfigResult<()> {
    if dispatch.sigil.trim().is_empty() {
        return Err(ConfigError::validation("Command sigil cannot be empty"));
    }
    if dispatch.sigil.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(
            "Command sigil cannot contain whitespace",
        ));
    }
    if dispatch.queue_capacity == 0 {
        return Err(ConfigError::validation(
            "Ingress queue capacity must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_irc(irc: &IrcConfig) -> ConfigResult<()> {
    if irc.host.is_empty() {
        return Err(ConfigError::missing_field("irc.host"));
    }
    validate_port(irc.port)?;
    if irc.nick.trim().is_empty() {
        return Err(ConfigError::missing_field("irc.nick"));
    }
    if irc.channels.is_empty() {
        return Err(ConfigError::missing_field("irc.channels"));
    }
    if irc.outbound_capacity == 0 {
        return Err(ConfigError::validation(
            "Outbound queue capacity must be greater than 0",
        ));
    }
    validate_retry_config(&irc.retry)
}

fn validate_retry_config(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

fn validate_webhook(webhook: &WebhookConfig) -> ConfigResult<()> {
    validate_port(webhook.port)?;
    if !webhook.path.starts_with('/') {
        return Err(ConfigError::validation("Webhook path must start with '/'"));
    }
    Ok(())
}

fn validate_port(port: u16) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn irc_enabled() -> KindredConfig {
        let mut config = KindredConfig::default();
        config.irc.enabled = true;
        config.irc.nick = "kindredbot".into();
        config.irc.channels = vec!["#stream".into()];
        config
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&KindredConfig::default()).is_ok());
        assert!(validate_config(&irc_enabled()).is_ok());
    }

    #[test]
    fn test_validate_blank_sigil() {
        let mut config = KindredConfig::default();
        config.dispatch.sigil = "  ".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_irc_requires_nick_and_channels() {
        let mut config = irc_enabled();
        config.irc.nick.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "irc.nick"
        ));

        let mut config = irc_enabled();
        config.irc.channels.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "irc.channels"
        ));

        // a disabled section is not checked
        let mut config = KindredConfig::default();
        config.irc.nick.clear();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = KindredConfig::default();
        config.webhook.enabled = true;
        config.webhook.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPort(0))
        ));
    }

    #[test]
    fn test_validate_invalid_filter_level() {
        let mut config = KindredConfig::default();
        config
            .logging
            .filters
            .insert("kindred_transport".into(), "chatty".into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = KindredConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}

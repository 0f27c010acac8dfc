use crate::config::types::{Config, HttpConfig, LoginConfig, ReportEntry, ScopeConfig};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let seed = validate_seed_url(&config.url)?;
    validate_http_config(&config.http)?;
    validate_scope_config(&config.scope, &seed)?;
    if let Some(login) = &config.login {
        validate_login_config(login)?;
    }
    validate_reports(&config.reports)?;
    Ok(())
}

/// Validates the seed URL and returns it parsed
fn validate_seed_url(url: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid url '{}': {}", url, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "url '{}' must use the http or https scheme",
            url
        )));
    }

    if parsed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!("url '{}' has no host", url)));
    }

    Ok(parsed)
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 1000 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 1000, got {}",
            config.max_concurrency
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "timeout must be >= 1ms".to_string(),
        ));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates scope configuration
fn validate_scope_config(config: &ScopeConfig, seed: &Url) -> Result<(), ConfigError> {
    for pattern in config
        .exclude
        .iter()
        .chain(config.include.iter())
        .chain(config.redundant.keys())
    {
        validate_pattern(pattern)?;
    }

    for path in config.extend_paths.iter().chain(config.restrict_paths.iter()) {
        seed.join(path).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid path '{}': {}", path, e))
        })?;
    }

    if config.link_count_limit == Some(0) {
        return Err(ConfigError::Validation(
            "link_count_limit must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates login configuration
fn validate_login_config(config: &LoginConfig) -> Result<(), ConfigError> {
    Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid login url: {}", e)))?;
    Url::parse(&config.check_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid login check-url: {}", e)))?;
    validate_pattern(&config.check_pattern)?;
    Ok(())
}

/// Validates report entries
fn validate_reports(reports: &[ReportEntry]) -> Result<(), ConfigError> {
    for entry in reports {
        if entry.name.is_empty() {
            return Err(ConfigError::Validation(
                "report name cannot be empty".to_string(),
            ));
        }

        if entry.outfile.is_empty() {
            return Err(ConfigError::Validation(format!(
                "report '{}' must have an outfile",
                entry.name
            )));
        }
    }
    Ok(())
}

/// Checks that a pattern compiles as a regular expression
fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

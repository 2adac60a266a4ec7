use std::path::Path;

use crate::{Config, parse_duration};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config = Self::from_toml(&raw)?;
        tracing::debug!(path = %path.display(), backend = config.backend.kind(), "loaded configuration");

        Ok(config)
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_retry()?;
        self.validate_timeout()?;
        self.validate_rate_limit()?;
        self.validate_cache()?;
        self.validate_limits()?;
        Ok(())
    }

    fn validate_retry(&self) -> anyhow::Result<()> {
        let retry = &self.retry;

        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            anyhow::bail!("retry.multiplier must be a finite number >= 1.0, got {}", retry.multiplier);
        }

        let initial = parse_duration("retry.initial_delay", &retry.initial_delay)?;
        let max = parse_duration("retry.max_delay", &retry.max_delay)?;
        if initial > max {
            anyhow::bail!("retry.initial_delay ({initial:?}) must not exceed retry.max_delay ({max:?})");
        }

        if let Some(code) = retry.retryable_status_codes.iter().find(|code| !(100..=599).contains(*code)) {
            anyhow::bail!("retry.retryable_status_codes contains invalid HTTP status {code}");
        }

        Ok(())
    }

    fn validate_timeout(&self) -> anyhow::Result<()> {
        let timeout = &self.timeout;

        for (field, value) in [
            ("timeout.connect", &timeout.connect),
            ("timeout.read", &timeout.read),
            ("timeout.read_large", &timeout.read_large),
        ] {
            if parse_duration(field, value)?.is_zero() {
                anyhow::bail!("{field} must be greater than 0");
            }
        }

        Ok(())
    }

    fn validate_rate_limit(&self) -> anyhow::Result<()> {
        let rate_limit = &self.rate_limit;
        if !rate_limit.is_enabled() {
            return Ok(());
        }

        if parse_duration("rate_limit.window", &rate_limit.window)?.is_zero() {
            anyhow::bail!("rate_limit.window must be greater than 0 when max_requests is set");
        }

        if rate_limit.burst == Some(0) {
            anyhow::bail!("rate_limit.burst must be greater than 0");
        }

        Ok(())
    }

    fn validate_cache(&self) -> anyhow::Result<()> {
        let cache = &self.cache;
        if !cache.enabled {
            return Ok(());
        }

        if cache.capacity == 0 {
            anyhow::bail!("cache.capacity must be greater than 0 when caching is enabled");
        }

        if parse_duration("cache.ttl", &cache.ttl)?.is_zero() {
            anyhow::bail!("cache.ttl must be greater than 0");
        }

        Ok(())
    }

    fn validate_limits(&self) -> anyhow::Result<()> {
        if self.limits.max_messages == 0 {
            anyhow::bail!("limits.max_messages must be greater than 0");
        }

        Ok(())
    }
}

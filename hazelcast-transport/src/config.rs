//! Invocation configuration types and builders.

use std::time::Duration;

use hazelcast_protocol::protocol::DEFAULT_MAX_FRAME_LENGTH;

/// Default time budget of one invocation, retries included.
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default initial retry backoff.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Default maximum retry backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);
/// Default retry multiplier.
const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
/// Default maximum number of attempts, the first send included.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default backoff jitter.
const DEFAULT_JITTER: f64 = 0.0;

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for hazelcast_protocol::HazelcastError {
    fn from(err: ConfigError) -> Self {
        hazelcast_protocol::HazelcastError::Configuration(err.message)
    }
}

/// Retry policy for retryable invocations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    max_attempts: u32,
    jitter: f64,
}

impl RetryConfig {
    /// Creates a new retry configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Returns the backoff before the first retry.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the maximum number of attempts, the first send included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the relative jitter applied to each backoff.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl From<RetryConfig> for RetryConfigBuilder {
    fn from(config: RetryConfig) -> Self {
        Self {
            initial_backoff: Some(config.initial_backoff),
            max_backoff: Some(config.max_backoff),
            multiplier: Some(config.multiplier),
            max_attempts: Some(config.max_attempts),
            jitter: Some(config.jitter),
        }
    }
}

/// Builder for `RetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    max_attempts: Option<u32>,
    jitter: Option<f64>,
}

impl RetryConfigBuilder {
    /// Creates a new retry configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backoff before the first retry.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the maximum number of attempts, the first send included.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Sets the relative jitter applied to each backoff, in `[0, 1)`.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Builds the retry configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `initial_backoff` exceeds `max_backoff`
    /// - `multiplier` is less than 1.0
    /// - `max_attempts` is zero
    /// - `jitter` is outside `[0, 1)`
    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        let initial_backoff = self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF);
        let max_backoff = self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF);
        let multiplier = self.multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        let max_attempts = self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let jitter = self.jitter.unwrap_or(DEFAULT_JITTER);

        if initial_backoff > max_backoff {
            return Err(ConfigError::new(
                "initial_backoff must not exceed max_backoff",
            ));
        }

        if multiplier < 1.0 {
            return Err(ConfigError::new("multiplier must be at least 1.0"));
        }

        if max_attempts == 0 {
            return Err(ConfigError::new("max_attempts must be at least 1"));
        }

        if !(0.0..1.0).contains(&jitter) {
            return Err(ConfigError::new("jitter must be in [0, 1)"));
        }

        Ok(RetryConfig {
            initial_backoff,
            max_backoff,
            multiplier,
            max_attempts,
            jitter,
        })
    }
}

/// Configuration of the invocation engine.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    invocation_timeout: Duration,
    max_frame_length: usize,
    retry: RetryConfig,
}

impl InvocationConfig {
    /// Creates a new invocation configuration builder.
    pub fn builder() -> InvocationConfigBuilder {
        InvocationConfigBuilder::new()
    }

    /// Returns the time budget of one invocation, retries included.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    /// Returns the largest inbound frame a connection accepts.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Returns the retry configuration.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Loads configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    ///
    /// # Supported Environment Variables
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `HZ_INVOCATION_TIMEOUT_SECONDS` | Invocation timeout in seconds |
    /// | `HZ_INVOCATION_RETRY_COUNT` | Maximum number of attempts |
    /// | `HZ_INVOCATION_RETRY_PAUSE_MS` | Initial backoff in milliseconds |
    /// | `HZ_INVOCATION_MAX_BACKOFF_MS` | Maximum backoff in milliseconds |
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = InvocationConfigBuilder::new();

        if let Some(secs) = env_number::<u64>("HZ_INVOCATION_TIMEOUT_SECONDS") {
            builder = builder.invocation_timeout(Duration::from_secs(secs));
        }

        if let Some(n) = env_number::<u32>("HZ_INVOCATION_RETRY_COUNT") {
            builder = builder.retry(|r| r.max_attempts(n));
        }

        if let Some(ms) = env_number::<u64>("HZ_INVOCATION_RETRY_PAUSE_MS") {
            builder = builder.retry(|r| r.initial_backoff(Duration::from_millis(ms)));
        }

        if let Some(ms) = env_number::<u64>("HZ_INVOCATION_MAX_BACKOFF_MS") {
            builder = builder.retry(|r| r.max_backoff(Duration::from_millis(ms)));
        }

        builder.build()
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(variable = name, value = %value, "ignoring unparsable value");
            None
        }
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            retry: RetryConfig::default(),
        }
    }
}

/// Builder for `InvocationConfig`.
#[derive(Debug, Clone, Default)]
pub struct InvocationConfigBuilder {
    invocation_timeout: Option<Duration>,
    max_frame_length: Option<usize>,
    retry: RetryConfigBuilder,
}

impl InvocationConfigBuilder {
    /// Creates a new invocation configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time budget of one invocation, retries included.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    /// Sets the largest inbound frame a connection accepts.
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = Some(length);
        self
    }

    /// Configures retry settings using a builder function.
    pub fn retry<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RetryConfigBuilder) -> RetryConfigBuilder,
    {
        self.retry = f(self.retry);
        self
    }

    /// Builds the invocation configuration, returning an error if validation fails.
    pub fn build(self) -> Result<InvocationConfig, ConfigError> {
        let invocation_timeout = self
            .invocation_timeout
            .unwrap_or(DEFAULT_INVOCATION_TIMEOUT);
        if invocation_timeout.is_zero() {
            return Err(ConfigError::new("invocation_timeout must be positive"));
        }

        let max_frame_length = self.max_frame_length.unwrap_or(DEFAULT_MAX_FRAME_LENGTH);
        if max_frame_length < hazelcast_protocol::protocol::HEADER_SIZE {
            return Err(ConfigError::new(
                "max_frame_length must cover at least the frame header",
            ));
        }

        Ok(InvocationConfig {
            invocation_timeout,
            max_frame_length,
            retry: self.retry.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_invocation_config() {
        let config = InvocationConfig::default();
        assert_eq!(config.invocation_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_frame_length(), DEFAULT_MAX_FRAME_LENGTH);
        assert_eq!(config.retry().max_attempts(), 5);
        assert_eq!(config.retry().initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.retry().max_backoff(), Duration::from_secs(5));
        assert_eq!(config.retry().multiplier(), 2.0);
        assert_eq!(config.retry().jitter(), 0.0);
    }

    #[test]
    fn test_builder_overrides() {
        let config = InvocationConfig::builder()
            .invocation_timeout(Duration::from_secs(3))
            .retry(|r| r.max_attempts(2).jitter(0.25))
            .build()
            .unwrap();

        assert_eq!(config.invocation_timeout(), Duration::from_secs(3));
        assert_eq!(config.retry().max_attempts(), 2);
        assert_eq!(config.retry().jitter(), 0.25);
    }

    #[test]
    fn test_retry_initial_exceeds_max_fails() {
        let result = RetryConfig::builder()
            .initial_backoff(Duration::from_secs(10))
            .max_backoff(Duration::from_secs(1))
            .build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("initial_backoff must not exceed max_backoff"));
    }

    #[test]
    fn test_retry_invalid_values_fail() {
        assert!(RetryConfig::builder().multiplier(0.5).build().is_err());
        assert!(RetryConfig::builder().max_attempts(0).build().is_err());
        assert!(RetryConfig::builder().jitter(1.0).build().is_err());
        assert!(RetryConfig::builder().jitter(-0.1).build().is_err());
    }

    #[test]
    fn test_zero_timeout_fails() {
        let result = InvocationConfig::builder()
            .invocation_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_huge_timeout_is_accepted() {
        let config = InvocationConfig::builder()
            .invocation_timeout(Duration::from_secs(u64::MAX))
            .build()
            .unwrap();
        assert_eq!(config.invocation_timeout(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_builder_from_existing_retry_config() {
        let original = RetryConfig::builder().max_attempts(9).build().unwrap();
        let rebuilt = RetryConfigBuilder::from(original)
            .multiplier(3.0)
            .build()
            .unwrap();
        assert_eq!(rebuilt.max_attempts(), 9);
        assert_eq!(rebuilt.multiplier(), 3.0);
    }

    #[test]
    fn test_config_error_converts_to_hazelcast_error() {
        let err: hazelcast_protocol::HazelcastError =
            RetryConfig::builder().max_attempts(0).build().unwrap_err().into();
        assert!(matches!(
            err,
            hazelcast_protocol::HazelcastError::Configuration(_)
        ));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("HZ_INVOCATION_TIMEOUT_SECONDS", "7");
        std::env::set_var("HZ_INVOCATION_RETRY_COUNT", "3");
        std::env::set_var("HZ_INVOCATION_RETRY_PAUSE_MS", "20");
        std::env::set_var("HZ_INVOCATION_MAX_BACKOFF_MS", "not-a-number");

        let config = InvocationConfig::from_env().unwrap();

        std::env::remove_var("HZ_INVOCATION_TIMEOUT_SECONDS");
        std::env::remove_var("HZ_INVOCATION_RETRY_COUNT");
        std::env::remove_var("HZ_INVOCATION_RETRY_PAUSE_MS");
        std::env::remove_var("HZ_INVOCATION_MAX_BACKOFF_MS");

        assert_eq!(config.invocation_timeout(), Duration::from_secs(7));
        assert_eq!(config.retry().max_attempts(), 3);
        assert_eq!(config.retry().initial_backoff(), Duration::from_millis(20));
        assert_eq!(config.retry().max_backoff(), DEFAULT_MAX_BACKOFF);
    }
}

//! Authorizer configuration.
//!
//! Configuration is loaded from environment variables once at startup. The
//! service refuses to start on missing or partial trust configuration; there
//! is no fallback issuer or audience.

use crate::auth::jwks::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT};
use crate::auth::jwt::TrustPolicy;
use common::config::ObservabilityConfig;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default expected `token_use`.
pub const DEFAULT_TOKEN_USE: &str = "access";

/// Default allowed signing algorithm.
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::RS256;

/// Algorithms the key cache can produce keys for.
const SUPPORTED_ALGORITHMS: [Algorithm; 7] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::EdDSA,
];

/// Upper bound for the key set fetch timeout.
const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Authorizer configuration.
///
/// Holds no secrets, so the derived Debug is safe to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Exact expected token issuer.
    pub issuer: String,

    /// Accepted audiences / client ids.
    pub audiences: Vec<String>,

    /// Expected `token_use` claim (default: "access").
    pub token_use: String,

    /// Signing algorithms tokens may declare (default: RS256).
    pub allowed_algorithms: Vec<Algorithm>,

    /// Provider JWKS endpoint (default: `{issuer}/.well-known/jwks.json`).
    pub jwks_url: String,

    /// Key set freshness window.
    pub jwks_cache_ttl: Duration,

    /// Upper bound on one key set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Tolerance for `nbf`/`iat` in the future.
    pub clock_skew: Duration,

    /// Time to keep serving after a shutdown signal.
    pub drain_period: Duration,

    /// Logging setup.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid issuer configuration: {0}")]
    InvalidIssuer(String),

    #[error("Invalid audience configuration: {0}")]
    InvalidAudience(String),

    #[error("Invalid algorithm configuration: {0}")]
    InvalidAlgorithm(String),

    #[error("Invalid JWKS URL configuration: {0}")]
    InvalidJwksUrl(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let issuer = parse_issuer(vars)?;

        let audiences = parse_list(required(vars, "AUTHORIZER_AUDIENCE")?);
        if audiences.is_empty() {
            return Err(ConfigError::InvalidAudience(
                "AUTHORIZER_AUDIENCE must name at least one audience".to_string(),
            ));
        }

        let token_use = non_empty(vars, "AUTHORIZER_TOKEN_USE")
            .map_or(DEFAULT_TOKEN_USE, str::trim)
            .to_string();

        let allowed_algorithms = match non_empty(vars, "AUTHORIZER_ALLOWED_ALGORITHMS") {
            Some(value) => parse_algorithms(value)?,
            None => vec![DEFAULT_ALGORITHM],
        };

        let jwks_url = match non_empty(vars, "AUTHORIZER_JWKS_URL") {
            Some(url) => url.to_string(),
            None => format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/')),
        };
        if !(jwks_url.starts_with("https://") || jwks_url.starts_with("http://")) {
            return Err(ConfigError::InvalidJwksUrl(format!(
                "AUTHORIZER_JWKS_URL must be an http(s) URL, got '{jwks_url}'"
            )));
        }

        let jwks_cache_ttl =
            parse_duration(vars, "AUTHORIZER_JWKS_CACHE_TTL_SECONDS", Duration::from_secs)?
                .unwrap_or(DEFAULT_CACHE_TTL);

        let jwks_fetch_timeout =
            parse_duration(vars, "AUTHORIZER_JWKS_FETCH_TIMEOUT_MS", Duration::from_millis)?
                .unwrap_or(DEFAULT_FETCH_TIMEOUT);
        if jwks_fetch_timeout > MAX_FETCH_TIMEOUT {
            return Err(ConfigError::InvalidDuration(format!(
                "AUTHORIZER_JWKS_FETCH_TIMEOUT_MS must not exceed {} ms",
                MAX_FETCH_TIMEOUT.as_millis()
            )));
        }

        let clock_skew = parse_clock_skew(vars)?;

        let drain_period = match vars.get("AUTHORIZER_DRAIN_SECONDS") {
            Some(value) => Duration::from_secs(value.trim().parse().map_err(|e| {
                ConfigError::InvalidDuration(format!(
                    "AUTHORIZER_DRAIN_SECONDS must be a non-negative integer, got '{value}': {e}"
                ))
            })?),
            None => Duration::ZERO,
        };

        let mut observability = ObservabilityConfig::default();
        if let Some(value) = vars.get("AUTHORIZER_LOG_JSON") {
            observability.json_logs = parse_bool("AUTHORIZER_LOG_JSON", value)?;
        }

        Ok(Config {
            bind_address,
            issuer,
            audiences,
            token_use,
            allowed_algorithms,
            jwks_url,
            jwks_cache_ttl,
            jwks_fetch_timeout,
            clock_skew,
            drain_period,
            observability,
        })
    }

    /// Trust parameters for the token verifier.
    pub fn trust_policy(&self) -> TrustPolicy {
        TrustPolicy {
            issuer: self.issuer.clone(),
            audiences: self.audiences.clone(),
            token_use: self.token_use.clone(),
            allowed_algorithms: self.allowed_algorithms.clone(),
            clock_skew: self.clock_skew,
        }
    }
}

fn required<'a>(vars: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ConfigError> {
    non_empty(vars, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

/// Explicit issuer, or the issuer derived from region + user pool id.
fn parse_issuer(vars: &HashMap<String, String>) -> Result<String, ConfigError> {
    let issuer = match non_empty(vars, "AUTHORIZER_ISSUER") {
        Some(issuer) => issuer.trim().to_string(),
        None => {
            let region = non_empty(vars, "COGNITO_REGION");
            let pool_id = non_empty(vars, "COGNITO_USER_POOL_ID");
            match (region, pool_id) {
                (Some(region), Some(pool_id)) => format!(
                    "https://cognito-idp.{}.amazonaws.com/{}",
                    region.trim(),
                    pool_id.trim()
                ),
                (Some(_), None) => {
                    return Err(ConfigError::MissingEnvVar("COGNITO_USER_POOL_ID".to_string()))
                }
                (None, Some(_)) => {
                    return Err(ConfigError::MissingEnvVar("COGNITO_REGION".to_string()))
                }
                (None, None) => {
                    return Err(ConfigError::MissingEnvVar("AUTHORIZER_ISSUER".to_string()))
                }
            }
        }
    };

    let has_host = issuer
        .strip_prefix("https://")
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
    if !has_host {
        return Err(ConfigError::InvalidIssuer(format!(
            "issuer must be an https URL, got '{issuer}'"
        )));
    }

    Ok(issuer)
}

fn parse_list(value: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        if !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    items
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();

    for name in parse_list(value) {
        let algorithm = Algorithm::from_str(&name).map_err(|_| {
            ConfigError::InvalidAlgorithm(format!("unknown algorithm '{name}'"))
        })?;
        if !SUPPORTED_ALGORITHMS.contains(&algorithm) {
            return Err(ConfigError::InvalidAlgorithm(format!(
                "algorithm '{name}' is not supported for provider-signed tokens"
            )));
        }
        algorithms.push(algorithm);
    }

    if algorithms.is_empty() {
        return Err(ConfigError::InvalidAlgorithm(
            "AUTHORIZER_ALLOWED_ALGORITHMS must name at least one algorithm".to_string(),
        ));
    }
    Ok(algorithms)
}

/// Parse a positive integer duration; `None` when the variable is unset.
fn parse_duration(
    vars: &HashMap<String, String>,
    name: &str,
    unit: fn(u64) -> Duration,
) -> Result<Option<Duration>, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(None);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(Some(unit(value)))
}

fn parse_clock_skew(vars: &HashMap<String, String>) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get("AUTHORIZER_CLOCK_SKEW_SECONDS") else {
        return Ok(DEFAULT_CLOCK_SKEW);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidClockSkew(format!(
            "AUTHORIZER_CLOCK_SKEW_SECONDS must be a non-negative integer, got '{value_str}': {e}"
        ))
    })?;

    if value > MAX_CLOCK_SKEW.as_secs() {
        return Err(ConfigError::InvalidClockSkew(format!(
            "AUTHORIZER_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
            MAX_CLOCK_SKEW.as_secs()
        )));
    }

    Ok(Duration::from_secs(value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool(format!(
            "{name} must be true or false, got '{value}'"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "AUTHORIZER_ISSUER".to_string(),
                "https://idp.example/pool1".to_string(),
            ),
            ("AUTHORIZER_AUDIENCE".to_string(), "client123".to_string()),
        ])
    }

    fn with(mut vars: HashMap<String, String>, name: &str, value: &str) -> HashMap<String, String> {
        vars.insert(name.to_string(), value.to_string());
        vars
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.issuer, "https://idp.example/pool1");
        assert_eq!(config.audiences, vec!["client123"]);
        assert_eq!(config.token_use, "access");
        assert_eq!(config.allowed_algorithms, vec![Algorithm::RS256]);
        assert_eq!(
            config.jwks_url,
            "https://idp.example/pool1/.well-known/jwks.json"
        );
        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.jwks_fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.clock_skew, DEFAULT_CLOCK_SKEW);
        assert_eq!(config.drain_period, Duration::ZERO);
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        for (name, value) in [
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("AUTHORIZER_AUDIENCE", "client123, client456 ,client123,"),
            ("AUTHORIZER_TOKEN_USE", "id"),
            ("AUTHORIZER_ALLOWED_ALGORITHMS", "RS256,EdDSA"),
            ("AUTHORIZER_JWKS_URL", "http://127.0.0.1:4000/keys"),
            ("AUTHORIZER_JWKS_CACHE_TTL_SECONDS", "600"),
            ("AUTHORIZER_JWKS_FETCH_TIMEOUT_MS", "1500"),
            ("AUTHORIZER_CLOCK_SKEW_SECONDS", "60"),
            ("AUTHORIZER_DRAIN_SECONDS", "10"),
            ("AUTHORIZER_LOG_JSON", "true"),
        ] {
            vars = with(vars, name, value);
        }

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.audiences, vec!["client123", "client456"]);
        assert_eq!(config.token_use, "id");
        assert_eq!(
            config.allowed_algorithms,
            vec![Algorithm::RS256, Algorithm::EdDSA]
        );
        assert_eq!(config.jwks_url, "http://127.0.0.1:4000/keys");
        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(600));
        assert_eq!(config.jwks_fetch_timeout, Duration::from_millis(1500));
        assert_eq!(config.clock_skew, Duration::from_secs(60));
        assert_eq!(config.drain_period, Duration::from_secs(10));
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_issuer_derived_from_user_pool() {
        let vars = HashMap::from([
            ("COGNITO_REGION".to_string(), "eu-west-1".to_string()),
            ("COGNITO_USER_POOL_ID".to_string(), "eu-west-1_AbC123".to_string()),
            ("AUTHORIZER_AUDIENCE".to_string(), "client123".to_string()),
        ]);

        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(
            config.issuer,
            "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_AbC123"
        );
        assert_eq!(
            config.jwks_url,
            "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_AbC123/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_explicit_issuer_wins_over_user_pool() {
        let vars = with(base_vars(), "COGNITO_REGION", "us-east-1");
        let vars = with(vars, "COGNITO_USER_POOL_ID", "us-east-1_X");

        assert_eq!(
            Config::from_vars(&vars).unwrap().issuer,
            "https://idp.example/pool1"
        );
    }

    #[test]
    fn test_missing_trust_configuration() {
        let result = Config::from_vars(&HashMap::new());
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingEnvVar("AUTHORIZER_ISSUER".to_string())
        );

        let mut vars = base_vars();
        vars.remove("AUTHORIZER_AUDIENCE");
        assert_eq!(
            Config::from_vars(&vars).unwrap_err(),
            ConfigError::MissingEnvVar("AUTHORIZER_AUDIENCE".to_string())
        );

        let vars = with(base_vars(), "AUTHORIZER_ISSUER", "   ");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(v)) if v == "AUTHORIZER_ISSUER"
        ));
    }

    #[test]
    fn test_partial_user_pool_configuration() {
        let vars = HashMap::from([
            ("COGNITO_REGION".to_string(), "eu-west-1".to_string()),
            ("AUTHORIZER_AUDIENCE".to_string(), "client123".to_string()),
        ]);
        assert_eq!(
            Config::from_vars(&vars).unwrap_err(),
            ConfigError::MissingEnvVar("COGNITO_USER_POOL_ID".to_string())
        );

        let vars = HashMap::from([
            ("COGNITO_USER_POOL_ID".to_string(), "pool".to_string()),
            ("AUTHORIZER_AUDIENCE".to_string(), "client123".to_string()),
        ]);
        assert_eq!(
            Config::from_vars(&vars).unwrap_err(),
            ConfigError::MissingEnvVar("COGNITO_REGION".to_string())
        );
    }

    #[test]
    fn test_issuer_must_be_https() {
        for issuer in ["http://idp.example/pool1", "idp.example", "https://", "https:///pool"] {
            let vars = with(base_vars(), "AUTHORIZER_ISSUER", issuer);
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidIssuer(_))),
                "{issuer}"
            );
        }
    }

    #[test]
    fn test_audience_list_must_not_be_empty() {
        let vars = with(base_vars(), "AUTHORIZER_AUDIENCE", ", ,");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidAudience(_))
        ));
    }

    #[test]
    fn test_algorithms_reject_symmetric_and_unknown() {
        for value in ["HS256", "RS256,HS512", "ES256", "none", "RS999", " , "] {
            let vars = with(base_vars(), "AUTHORIZER_ALLOWED_ALGORITHMS", value);
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidAlgorithm(_))),
                "{value}"
            );
        }
    }

    #[test]
    fn test_jwks_url_must_be_http() {
        let vars = with(base_vars(), "AUTHORIZER_JWKS_URL", "file:///etc/jwks.json");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidJwksUrl(_))
        ));
    }

    #[test]
    fn test_durations_reject_zero_and_garbage() {
        for name in [
            "AUTHORIZER_JWKS_CACHE_TTL_SECONDS",
            "AUTHORIZER_JWKS_FETCH_TIMEOUT_MS",
        ] {
            for value in ["0", "-5", "soon"] {
                let vars = with(base_vars(), name, value);
                assert!(
                    matches!(Config::from_vars(&vars), Err(ConfigError::InvalidDuration(_))),
                    "{name}={value}"
                );
            }
        }

        let vars = with(base_vars(), "AUTHORIZER_JWKS_FETCH_TIMEOUT_MS", "60000");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_clock_skew_bounds() {
        let vars = with(base_vars(), "AUTHORIZER_CLOCK_SKEW_SECONDS", "0");
        assert_eq!(Config::from_vars(&vars).unwrap().clock_skew, Duration::ZERO);

        let vars = with(base_vars(), "AUTHORIZER_CLOCK_SKEW_SECONDS", "600");
        assert_eq!(
            Config::from_vars(&vars).unwrap().clock_skew,
            Duration::from_secs(600)
        );

        for value in ["601", "-1", "abc"] {
            let vars = with(base_vars(), "AUTHORIZER_CLOCK_SKEW_SECONDS", value);
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidClockSkew(_))),
                "{value}"
            );
        }
    }

    #[test]
    fn test_log_json_parsing() {
        let vars = with(base_vars(), "AUTHORIZER_LOG_JSON", "0");
        assert!(!Config::from_vars(&vars).unwrap().observability.json_logs);

        let vars = with(base_vars(), "AUTHORIZER_LOG_JSON", "maybe");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidBool(_))
        ));
    }

    #[test]
    fn test_trust_policy_mirrors_config() {
        let vars = with(base_vars(), "AUTHORIZER_ALLOWED_ALGORITHMS", "EdDSA");
        let config = Config::from_vars(&vars).unwrap();

        let policy = config.trust_policy();

        assert_eq!(policy.issuer, config.issuer);
        assert_eq!(policy.audiences, config.audiences);
        assert_eq!(policy.token_use, "access");
        assert_eq!(policy.allowed_algorithms, vec![Algorithm::EdDSA]);
        assert_eq!(policy.clock_skew, config.clock_skew);
    }

    #[test]
    fn test_debug_is_loggable() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");

        assert!(debug.contains("https://idp.example/pool1"));
        assert!(debug.contains("client123"));
    }
}

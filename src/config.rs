//! Environment-based configuration types for the authorization server runtime settings.

use anyhow::Result;
use std::time::Duration;

use crate::errors::ConfigError;

/// Longest lifetime an authorization code may be configured with.
pub const MAX_AUTHORIZATION_CODE_EXPIRATION_MINUTES: i64 = 10;

/// Minimum length of the refresh token HMAC secret.
pub const MIN_REFRESH_TOKEN_SECRET_LENGTH: usize = 32;

/// HTTP server port configuration
#[derive(Clone)]
pub struct HttpPort(u16);

/// Access token lifetime
#[derive(Clone)]
pub struct AccessTokenExpiration(chrono::Duration);

/// Refresh token lifetime
#[derive(Clone)]
pub struct RefreshTokenExpiration(chrono::Duration);

/// Authorization code lifetime, capped at ten minutes
#[derive(Clone)]
pub struct AuthorizationCodeExpiration(chrono::Duration);

/// End-user session lifetime
#[derive(Clone)]
pub struct SessionExpiration(chrono::Duration);

/// Upper bound on every call the engines make to a collaborator
#[derive(Clone)]
pub struct CollaboratorTimeout(Duration);

/// HMAC secret for refresh tokens
#[derive(Clone)]
pub struct RefreshTokenSecret(String);

/// Boolean feature flag
#[derive(Clone)]
pub struct Flag(bool);

/// Main application configuration
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub external_base: String,
    pub storage_backend: String,
    pub database_url: Option<String>,
    pub session_backend: String,
    pub redis_url: Option<String>,
    pub session_expiration: SessionExpiration,
    pub keys_path: String,
    pub refresh_token_secret: RefreshTokenSecret,
    pub access_token_expiration: AccessTokenExpiration,
    pub refresh_token_expiration: RefreshTokenExpiration,
    pub authorization_code_expiration: AuthorizationCodeExpiration,
    pub collaborator_timeout: CollaboratorTimeout,
    pub revocation_cascade: Flag,
    pub enable_client_api: Flag,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let external_base = require_env("EXTERNAL_BASE")?;
        let storage_backend = default_env("STORAGE_BACKEND", "memory");
        let database_url = optional_env("DATABASE_URL");
        let session_backend = default_env("SESSION_BACKEND", "memory");
        let redis_url = optional_env("REDIS_URL");
        let session_expiration: SessionExpiration =
            default_env("SESSION_EXPIRATION", "1h").try_into()?;
        let keys_path = default_env("KEYS_PATH", "./keys");
        let refresh_token_secret: RefreshTokenSecret =
            require_env("REFRESH_TOKEN_SECRET")?.try_into()?;
        let access_token_expiration: AccessTokenExpiration =
            default_env("ACCESS_TOKEN_EXPIRATION", "1h").try_into()?;
        let refresh_token_expiration: RefreshTokenExpiration =
            default_env("REFRESH_TOKEN_EXPIRATION", "30d").try_into()?;
        let authorization_code_expiration: AuthorizationCodeExpiration =
            default_env("AUTHORIZATION_CODE_EXPIRATION", "10m").try_into()?;
        let collaborator_timeout: CollaboratorTimeout =
            default_env("COLLABORATOR_TIMEOUT", "5s").try_into()?;
        let revocation_cascade: Flag = default_env("REVOCATION_CASCADE", "false").try_into()?;
        let enable_client_api: Flag = default_env("ENABLE_CLIENT_API", "true").try_into()?;

        Ok(Self {
            version: version()?,
            http_port,
            external_base,
            storage_backend,
            database_url,
            session_backend,
            redis_url,
            session_expiration,
            keys_path,
            refresh_token_secret,
            access_token_expiration,
            refresh_token_expiration,
            authorization_code_expiration,
            collaborator_timeout,
            revocation_cascade,
            enable_client_api,
        })
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired(name.to_string()).into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

fn parse_duration(value: String) -> Result<chrono::Duration> {
    let duration = duration_str::parse(&value)
        .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))?;
    Ok(chrono::Duration::from_std(duration)?)
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for AccessTokenExpiration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_duration(value)?))
    }
}

impl AsRef<chrono::Duration> for AccessTokenExpiration {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for RefreshTokenExpiration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_duration(value)?))
    }
}

impl AsRef<chrono::Duration> for RefreshTokenExpiration {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for AuthorizationCodeExpiration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = parse_duration(value)?;
        if duration > chrono::Duration::minutes(MAX_AUTHORIZATION_CODE_EXPIRATION_MINUTES) {
            return Err(ConfigError::DurationTooLong(
                "AUTHORIZATION_CODE_EXPIRATION".to_string(),
                format!("{}m", MAX_AUTHORIZATION_CODE_EXPIRATION_MINUTES),
            )
            .into());
        }
        Ok(Self(duration))
    }
}

impl AsRef<chrono::Duration> for AuthorizationCodeExpiration {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for SessionExpiration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_duration(value)?))
    }
}

impl AsRef<chrono::Duration> for SessionExpiration {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for CollaboratorTimeout {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))?;
        Ok(Self(duration))
    }
}

impl AsRef<Duration> for CollaboratorTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for RefreshTokenSecret {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() < MIN_REFRESH_TOKEN_SECRET_LENGTH {
            return Err(ConfigError::SecretTooShort(
                "REFRESH_TOKEN_SECRET".to_string(),
                MIN_REFRESH_TOKEN_SECRET_LENGTH,
            )
            .into());
        }
        Ok(Self(value))
    }
}

impl AsRef<String> for RefreshTokenSecret {
    fn as_ref(&self) -> &String {
        &self.0
    }
}

impl TryFrom<String> for Flag {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Self(true)),
            "false" | "0" | "no" | "off" => Ok(Self(false)),
            _ => Err(ConfigError::BoolParsingFailed(value).into()),
        }
    }
}

impl AsRef<bool> for Flag {
    fn as_ref(&self) -> &bool {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_code_expiration_is_capped() {
        let ten: AuthorizationCodeExpiration = "10m".to_string().try_into().unwrap();
        assert_eq!(*ten.as_ref(), chrono::Duration::minutes(10));

        let result = AuthorizationCodeExpiration::try_from("15m".to_string());
        assert!(result.is_err());
        assert!(
            result
                .err()
                .map(|e| e.to_string().contains("error-oaks-config-6"))
                .unwrap_or(false)
        );
    }

    #[test]
    fn test_durations_parse() {
        let access: AccessTokenExpiration = "1h".to_string().try_into().unwrap();
        assert_eq!(*access.as_ref(), chrono::Duration::hours(1));

        let refresh: RefreshTokenExpiration = "30d".to_string().try_into().unwrap();
        assert_eq!(*refresh.as_ref(), chrono::Duration::days(30));

        let timeout: CollaboratorTimeout = "5s".to_string().try_into().unwrap();
        assert_eq!(*timeout.as_ref(), Duration::from_secs(5));

        assert!(AccessTokenExpiration::try_from("soon".to_string()).is_err());
    }

    #[test]
    fn test_flag_parsing() {
        for value in ["true", "1", "YES", "on"] {
            let flag: Flag = value.to_string().try_into().unwrap();
            assert!(*flag.as_ref());
        }
        for value in ["false", "0", "no", "OFF"] {
            let flag: Flag = value.to_string().try_into().unwrap();
            assert!(!*flag.as_ref());
        }
        assert!(Flag::try_from("maybe".to_string()).is_err());
    }

    #[test]
    fn test_refresh_secret_minimum_length() {
        assert!(RefreshTokenSecret::try_from("short".to_string()).is_err());
        let secret: RefreshTokenSecret = "x".repeat(32).try_into().unwrap();
        assert_eq!(secret.as_ref().len(), 32);
    }

    #[test]
    fn test_http_port() {
        let port: HttpPort = "".to_string().try_into().unwrap();
        assert_eq!(*port.as_ref(), 8080);
        let port: HttpPort = "9000".to_string().try_into().unwrap();
        assert_eq!(*port.as_ref(), 9000);
        assert!(HttpPort::try_from("not-a-port".to_string()).is_err());
    }
}

//! Standardized error types following the `error-oaks-<domain>-<number>` format.

use http::StatusCode;
use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-oaks-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-oaks-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-oaks-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-oaks-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when boolean string cannot be parsed
    #[error(
        "error-oaks-config-5 Failed to parse boolean '{0}': expected true/false/1/0/yes/no/on/off"
    )]
    BoolParsingFailed(String),

    /// Error when a duration is outside its permitted range
    #[error("error-oaks-config-6 {0} must not exceed {1}")]
    DurationTooLong(String, String),

    /// Error when a secret is too short to be useful
    #[error("error-oaks-config-7 {0} must be at least {1} bytes")]
    SecretTooShort(String, usize),
}

/// HTTP server errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Error when a bearer token is missing or malformed
    #[error("error-oaks-http-1 Missing or malformed bearer token")]
    MissingBearerToken,
}

/// OAuth protocol errors.
///
/// The variant is the error kind; the payload is a human readable message that
/// is only ever logged or echoed as `error_description`. Callers dispatch on the
/// variant (or on [`OAuthError::error_code`]), never on the message text.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Invalid request
    #[error("error-oaks-oauth-1 Invalid request: {0}")]
    InvalidRequest(String),

    /// Unauthorized client
    #[error("error-oaks-oauth-2 Unauthorized client: {0}")]
    UnauthorizedClient(String),

    /// Access denied
    #[error("error-oaks-oauth-3 Access denied: {0}")]
    AccessDenied(String),

    /// Unsupported response type
    #[error("error-oaks-oauth-4 Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// Invalid scope
    #[error("error-oaks-oauth-5 Invalid scope: {0}")]
    InvalidScope(String),

    /// Server error
    #[error("error-oaks-oauth-6 Server error: {0}")]
    ServerError(String),

    /// Temporarily unavailable
    #[error("error-oaks-oauth-7 Temporarily unavailable: {0}")]
    TemporarilyUnavailable(String),

    /// Unsupported grant type
    #[error("error-oaks-oauth-8 Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Unsupported token type hint
    #[error("error-oaks-oauth-9 Unsupported token type: {0}")]
    UnsupportedTokenType(String),

    /// Invalid client credentials
    #[error("error-oaks-oauth-10 Invalid client credentials: {0}")]
    InvalidClient(String),

    /// Invalid authorization grant
    #[error("error-oaks-oauth-11 Invalid grant: {0}")]
    InvalidGrant(String),

    /// Invalid token
    #[error("error-oaks-oauth-12 Invalid token: {0}")]
    InvalidToken(String),

    /// Client already exists
    #[error("error-oaks-oauth-13 Client already exists: {0}")]
    ClientAlreadyExists(String),

    /// The user must grant consent before a code can be issued
    #[error("error-oaks-oauth-14 Consent required: {0}")]
    ConsentRequired(String),

    /// The user must log in before a code can be issued
    #[error("error-oaks-oauth-15 Not authenticated: {0}")]
    NotAuthenticated(String),

    /// Redirect URI not registered for the client
    #[error("error-oaks-oauth-16 Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),
}

impl OAuthError {
    /// OAuth 2.0 error code as it appears on the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::UnauthorizedClient(_) => "unauthorized_client",
            OAuthError::AccessDenied(_) => "access_denied",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::ServerError(_) => "server_error",
            OAuthError::TemporarilyUnavailable(_) => "temporarily_unavailable",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedTokenType(_) => "unsupported_token_type",
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::ClientAlreadyExists(_) => "client_already_exists",
            OAuthError::ConsentRequired(_) => "consent_required",
            OAuthError::NotAuthenticated(_) => "login_required",
            OAuthError::InvalidRedirectUri(_) => "invalid_redirect_uri",
        }
    }

    /// The message carried by the error, without the error code prefix.
    pub fn description(&self) -> &str {
        match self {
            OAuthError::InvalidRequest(m)
            | OAuthError::UnauthorizedClient(m)
            | OAuthError::AccessDenied(m)
            | OAuthError::UnsupportedResponseType(m)
            | OAuthError::InvalidScope(m)
            | OAuthError::ServerError(m)
            | OAuthError::TemporarilyUnavailable(m)
            | OAuthError::UnsupportedGrantType(m)
            | OAuthError::UnsupportedTokenType(m)
            | OAuthError::InvalidClient(m)
            | OAuthError::InvalidGrant(m)
            | OAuthError::InvalidToken(m)
            | OAuthError::ClientAlreadyExists(m)
            | OAuthError::ConsentRequired(m)
            | OAuthError::NotAuthenticated(m)
            | OAuthError::InvalidRedirectUri(m) => m,
        }
    }

    /// HTTP status used when the error is rendered as a JSON body.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient(_) | OAuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            OAuthError::AccessDenied(_) | OAuthError::UnauthorizedClient(_) => {
                StatusCode::FORBIDDEN
            }
            OAuthError::ClientAlreadyExists(_) => StatusCode::CONFLICT,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OAuthError::TemporarilyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Signing key errors
#[derive(Debug, Error)]
pub enum KeyError {
    /// Keys were requested before the key manager was initialized
    #[error("error-oaks-key-1 Signing keys are not initialized")]
    NotInitialized,

    /// Error when key pair generation fails
    #[error("error-oaks-key-2 Key generation failed: {0}")]
    GenerationFailed(String),

    /// Error when PEM encoding or decoding fails
    #[error("error-oaks-key-3 Key encoding failed: {0}")]
    EncodingFailed(String),

    /// Error when the key persistence layer fails
    #[error("error-oaks-key-4 Key persistence failed: {0}")]
    PersistenceFailed(String),

    /// Error when a persisted key pair is inconsistent
    #[error("error-oaks-key-5 Public key does not match private key")]
    KeyMismatch,
}

/// Client registration errors
#[derive(Debug, Error)]
pub enum ClientRegistrationError {
    /// Invalid client metadata
    #[error("error-oaks-client-1 Invalid client metadata: {0}")]
    InvalidClientMetadata(String),

    /// Invalid redirect URI
    #[error("error-oaks-client-2 Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    /// Client not found
    #[error("error-oaks-client-3 Client not found: {0}")]
    ClientNotFound(String),

    /// Client id or name already registered
    #[error("error-oaks-client-4 Client already exists: {0}")]
    ClientAlreadyExists(String),

    /// Scope not present in the scope registry
    #[error("error-oaks-client-5 Invalid scope: {0}")]
    InvalidScope(String),

    /// Secret did not verify against the stored hash
    #[error("error-oaks-client-6 Invalid client secret")]
    InvalidClientSecret,

    /// Underlying storage failure
    #[error("error-oaks-client-7 Client storage failed: {0}")]
    Storage(#[from] StorageError),

    /// Secret hashing failure
    #[error("error-oaks-client-8 Secret hashing failed: {0}")]
    HashingFailed(String),
}

/// Database/storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when database connection fails
    #[error("error-oaks-storage-1 Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Error when query execution fails
    #[error("error-oaks-storage-2 Query execution failed: {0}")]
    QueryFailed(String),

    /// Error when data serialization fails
    #[error("error-oaks-storage-3 Data serialization failed: {0}")]
    SerializationFailed(String),

    /// Error when database operation fails
    #[error("error-oaks-storage-4 Database error: {0}")]
    DatabaseError(String),

    /// Error when data validation fails
    #[error("error-oaks-storage-5 Invalid data: {0}")]
    InvalidData(String),

    /// Error when requested resource is not found
    #[error("error-oaks-storage-6 Not found: {0}")]
    NotFound(String),

    /// Error when a unique record already exists
    #[error("error-oaks-storage-7 Already exists: {0}")]
    AlreadyExists(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_follow_kind() {
        assert_eq!(
            OAuthError::InvalidGrant("code already used".to_string()).error_code(),
            "invalid_grant"
        );
        assert_eq!(
            OAuthError::NotAuthenticated("no session".to_string()).error_code(),
            "login_required"
        );
        assert_eq!(
            OAuthError::UnsupportedTokenType("id_token".to_string()).error_code(),
            "unsupported_token_type"
        );
    }

    #[test]
    fn test_description_excludes_prefix() {
        let error = OAuthError::InvalidClient("bad secret".to_string());
        assert_eq!(error.description(), "bad secret");
        assert!(error.to_string().starts_with("error-oaks-oauth-10"));
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }
}

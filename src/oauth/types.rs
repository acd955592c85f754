//! OAuth 2.0 core types and data structures.
//!
//! Defines the closed enums used at every dispatch point, the persisted
//! credential records, and the request and response shapes of the engines.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// OAuth 2.0 Grant Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    Implicit,
    Password,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::Implicit => "implicit",
            GrantType::Password => "password",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "implicit" => Ok(GrantType::Implicit),
            "password" => Ok(GrantType::Password),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(format!("unknown grant type '{}'", other)),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth 2.0 Response Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Code,
    Token,
    IdToken,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::Token => "token",
            ResponseType::IdToken => "id_token",
        }
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "code" => Ok(ResponseType::Code),
            "token" => Ok(ResponseType::Token),
            "id_token" => Ok(ResponseType::IdToken),
            other => Err(format!("unknown response type '{}'", other)),
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth 2.0 Token Types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Bearer,
}

/// OAuth 2.0 Client Authentication Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    ClientSecretBasic,
    ClientSecretPost,
    None,
}

impl ClientAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientAuthMethod::ClientSecretBasic => "client_secret_basic",
            ClientAuthMethod::ClientSecretPost => "client_secret_post",
            ClientAuthMethod::None => "none",
        }
    }
}

impl FromStr for ClientAuthMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "client_secret_basic" => Ok(ClientAuthMethod::ClientSecretBasic),
            "client_secret_post" => Ok(ClientAuthMethod::ClientSecretPost),
            "none" => Ok(ClientAuthMethod::None),
            other => Err(format!("unknown token endpoint auth method '{}'", other)),
        }
    }
}

/// PKCE code challenge method. Only S256 is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    S256,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::S256 => "S256",
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "S256" => Ok(CodeChallengeMethod::S256),
            other => Err(format!("unsupported code challenge method '{}'", other)),
        }
    }
}

/// Token type hint accepted by introspection and revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    /// Parse a hint where the empty string means "no hint".
    pub fn parse(value: Option<&str>) -> Result<Option<Self>, String> {
        match value.unwrap_or_default() {
            "" => Ok(None),
            "access_token" => Ok(Some(TokenTypeHint::AccessToken)),
            "refresh_token" => Ok(Some(TokenTypeHint::RefreshToken)),
            other => Err(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenTypeHint::AccessToken => "access_token",
            TokenTypeHint::RefreshToken => "refresh_token",
        }
    }
}

/// Registered OAuth client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Unique client identifier
    pub client_id: String,
    /// Bcrypt hash of the client secret, never the plaintext
    pub client_secret_hash: String,
    /// Client name, unique across clients
    pub client_name: String,
    /// Grant types allowed for this client
    pub grant_types: Vec<GrantType>,
    /// Response types allowed for this client
    pub response_types: Vec<ResponseType>,
    /// Client authentication method at the token endpoint
    pub token_endpoint_auth_method: ClientAuthMethod,
    /// Registered redirect URIs, compared byte for byte
    pub redirect_uris: Vec<String>,
    /// Scopes the client may request
    pub scopes: Vec<String>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl OAuthClient {
    pub fn supports_grant(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Byte-exact redirect URI check.
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    pub fn allows_scope(&self, requested: &HashSet<String>) -> bool {
        requested.iter().all(|scope| self.scopes.contains(scope))
    }
}

/// Command for creating a client
#[derive(Debug, Clone)]
pub struct NewClient {
    pub client_name: String,
    pub grant_types: Vec<GrantType>,
    pub response_types: Vec<ResponseType>,
    pub token_endpoint_auth_method: ClientAuthMethod,
    /// `None` when the caller omitted redirect URIs entirely
    pub redirect_uris: Option<Vec<String>>,
    pub scopes: Vec<String>,
}

/// A freshly created client together with the plaintext secret.
///
/// This is the only place the plaintext secret ever exists.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub client: OAuthClient,
    pub client_secret: String,
}

/// OAuth Authorization Code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The authorization code
    pub code: String,
    /// Client ID that requested this code
    pub client_id: String,
    /// User ID that authorized this code
    pub user_id: String,
    /// Redirect URI used in the authorization request
    pub redirect_uri: String,
    /// Granted scope
    pub scope: Option<String>,
    /// Code challenge for PKCE
    pub code_challenge: Option<String>,
    /// Code challenge method for PKCE
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Whether this code has been used
    pub used: bool,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// OAuth Access Token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// The signed JWT
    pub token: String,
    /// Client ID
    pub client_id: String,
    /// User ID (absent for client credentials)
    pub user_id: Option<String>,
    /// Granted scope
    pub scope: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

/// OAuth Refresh Token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    /// The signed JWT
    pub token: String,
    /// Access token this refresh token was issued alongside
    pub access_token: String,
    /// Client ID
    pub client_id: String,
    /// User ID
    pub user_id: String,
    /// Granted scope
    pub scope: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

/// End user known to the user directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Consent a user has granted to a client for one scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConsent {
    pub user_id: String,
    pub client_id: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
}

/// Scope registered with the authorization server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated authorization request
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub response_type: ResponseType,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// End-user session identifier, usually taken from a cookie
    pub session_id: Option<String>,
}

/// Token Exchange Request
#[derive(Debug, Clone)]
pub struct TokenRequest {
    /// Grant type
    pub grant_type: GrantType,
    /// Authorization code (for authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI (for authorization_code grant)
    pub redirect_uri: Option<String>,
    /// Code verifier (for PKCE)
    pub code_verifier: Option<String>,
    /// Refresh token (for refresh_token grant)
    pub refresh_token: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
}

impl TokenRequest {
    pub fn new(grant_type: GrantType) -> Self {
        Self {
            grant_type,
            code: None,
            redirect_uri: None,
            code_verifier: None,
            refresh_token: None,
            client_id: None,
            client_secret: None,
            scope: None,
        }
    }
}

/// Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Token type
    pub token_type: TokenType,
    /// Expires in seconds
    pub expires_in: u64,
    /// Refresh token, omitted when none was issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scope, space separated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Introspection result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// OAuth Error Response
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Error code
    pub error: String,
    /// Error description
    pub error_description: Option<String>,
}

/// Generate a secure random token with 256 bits of entropy
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a client ID
pub fn generate_client_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate scope string
pub fn validate_scope(scope: &str) -> bool {
    scope.split_whitespace().all(|s| {
        s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.')
    })
}

/// Parse scope string into a set
pub fn parse_scope(scope: &str) -> HashSet<String> {
    scope.split_whitespace().map(|s| s.to_string()).collect()
}

/// Scope names stored for a consent grant.
///
/// A grant without scope is kept as a single empty-scope row so that a
/// scopeless authorization request can find it.
pub fn consent_scopes(scope: &str) -> Vec<String> {
    let names: Vec<String> = parse_scope(scope).into_iter().collect();
    if names.is_empty() {
        vec![String::new()]
    } else {
        names
    }
}

/// Join scopes into a space-separated string
pub fn join_scopes(scopes: &HashSet<String>) -> String {
    let mut scopes: Vec<_> = scopes.iter().collect();
    scopes.sort();
    scopes.into_iter().cloned().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_scopes() {
        assert_eq!(consent_scopes(""), vec![String::new()]);
        assert_eq!(consent_scopes("  "), vec![String::new()]);
        let mut names = consent_scopes("read write read");
        names.sort();
        assert_eq!(names, vec!["read".to_string(), "write".to_string()]);
    }

    #[test]
    fn test_enum_parse_boundary() {
        assert_eq!(
            "client_credentials".parse::<GrantType>(),
            Ok(GrantType::ClientCredentials)
        );
        assert!("device_code".parse::<GrantType>().is_err());
        assert_eq!("id_token".parse::<ResponseType>(), Ok(ResponseType::IdToken));
        assert!("code id_token".parse::<ResponseType>().is_err());
        assert_eq!(
            "none".parse::<ClientAuthMethod>(),
            Ok(ClientAuthMethod::None)
        );
        assert!("private_key_jwt".parse::<ClientAuthMethod>().is_err());
    }

    #[test]
    fn test_plain_pkce_is_rejected() {
        assert_eq!(
            "S256".parse::<CodeChallengeMethod>(),
            Ok(CodeChallengeMethod::S256)
        );
        assert!("plain".parse::<CodeChallengeMethod>().is_err());
        assert!("s256".parse::<CodeChallengeMethod>().is_err());
    }

    #[test]
    fn test_token_type_hint() {
        assert_eq!(TokenTypeHint::parse(None), Ok(None));
        assert_eq!(TokenTypeHint::parse(Some("")), Ok(None));
        assert_eq!(
            TokenTypeHint::parse(Some("refresh_token")),
            Ok(Some(TokenTypeHint::RefreshToken))
        );
        assert_eq!(
            TokenTypeHint::parse(Some("id_token")),
            Err("id_token".to_string())
        );
    }

    #[test]
    fn test_generate_token_entropy() {
        let first = generate_token();
        let second = generate_token();
        assert_ne!(first, second);
        // 32 bytes base64url without padding
        assert_eq!(first.len(), 43);
    }

    #[test]
    fn test_token_response_omits_missing_refresh_token() {
        let response = TokenResponse {
            access_token: "at".to_string(),
            token_type: TokenType::Bearer,
            expires_in: 3600,
            refresh_token: None,
            scope: Some("read".to_string()),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["token_type"], "Bearer");
        assert!(value.get("refresh_token").is_none());
    }

    #[test]
    fn test_inactive_introspection_serializes_only_active() {
        let value = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(value, serde_json::json!({ "active": false }));
    }

    #[test]
    fn test_scope_helpers() {
        let scopes = parse_scope("write read  read");
        assert_eq!(scopes.len(), 2);
        assert_eq!(join_scopes(&scopes), "read write");
        assert!(validate_scope("read write:all profile.email"));
        assert!(!validate_scope("read <script>"));
    }
}

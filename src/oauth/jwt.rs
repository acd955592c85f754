//! JWT minting and verification.
//!
//! Access tokens are RS256 with the active key's `kid` in the header.
//! Refresh tokens are HS256 with a server-held secret, because only this
//! server ever redeems them.

use crate::errors::OAuthError;
use crate::oauth::keys::KeyManager;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims carried by both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub typ: String,
}

/// Inputs common to every minted token
pub struct TokenGrant<'a> {
    pub client_id: &'a str,
    pub user_id: Option<&'a str>,
    pub scope: Option<&'a str>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenGrant<'_> {
    fn claims(&self, issuer: &str, typ: &str) -> TokenClaims {
        TokenClaims {
            iss: issuer.to_string(),
            sub: self.user_id.map(str::to_string),
            client_id: self.client_id.to_string(),
            scope: self.scope.map(str::to_string),
            iat: self.issued_at.timestamp(),
            exp: self.expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            typ: typ.to_string(),
        }
    }
}

pub struct TokenIssuer {
    keys: Arc<KeyManager>,
    issuer: String,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyManager>, issuer: String, refresh_secret: &str) -> Self {
        Self {
            keys,
            issuer,
            refresh_encoding_key: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding_key: DecodingKey::from_secret(refresh_secret.as_bytes()),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Mint an RS256 access token
    pub fn mint_access_token(&self, grant: &TokenGrant<'_>) -> Result<String, OAuthError> {
        let encoding_key = self.keys.encoding_key().map_err(|e| {
            tracing::error!(error = ?e, "Signing key unavailable");
            OAuthError::ServerError("Signing key unavailable".to_string())
        })?;
        let kid = self
            .keys
            .key_id()
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());

        encode(&header, &grant.claims(&self.issuer, ACCESS_TOKEN_TYPE), encoding_key).map_err(|e| {
            tracing::error!(error = ?e, "Failed to sign access token");
            OAuthError::ServerError("Failed to sign access token".to_string())
        })
    }

    /// Mint an HS256 refresh token
    pub fn mint_refresh_token(&self, grant: &TokenGrant<'_>) -> Result<String, OAuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            &grant.claims(&self.issuer, REFRESH_TOKEN_TYPE),
            &self.refresh_encoding_key,
        )
        .map_err(|e| {
            tracing::error!(error = ?e, "Failed to sign refresh token");
            OAuthError::ServerError("Failed to sign refresh token".to_string())
        })
    }

    /// Verify an access token's signature, issuer, expiry and type
    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims, OAuthError> {
        let decoding_key = self
            .keys
            .decoding_key()
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;

        let claims = decode::<TokenClaims>(token, decoding_key, &self.validation(Algorithm::RS256))
            .map_err(|e| {
                tracing::debug!(error = ?e, "Access token verification failed");
                OAuthError::InvalidToken("Invalid access token".to_string())
            })?
            .claims;

        if claims.typ != ACCESS_TOKEN_TYPE {
            return Err(OAuthError::InvalidToken("Invalid access token".to_string()));
        }
        Ok(claims)
    }

    /// Verify a refresh token's signature, issuer, expiry and type
    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenClaims, OAuthError> {
        let claims = decode::<TokenClaims>(
            token,
            &self.refresh_decoding_key,
            &self.validation(Algorithm::HS256),
        )
        .map_err(|e| {
            tracing::debug!(error = ?e, "Refresh token verification failed");
            OAuthError::InvalidGrant("Invalid refresh token".to_string())
        })?
        .claims;

        if claims.typ != REFRESH_TOKEN_TYPE {
            return Err(OAuthError::InvalidGrant("Invalid refresh token".to_string()));
        }
        Ok(claims)
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation
    }
}

//! OAuth 2.0 authorization server core: keys, clients, authorization codes,
//! tokens, introspection and revocation.

pub mod accounts;
pub mod authorization;
pub mod clients;
pub(crate) mod deadline;
pub mod introspection;
pub mod jwt;
pub mod keys;
pub mod revocation;
pub mod scopes;
pub mod token;
pub mod types;

pub use accounts::{AccountService, AccountSettings, LoginSession, UserInfo};
pub use authorization::{
    AuthorizationEngine, AuthorizationSettings, AuthorizeError, AuthorizeQuery, IssuedCode,
};
pub use clients::{ClientRegistrationRequest, ClientRegistrationResponse, ClientRegistry};
pub use introspection::IntrospectionEngine;
pub use jwt::{TokenClaims, TokenGrant, TokenIssuer};
pub use keys::{Jwk, JwkSet, KeyManager};
pub use revocation::RevocationEngine;
pub use scopes::{CreateScopeRequest, ScopeService};
pub use token::{ClientAuthentication, TokenEngine, TokenForm, TokenSettings};
pub use types::{
    AccessToken, AuthorizationCode, AuthorizationRequest, ClientAuthMethod, CodeChallengeMethod,
    GrantType, IntrospectionResponse, OAuthClient, OAuthErrorResponse, RefreshToken,
    ResponseType, TokenRequest, TokenResponse, TokenType, TokenTypeHint, parse_scope,
};

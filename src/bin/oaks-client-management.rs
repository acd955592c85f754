//! oaks client management CLI
//!
//! Talks to a running oaks server over HTTP to register OAuth clients and to
//! introspect or revoke tokens.
//!
//! ## Usage Examples
//!
//! ### Register a new client
//! ```bash
//! oaks-client-management --base-url http://localhost:8080 register \
//!   --name "Acme" \
//!   --redirect-uri "https://acme.test/cb" \
//!   --grant-type authorization-code \
//!   --grant-type refresh-token \
//!   --response-type code \
//!   --scope "read"
//! ```
//!
//! ### Introspect a token
//! ```bash
//! oaks-client-management introspect --token "$ACCESS_TOKEN"
//! ```
//!
//! ### Revoke a token
//! ```bash
//! oaks-client-management revoke --token "$REFRESH_TOKEN" --hint refresh-token
//! ```
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error (network, parsing, etc.)
//! - 2: The server rejected the request

use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process;
use thiserror::Error;

/// OAuth grant types accepted at registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
enum ResponseType {
    Code,
}

/// Client authentication methods at the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
enum ClientAuthMethod {
    ClientSecretBasic,
    ClientSecretPost,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    fn as_str(&self) -> &'static str {
        match self {
            TokenTypeHint::AccessToken => "access_token",
            TokenTypeHint::RefreshToken => "refresh_token",
        }
    }
}

#[derive(Debug, Serialize)]
struct ClientRegistrationRequest {
    client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uris: Option<Vec<String>>,
    grant_types: Vec<GrantType>,
    response_types: Vec<ResponseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_endpoint_auth_method: Option<ClientAuthMethod>,
}

#[derive(Parser)]
#[command(
    name = "oaks-client-management",
    about = "oaks OAuth client management CLI",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Base URL of the oaks server
    #[arg(long, env = "OAKS_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Pretty-print JSON responses
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new OAuth client
    Register(RegisterArgs),
    /// Check whether a token is active
    Introspect(TokenArgs),
    /// Revoke a token
    Revoke(TokenArgs),
}

#[derive(Args)]
struct RegisterArgs {
    /// Client name, unique across clients
    #[arg(long)]
    name: String,

    /// Redirect URI (repeatable)
    #[arg(long = "redirect-uri")]
    redirect_uris: Vec<String>,

    /// Grant type (repeatable)
    #[arg(long = "grant-type", value_enum, default_values_t = [GrantType::AuthorizationCode])]
    grant_types: Vec<GrantType>,

    /// Response type (repeatable)
    #[arg(long = "response-type", value_enum, default_values_t = [ResponseType::Code])]
    response_types: Vec<ResponseType>,

    /// Space separated scopes; each must exist in the scope registry
    #[arg(long)]
    scope: Option<String>,

    /// Token endpoint authentication method
    #[arg(long = "auth-method", value_enum)]
    auth_method: Option<ClientAuthMethod>,
}

#[derive(Args)]
struct TokenArgs {
    /// Token value
    #[arg(long, env = "OAKS_TOKEN")]
    token: String,

    /// Token type hint
    #[arg(long, value_enum)]
    hint: Option<TokenTypeHint>,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = Client::new();

    let result = match &cli.command {
        Commands::Register(args) => register_client(&client, &cli, args).await,
        Commands::Introspect(args) => introspect_token(&client, &cli, args).await,
        Commands::Revoke(args) => revoke_token(&client, &cli, args).await,
    };

    match result {
        Ok(()) => process::exit(0),
        Err(err @ AppError::Rejected { .. }) => {
            eprintln!("Error: {}", err);
            process::exit(2);
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}

async fn register_client(client: &Client, cli: &Cli, args: &RegisterArgs) -> Result<(), AppError> {
    let request = ClientRegistrationRequest {
        client_name: args.name.clone(),
        redirect_uris: (!args.redirect_uris.is_empty()).then(|| args.redirect_uris.clone()),
        grant_types: args.grant_types.clone(),
        response_types: args.response_types.clone(),
        scope: args.scope.clone(),
        token_endpoint_auth_method: args.auth_method.clone(),
    };

    let url = format!("{}/oauth/clients/register", cli.base_url.trim_end_matches('/'));
    if cli.verbose {
        eprintln!("POST {}", url);
        eprintln!("{}", serde_json::to_string_pretty(&request)?);
    }

    let response = client.post(&url).json(&request).send().await?;
    print_response(cli, response).await
}

async fn introspect_token(client: &Client, cli: &Cli, args: &TokenArgs) -> Result<(), AppError> {
    let url = format!("{}/oauth/introspect", cli.base_url.trim_end_matches('/'));
    if cli.verbose {
        eprintln!("POST {}", url);
    }
    let response = client.post(&url).form(&token_form(args)).send().await?;
    print_response(cli, response).await
}

async fn revoke_token(client: &Client, cli: &Cli, args: &TokenArgs) -> Result<(), AppError> {
    let url = format!("{}/oauth/revoke", cli.base_url.trim_end_matches('/'));
    if cli.verbose {
        eprintln!("POST {}", url);
    }
    let response = client.post(&url).form(&token_form(args)).send().await?;
    print_response(cli, response).await?;
    if cli.verbose {
        eprintln!("Token revoked");
    }
    Ok(())
}

fn token_form(args: &TokenArgs) -> Vec<(&'static str, String)> {
    let mut form = vec![("token", args.token.clone())];
    if let Some(hint) = &args.hint {
        form.push(("token_type_hint", hint.as_str().to_string()));
    }
    form
}

async fn print_response(cli: &Cli, response: reqwest::Response) -> Result<(), AppError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(AppError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let value: Value = serde_json::from_str(&body)?;
    if cli.pretty {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", serde_json::to_string(&value)?);
    }
    Ok(())
}

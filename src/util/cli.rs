use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::auth::TokenStore;
use crate::core::types::{Identity, TokenId, TokenKind};
use crate::provider::{ConfigError, EngineConfig, Error, TokenEngine};
use crate::util::random::{random_secret, DEFAULT_SECRET_BYTES};

#[derive(Parser)]
#[command(
    name = "tokens-util",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Options {
    /// Store for stateful deployments; needs the `redis` feature.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,
    #[command(subcommand)]
    command: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Print a new random signing secret.
    GenSecret(GenSecret),
    /// Issue a token for an identity.
    Issue(Issue),
    /// Show the claims of a token without checking expiry.
    Inspect(Inspect),
    /// Fully validate a token.
    Validate(Validate),
    /// Revoke one or all refresh tokens of a subject.
    Revoke(Revoke),
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Access,
    Refresh,
}

impl From<Kind> for TokenKind {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Access => TokenKind::Access,
            Kind::Refresh => TokenKind::Refresh,
        }
    }
}

#[derive(Args)]
struct GenSecret {
    #[arg(short, long, default_value_t = DEFAULT_SECRET_BYTES)]
    bytes: usize,
}

#[derive(Args)]
struct Issue {
    #[arg(short, long)]
    subject: String,
    #[arg(short, long, default_value = "")]
    tenant_id: String,
    #[arg(long, default_value = "")]
    tenant_type: String,
    #[arg(short, long, value_enum, default_value_t = Kind::Access)]
    kind: Kind,
}

#[derive(Args)]
struct Inspect {
    token: String,
}

#[derive(Args)]
struct Validate {
    #[arg(short, long, value_enum, default_value_t = Kind::Access)]
    kind: Kind,
    token: String,
}

#[derive(Args)]
struct Revoke {
    #[arg(short, long)]
    subject: String,
    /// Revoke only this token id instead of every token of the subject.
    #[arg(short, long)]
    token_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] Error),
    #[error("stateful mode needs REDIS_URL and a build with the `redis` feature")]
    NoBackend,
    #[error("failed to connect to the store: {0}")]
    Connect(String),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(serde::Serialize)]
struct Inspection {
    claims: crate::provider::TokenClaims,
    expired: bool,
    remaining_secs: u64,
}

async fn token_store(opts: &Options) -> Result<Arc<dyn TokenStore>, CliError> {
    let url = opts.redis_url.as_deref().ok_or(CliError::NoBackend)?;
    connect(url).await
}

#[cfg(feature = "redis")]
async fn connect(url: &str) -> Result<Arc<dyn TokenStore>, CliError> {
    let store = crate::db::RedisStore::connect(url)
        .await
        .map_err(|e| CliError::Connect(e.to_string()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn connect(_url: &str) -> Result<Arc<dyn TokenStore>, CliError> {
    Err(CliError::NoBackend)
}

async fn engine(opts: &Options) -> Result<TokenEngine, CliError> {
    let config = EngineConfig::from_env()?;
    let store = if config.is_stateful() {
        Some(token_store(opts).await?)
    } else {
        None
    };
    Ok(TokenEngine::new(config, store))
}

fn gen_secret(c: &GenSecret) {
    println!("{}", random_secret(c.bytes));
}

async fn issue(c: &Issue, opts: &Options) -> Result<(), CliError> {
    let engine = engine(opts).await?;
    let identity = Identity::new(&c.subject, &c.tenant_id, &c.tenant_type);

    let token = match TokenKind::from(c.kind) {
        TokenKind::Access => engine.generate_access_token(&identity)?,
        TokenKind::Refresh => engine.generate_refresh_token(&identity).await?,
    };
    println!("{}", token);
    Ok(())
}

async fn inspect(c: &Inspect, opts: &Options) -> Result<(), CliError> {
    let engine = engine(opts).await?;
    let inspection = Inspection {
        claims: engine.inspect_token(&c.token)?,
        expired: engine.is_expired(&c.token)?,
        remaining_secs: engine.remaining_time(&c.token)?.as_secs(),
    };
    println!("{}", serde_json::to_string_pretty(&inspection)?);
    Ok(())
}

async fn validate(c: &Validate, opts: &Options) -> Result<(), CliError> {
    let engine = engine(opts).await?;
    let claims = match TokenKind::from(c.kind) {
        TokenKind::Access => engine.validate_access_token(&c.token)?,
        TokenKind::Refresh => engine.validate_refresh_token(&c.token).await?,
    };
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}

async fn revoke(c: &Revoke, opts: &Options) -> Result<(), CliError> {
    let engine = engine(opts).await?;
    match &c.token_id {
        Some(id) => {
            engine
                .revoke_refresh_token(&c.subject, &TokenId(id.to_string()))
                .await?;
            println!("Revoked {}", id);
        }
        None => {
            let removed = engine.revoke_all_refresh_tokens(&c.subject).await?;
            println!("Revoked {} token(s)", removed);
        }
    }
    Ok(())
}

pub async fn run_cli_action(opts: Options) -> Result<(), CliError> {
    match &opts.command {
        SubCommand::GenSecret(c) => {
            gen_secret(c);
            Ok(())
        }
        SubCommand::Issue(c) => issue(c, &opts).await,
        SubCommand::Inspect(c) => inspect(c, &opts).await,
        SubCommand::Validate(c) => validate(c, &opts).await,
        SubCommand::Revoke(c) => revoke(c, &opts).await,
    }
}

#![allow(missing_docs)]
use std::io::Write;

use anyhow::{Context, Result};
use kcauth_core::{
    ClientRegistry, ClientRepresentation, DEFAULT_REQUEST_TIMEOUT, ProvisioningConfig,
    ProvisioningOrchestrator, TokenManager,
};
use tracing::{Level, info, warn};

mod args;
use self::args::{AppArgs, BootstrapArgs, Command, TokenArgs, USAGE};

#[tokio::main]
async fn main() -> Result<()> {
    let AppArgs {
        verbose,
        command,
        unused,
    } = AppArgs::parse().context("parsing arguments")?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .init();
    if !unused.is_empty() {
        warn!(?unused, "Warning: unused arguments left");
    }

    match command {
        Command::Token(args) => token(args).await,
        Command::Bootstrap(args) => bootstrap(args).await,
        Command::Help => {
            write!(std::io::stdout(), "{USAGE}")?;
            Ok(())
        }
    }
}

async fn token(args: TokenArgs) -> Result<()> {
    let TokenArgs {
        config,
        name,
        auth_server_url,
    } = args;

    let mut builder = ClientRegistry::builder()
        .add_file(&config)
        .with_context(|| format!("loading clients from {}", config.display()))?;
    if let Some(url) = auth_server_url {
        builder = builder.with_auth_server_url(url);
    }
    let registry = builder.build().context("validating clients")?;

    let manager = TokenManager::builder(registry)
        .build()
        .context("building HTTP client")?;
    let token = manager
        .get_token(&name)
        .await
        .with_context(|| format!("acquiring token for '{name}'"))?;

    info!(%name, expires_at = %token.expires_at(), "token acquired");
    writeln!(std::io::stdout(), "{}", token.access_token())?;
    Ok(())
}

async fn bootstrap(args: BootstrapArgs) -> Result<()> {
    let BootstrapArgs {
        base_url,
        client_id,
        client_secret,
        realm,
        username,
        password,
        role,
        wait,
    } = args;

    let client = ClientRepresentation::service_account(client_id, client_secret);
    let mut config = ProvisioningConfig::new(&base_url, client).context("invalid base URL")?;
    if let Some(realm) = realm {
        config = config.with_realm(realm);
    }
    if username.is_some() || password.is_some() {
        let username = username.unwrap_or_else(|| config.admin_username().to_string());
        let password = password.unwrap_or_else(|| config.admin_password().as_str().to_string());
        config = config.with_admin_credentials(username, password);
    }
    if let Some(role) = role {
        config = config.with_role(role);
    }

    let http = reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .context("building HTTP client")?;
    let orchestrator = ProvisioningOrchestrator::new(http, config);

    if wait {
        orchestrator
            .wait_until_ready()
            .await
            .context("waiting for the identity provider")?;
    }
    let context = orchestrator.run().await.context("provisioning")?;

    let mut out = std::io::stdout().lock();
    writeln!(out, "client_internal_id={}", context.client_internal_id())?;
    writeln!(
        out,
        "service_account_user_id={}",
        context.service_account_user_id()
    )?;
    writeln!(out, "role_id={}", context.role_id())?;
    Ok(())
}

//! Storefront Auth - configuration check and route admission dry runs

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::error;

use storefront_auth::{
    claims::TokenClaims,
    cli::{Cli, Command},
    config::Config,
    context::AuthContext,
    gate::AuthDecision,
    identity::MemoryIdentityProvider,
    setup_tracing,
    transport::ReqwestTransport,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::CheckConfig => check_config(cli.config.as_deref()),
        Command::Explain {
            ref path,
            ref roles,
            ref token,
            anonymous,
        } => explain(cli.config.as_deref(), path, roles, token.as_deref(), anonymous).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Config::load(path).context("loading configuration")
}

fn check_config(path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let yaml = serde_yaml::to_string(&config).context("rendering configuration")?;
    println!("✅ configuration valid\n");
    print!("{yaml}");
    Ok(())
}

async fn explain(
    path: Option<&Path>,
    target: &str,
    roles: &[String],
    token: Option<&str>,
    anonymous: bool,
) -> anyhow::Result<()> {
    let config = load_config(path)?;

    let idp = if anonymous {
        MemoryIdentityProvider::anonymous()
    } else if let Some(token) = token {
        let Some(claims) = TokenClaims::from_jwt(token) else {
            bail!("--token is not a JWT");
        };
        let username = claims
            .preferred_username
            .clone()
            .unwrap_or_else(|| "token-user".to_string());
        MemoryIdentityProvider::signed_in(&username, claims.roles_for(&config.provider.client_id))
    } else {
        MemoryIdentityProvider::signed_in("explain", roles.iter().cloned())
    };

    let transport = Arc::new(ReqwestTransport::new(config.api.request_timeout)?);
    let ctx = AuthContext::start_ephemeral(config, Arc::new(idp), transport)
        .await
        .context("assembling auth context")?;

    let gate = ctx.gate();
    match gate.routes().requirement_for(target) {
        Some(req) if req.required_roles.is_empty() => println!("route:    {target} (login required)"),
        Some(req) => println!(
            "route:    {target} (any of: {})",
            req.required_roles.join(", ")
        ),
        None => println!("route:    {target} (public)"),
    }
    let held = ctx.credentials().roles();
    if ctx.credentials().is_authenticated() {
        println!(
            "session:  logged in, roles: {}",
            held.into_iter().collect::<Vec<_>>().join(", ")
        );
    } else {
        println!("session:  logged out");
    }

    match gate.decide_path(target).await {
        AuthDecision::Allow => println!("decision: ✅ allow"),
        AuthDecision::RedirectToLogin { return_path } => {
            println!("decision: 🔑 redirect to login, then back to {return_path}");
        }
        AuthDecision::RedirectToUnauthorized => println!(
            "decision: ⛔ redirect to {}",
            gate.unauthorized_path()
        ),
    }

    Ok(())
}

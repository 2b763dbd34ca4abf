//! zepher - command-line access to the Zepher access service.
//!
//! Issues authenticated requests with the configured application key,
//! follows the session token across invocations, and answers role and
//! feature-permission questions from the returned environment.

use std::io;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zepher_core::{ApiClient, CredentialStore, Settings};

const USAGE: &str = "\
Usage: zepher [--uri <env-uri>] <command> [args...]

Commands:
  get <uri> [key=value ...]      GET with query parameters
  post <uri> [key=value ...]     POST with form parameters
  delete <uri>                   DELETE
  access <features> [perms]      Check feature access (perms default: *)
  roles                          Print roles from the environment
  features                       Print feature permissions from the environment
  env                            Print the environment
  logout                         Forget the session token
  login <app-key>                Store the application key in the keychain
  forget                         Remove the stored application key

access, roles, features and env fetch the environment from --uri or `env_uri`.";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[derive(Debug, PartialEq)]
enum Command {
    Get { uri: String, params: Vec<(String, String)> },
    Post { uri: String, params: Vec<(String, String)> },
    Delete { uri: String },
    Access { features: String, permissions: String },
    Roles,
    Features,
    Env,
    Logout,
    Login { app_key: String },
    Forget,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Post { .. } => "post",
            Command::Delete { .. } => "delete",
            Command::Access { .. } => "access",
            Command::Roles => "roles",
            Command::Features => "features",
            Command::Env => "env",
            Command::Logout => "logout",
            Command::Login { .. } => "login",
            Command::Forget => "forget",
        }
    }
}

#[derive(Debug, PartialEq)]
struct Invocation {
    env_uri: Option<String>,
    command: Command,
}

fn parse_params(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .with_context(|| format!("Expected key=value, got '{}'", arg))
        })
        .collect()
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut env_uri = None;
    let mut rest = args;
    while let Some(first) = rest.first() {
        if first == "--uri" {
            env_uri = Some(rest.get(1).context("--uri needs a value")?.clone());
            rest = &rest[2..];
        } else {
            break;
        }
    }

    let Some((name, tail)) = rest.split_first() else {
        bail!("{}", USAGE);
    };
    let arg = |i: usize, what: &str| -> Result<String> {
        tail.get(i)
            .cloned()
            .with_context(|| format!("{} requires {}", name, what))
    };

    let command = match name.as_str() {
        "get" => Command::Get {
            uri: arg(0, "a URI")?,
            params: parse_params(&tail[1..])?,
        },
        "post" => Command::Post {
            uri: arg(0, "a URI")?,
            params: parse_params(&tail[1..])?,
        },
        "delete" => Command::Delete { uri: arg(0, "a URI")? },
        "access" => Command::Access {
            features: arg(0, "a feature list")?,
            permissions: tail.get(1).cloned().unwrap_or_else(|| "*".to_string()),
        },
        "roles" => Command::Roles,
        "features" => Command::Features,
        "env" => Command::Env,
        "logout" => Command::Logout,
        "login" => Command::Login { app_key: arg(0, "an application key")? },
        "forget" => Command::Forget,
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    };

    Ok(Invocation { env_uri, command })
}

fn resolve_app_key(settings: &Settings, credentials: &CredentialStore) -> Result<String> {
    if let Some(ref key) = settings.app_key {
        return Ok(key.clone());
    }
    match credentials.app_key()? {
        Some(key) => Ok(key),
        None => bail!(
            "No application key configured. Set ZEPHER_APP_KEY or run `zepher login <app-key>`."
        ),
    }
}

fn as_pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
    params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn refresh_env(client: &mut ApiClient, env_uri: Option<&str>) -> Result<()> {
    let uri = env_uri.context("No environment URI. Pass --uri or set env_uri in config.json")?;
    client.get(uri, &[]).await?;
    Ok(())
}

async fn run(invocation: Invocation, settings: Settings) -> Result<()> {
    let credentials = CredentialStore::new(settings.profile.as_deref());

    match invocation.command {
        Command::Login { ref app_key } => {
            credentials.store(app_key)?;
            println!("Application key stored for profile '{}'", credentials.profile());
            return Ok(());
        }
        Command::Forget => {
            if credentials.forget()? {
                println!("Application key removed for profile '{}'", credentials.profile());
            } else {
                println!("No application key stored for profile '{}'", credentials.profile());
            }
            return Ok(());
        }
        _ => {}
    }

    let app_key = resolve_app_key(&settings, &credentials)?;
    let mut client = ApiClient::new(settings.client_config(app_key)?)?;
    debug!(?client, "Client ready");
    let env_uri = invocation.env_uri.or(settings.env_uri);

    match invocation.command {
        Command::Get { uri, params } => {
            let body = client.get(&uri, &as_pairs(&params)).await?;
            print_json(&body)?;
        }
        Command::Post { uri, params } => {
            let body = client.post(&uri, &as_pairs(&params)).await?;
            print_json(&body)?;
        }
        Command::Delete { uri } => {
            let body = client.delete(&uri).await?;
            print_json(&body)?;
        }
        Command::Access { features, permissions } => {
            refresh_env(&mut client, env_uri.as_deref()).await?;
            println!("{}", client.validate_access(&features, &permissions));
        }
        Command::Roles => {
            refresh_env(&mut client, env_uri.as_deref()).await?;
            print_json(&client.roles())?;
        }
        Command::Features => {
            refresh_env(&mut client, env_uri.as_deref()).await?;
            print_json(&client.features())?;
        }
        Command::Env => {
            refresh_env(&mut client, env_uri.as_deref()).await?;
            print_json(client.env())?;
        }
        Command::Logout => {
            client.logout()?;
            println!("Logged out");
        }
        Command::Login { .. } | Command::Forget => unreachable!("handled above"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    let invocation = parse_args(&args)?;
    let settings = Settings::load().context("Failed to load settings")?;
    info!(command = invocation.command.name(), "zepher starting");

    run(invocation, settings).await
}

//! mcp-session: talk to a session issuer from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Open a session and list the authorized apps
//! MCP_JWT=... mcp-session --server-url https://issuer.example init
//!
//! # Renew one app's token
//! mcp-session --config mcp.toml --token $JWT refresh arcade
//!
//! # Print the URL a layer app is loaded from
//! mcp-session --config mcp.toml launch-url Arcade --resource-id r1 --user-id u1
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use mcp_host::{CallerConfig, CallerOrchestrator, LaunchContext, SessionIssuerClient};
use std::path::PathBuf;
use std::process;

/// Session issuer client for embedded mini-apps.
#[derive(Parser, Debug)]
#[command(name = "mcp-session")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Caller configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Session issuer base URL (overrides the config file)
    #[arg(long)]
    server_url: Option<String>,

    /// Bearer JWT identifying the caller
    #[arg(long, env = "MCP_JWT", hide_env_values = true)]
    token: String,

    /// Language requested at session init (overrides the config file)
    #[arg(short, long)]
    language: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a session and print it as JSON
    Init,
    /// Refresh an app token and print it as JSON
    Refresh {
        /// App id
        app: String,
    },
    /// Print the launch URL of a layer app
    LaunchUrl {
        /// App id or name
        app: String,
        #[arg(long)]
        resource_id: String,
        #[arg(long)]
        user_id: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    info!("Session issuer: {}", config.server_url);

    match args.command {
        Command::Init => {
            let client = SessionIssuerClient::new(&config, &args.token)?;
            let session = client.init_session().await?;
            for app in &session.apps {
                info!("  - {} ({}, {})", app.name, app.id, app.response_type);
            }
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Command::Refresh { app } => {
            let client = SessionIssuerClient::new(&config, &args.token)?;
            let refresh = client.refresh_token(&app).await?;
            println!("{}", serde_json::to_string_pretty(&refresh)?);
        }
        Command::LaunchUrl {
            app,
            resource_id,
            user_id,
        } => {
            let orchestrator = CallerOrchestrator::bootstrap(config, args.token.as_str()).await?;
            let url = orchestrator.launch_url(&app, &LaunchContext::new(resource_id, user_id))?;
            println!("{}", url);
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<CallerConfig> {
    let mut config = match (&args.config, &args.server_url) {
        (Some(path), _) => CallerConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        (None, Some(url)) => CallerConfig::new(url.clone()),
        (None, None) => bail!("either --config or --server-url is required"),
    };

    if let Some(url) = &args.server_url {
        config.server_url = url.clone();
    }
    if let Some(language) = &args.language {
        config.language = language.clone();
    }
    config.validate()?;
    Ok(config)
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! agentlink entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;

use agentlink::config::{self, AppConfig};
use agentlink::error::ToolError;
use agentlink::router::{DispatchOutcome, KeywordReasoner, ProtocolRouter};
use agentlink::server::{github_server, github_server_with_api, ContextServer};
use agentlink::telemetry::{init_telemetry, TelemetryConfig};
use agentlink::tools::{handler_fn, parse_arguments, ParamType, ToolDefinition, ToolSpec};
use agentlink::VERSION;

/// Route agent requests across context-sharing and peer protocols.
#[derive(Parser)]
#[command(name = "agentlink")]
#[command(author, version, about = "Multi-protocol agent layer", long_about = None)]
struct Cli {
    /// Show info-level logs
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a context-protocol server on stdin/stdout
    Serve {
        /// Serve the GitHub tool set
        #[arg(long)]
        github: bool,

        /// Call the GitHub REST API instead of returning canned data
        #[arg(long, requires = "github")]
        live: bool,

        /// Token for --live
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        /// Server name reported by initialize
        #[arg(long, default_value = "agentlink")]
        name: String,
    },

    /// Route a request through the configured protocols
    Dispatch {
        request: String,

        /// Invoke every protocol and synthesize
        #[arg(long)]
        all: bool,

        /// Config file (default: search the current directory, then ~/.agentlink)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the tools of a built-in server
    Tools {
        #[arg(long)]
        github: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let serving = matches!(cli.command, Commands::Serve { .. });
    let _guard = init_telemetry(&TelemetryConfig::for_command(cli.verbose, cli.debug, serving))?;

    match cli.command {
        Commands::Serve {
            github,
            live,
            github_token,
            name,
        } => {
            let server = build_server(github, live, github_token, name)?;
            Arc::new(server).serve_stdio().await?;
        }
        Commands::Dispatch {
            request,
            all,
            config,
            json,
        } => {
            dispatch(&request, all, config, json).await?;
        }
        Commands::Tools { github } => {
            let server = build_server(github, false, None, "agentlink".to_string())?;
            println!("{}", format!("Tools of {}", server.name()).bright_blue().bold());
            for tool in server.list_tools().await {
                let params: Vec<String> = tool
                    .parameter_schema
                    .iter()
                    .map(|(name, kind)| format!("{name}: {kind}"))
                    .collect();
                println!(
                    "  {} ({}) - {}",
                    tool.name.bright_white(),
                    params.join(", "),
                    tool.description
                );
            }
        }
        Commands::Version => {
            println!("agentlink {VERSION}");
        }
    }
    Ok(())
}

fn build_server(
    github: bool,
    live: bool,
    token: Option<String>,
    name: String,
) -> Result<ContextServer, ToolError> {
    match (github, live) {
        (true, true) => github_server_with_api(token),
        (true, false) => github_server(),
        (false, _) => basic_server(name),
    }
}

/// Server with a single `echo` tool that returns its `text` argument.
fn basic_server(name: String) -> Result<ContextServer, ToolError> {
    let mut registry = agentlink::tools::ToolRegistry::new();
    registry.register_spec(ToolSpec::new(
        ToolDefinition::new("echo", "Return the text argument").with_param("text", ParamType::String),
        handler_fn(|args: Value| async move {
            let args: EchoArgs = parse_arguments(&args)?;
            Ok(Value::String(args.text))
        }),
    ))?;
    Ok(ContextServer::with_registry(name, registry))
}

#[derive(Deserialize)]
struct EchoArgs {
    text: String,
}

async fn dispatch(
    request: &str,
    use_all: bool,
    config_path: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let app_config = match config_path {
        Some(path) => config::load_config_file(&path)?,
        None => config::load_config(&std::env::current_dir()?)?.unwrap_or_else(AppConfig::example),
    };

    let mut router = ProtocolRouter::new(Arc::new(KeywordReasoner));
    for protocol in config::build_protocols(&app_config)? {
        router.add_protocol(protocol);
    }

    let outcome = router.dispatch(request, use_all).await;
    router.cleanup().await;
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        DispatchOutcome::Single(result) => {
            println!(
                "{} {} ({:.0}% confidence)",
                "→".cyan(),
                result.protocol_used.to_string().bright_magenta(),
                result.confidence * 100.0
            );
            println!("{}", result.routing_reasoning.dimmed());
        }
        DispatchOutcome::FanOut(result) => {
            for (protocol, response) in &result.per_protocol_results {
                let mark = if response.is_success() {
                    "✓".green()
                } else {
                    "✗".red()
                };
                println!("{} {}", mark, protocol.to_string().bright_magenta());
            }
            println!("{}", format!("{:.0}% confidence", result.confidence * 100.0).dimmed());
        }
    }
    println!("\n{}", outcome.final_answer());
    Ok(())
}

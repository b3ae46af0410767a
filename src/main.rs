#![forbid(unsafe_code)]

//! `agent-relay` — one-shot CLI over the worker bridge.
//!
//! Bootstraps configuration and credentials, spawns the worker process, and
//! runs a single ping or query against it, printing events as they arrive.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agent_relay::protocol::QueryOptions;
use agent_relay::{AppError, Bridge, GlobalConfig, QueryEvent, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-relay", about = "Bridge to a persistent AI-agent worker", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Health-check the worker process.
    Ping,
    /// Send a prompt and print the result.
    Query {
        /// Prompt text.
        prompt: String,
        /// Model identifier override.
        #[arg(long)]
        model: Option<String>,
        /// System prompt override.
        #[arg(long)]
        system_prompt: Option<String>,
        /// Print intermediate events as they arrive instead of waiting for
        /// the aggregate result.
        #[arg(long)]
        stream: bool,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.apply_env_overrides();
    config.load_credentials().await?;
    info!("configuration loaded");

    let bridge = Bridge::start(&config)?;
    info!("worker bridge started");

    match args.command {
        CliCommand::Ping => {
            bridge.ping().await?;
            println!("pong");
        }
        CliCommand::Query {
            prompt,
            model,
            system_prompt,
            stream,
        } => {
            let options = QueryOptions {
                model,
                system_prompt,
                ..QueryOptions::default()
            };

            if stream {
                let mut events = bridge.query_stream(&prompt, options).await?;
                while let Some(event) = events.next().await {
                    print_event(&event);
                    if let QueryEvent::Error { error } = event {
                        return Err(AppError::Domain(error));
                    }
                }
            } else {
                let messages = bridge.query(&prompt, options).await?;
                for message in messages {
                    println!("{message}");
                }
            }
        }
    }

    Ok(())
}

fn print_event(event: &QueryEvent) {
    match event {
        QueryEvent::Text { text } => println!("{text}"),
        QueryEvent::Thinking { thinking } => eprintln!("[thinking] {thinking}"),
        QueryEvent::ToolUse { tool, .. } => eprintln!("[tool_use] {tool}"),
        QueryEvent::Done { messages } => {
            eprintln!("[done] {} message(s)", messages.len());
        }
        other => eprintln!("[{}]", other.event_type()),
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

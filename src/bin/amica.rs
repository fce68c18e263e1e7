//! CLI binary for amica.

use std::path::PathBuf;

use amica::config::ChatConfig;
use amica::host::stdio::run_stdio_bridge;
use amica::pipeline::coordinator::ChatController;
use amica::pipeline::messages::Role;
use amica::runtime::RuntimeEvent;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Amica: a talking avatar companion driven by a streaming language model.
#[derive(Parser)]
#[command(name = "amica", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "AMICA_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Chat from the terminal. Lines starting with `/` are commands.
    Chat,

    /// Run the JSON control bridge on stdin/stdout.
    Host,

    /// Write the default configuration file and print its path.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries chat output or the JSON protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("amica=info")))
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(ChatConfig::default_config_path);

    match cli.command.unwrap_or(Command::Chat) {
        Command::InitConfig { force } => init_config(&path, force),
        Command::Chat => run_chat(load_config(&path)?).await,
        Command::Host => run_host(load_config(&path)?).await,
    }
}

fn load_config(path: &std::path::Path) -> anyhow::Result<ChatConfig> {
    if path.exists() {
        info!(path = %path.display(), "loading config");
        Ok(ChatConfig::from_file(path)?)
    } else {
        info!(path = %path.display(), "no config file; using defaults");
        Ok(ChatConfig::default())
    }
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ChatConfig::default().save_to_file(path)?;
    println!("{}", path.display());
    Ok(())
}

async fn run_host(config: ChatConfig) -> anyhow::Result<()> {
    info!("amica host bridge starting");
    let controller = ChatController::from_config(config)?;
    run_stdio_bridge(controller.clone()).await.map_err(|e| {
        tracing::error!(error = %e, "host bridge exited with error");
        anyhow::anyhow!("host bridge failed: {e}")
    })?;
    controller.shutdown();
    info!("amica host bridge shut down cleanly");
    Ok(())
}

async fn run_chat(config: ChatConfig) -> anyhow::Result<()> {
    let name = config.character.name.clone();
    let controller = ChatController::from_config(config)?;
    println!("Amica v{}", env!("CARGO_PKG_VERSION"));
    println!("Type a message and press Enter. /interrupt, /life on|off and /quit are available.\n");

    let printer = tokio::spawn(print_replies(controller.subscribe(), name));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down...");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        match line.trim() {
            "/quit" => break,
            "/interrupt" => {
                controller.interrupt();
            }
            "/life on" => controller.set_life_enabled(true),
            "/life off" => controller.set_life_enabled(false),
            text => {
                let _ = controller.receive_message_from_user(text, false);
            }
        }
    }

    controller.shutdown();
    printer.abort();
    Ok(())
}

async fn print_replies(mut events: broadcast::Receiver<RuntimeEvent>, name: String) {
    loop {
        match events.recv().await {
            Ok(RuntimeEvent::MessageAppended { message }) if message.role == Role::Assistant => {
                println!("{name}: {}", message.content);
            }
            Ok(RuntimeEvent::Expression { name: expression }) => {
                tracing::debug!(expression, "expression changed");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "reply printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

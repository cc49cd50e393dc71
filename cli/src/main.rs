// dhtinvite: command-line front end for the invite service
//
// Hosts invite codes in a local sled database and shows what is still
// pending. `demo` runs a full exchange between two in-process nodes.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dhtinvite_core::{
    Claimer, Collaborators, DhtInvite, Invite, InviteConfig, LoopbackNetwork, MemoryPeerDirectory,
    MemorySocialGraph, MemoryStorage, NodeIdentity, SledStorage, StorageBackend,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dhtinvite")]
#[command(about = "DHT invites: single-use codes that make two peers follow each other", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show identity information
    Identity,
    /// Host a new invite code
    Create,
    /// List hosted invite codes
    Hosted,
    /// List invites still waiting to be redeemed
    Pending,
    /// Stop hosting an invite or drop a pending one
    Remove { invite: String },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run an invite exchange between two in-memory nodes
    Demo {
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Identity => cmd_identity().await,
        Commands::Create => cmd_create().await,
        Commands::Hosted => cmd_hosted().await,
        Commands::Pending => cmd_pending().await,
        Commands::Remove { invite } => cmd_remove(invite).await,
        Commands::Config { action } => cmd_config(action).await,
        Commands::Demo { timeout } => cmd_demo(timeout).await,
    }
}

/// Open the persistent node described by the config file
fn open_node(config: &config::Config) -> Result<DhtInvite> {
    let storage_dir = config.storage_dir()?;
    let storage_path = storage_dir
        .to_str()
        .context("Storage path is not valid UTF-8")?;
    let backend: Arc<dyn StorageBackend> = Arc::new(
        SledStorage::new(storage_path)
            .map_err(anyhow::Error::msg)
            .context("Failed to open storage")?,
    );

    let identity =
        NodeIdentity::load_or_generate(backend.clone()).context("Failed to load identity")?;
    let network = LoopbackNetwork::new();
    let node = build_node(
        &network,
        &identity.feed_id(),
        config.invite.clone(),
        backend,
    );
    node.start().context("Failed to start invite service")?;
    network.attach(&node);
    Ok(node)
}

fn build_node(
    network: &LoopbackNetwork,
    id: &str,
    invite: InviteConfig,
    backend: Arc<dyn StorageBackend>,
) -> DhtInvite {
    DhtInvite::new(
        id,
        invite,
        backend,
        Collaborators {
            connections: network.connector(id),
            social: Arc::new(MemorySocialGraph::new()),
            directory: Arc::new(MemoryPeerDirectory::new()),
        },
    )
}

async fn cmd_identity() -> Result<()> {
    let config = config::Config::load()?;
    let node = open_node(&config)?;

    println!("{}", "Identity Information".bold());
    println!("  Feed ID: {}", node.id().bright_cyan());
    println!(
        "  Storage: {}",
        config.storage_dir()?.display().to_string().dimmed()
    );

    Ok(())
}

async fn cmd_create() -> Result<()> {
    let config = config::Config::load()?;
    let node = open_node(&config)?;

    let invite = node.create().context("Failed to create invite")?;

    println!("{} Invite created:", "✓".green());
    println!("  {}", invite.bright_yellow());
    println!();
    println!("Share it with exactly one person; the first redeemer claims it.");

    Ok(())
}

async fn cmd_hosted() -> Result<()> {
    let config = config::Config::load()?;
    let node = open_node(&config)?;

    let entries = node.hosting().borrow().clone();
    if entries.is_empty() {
        println!("{}", "No hosted invites.".dimmed());
        return Ok(());
    }

    println!("{} ({} total)", "Hosted Invites".bold(), entries.len());
    println!();

    for entry in entries {
        let invite = Invite::new(entry.seed.as_str(), node.id());
        let status = match &entry.claimer {
            Claimer::Unclaimed => "unclaimed".dimmed(),
            Claimer::Claimed(feed) if entry.online => format!("{} (online)", feed).bright_green(),
            Claimer::Claimed(feed) => feed.as_str().bright_cyan(),
        };
        println!("  {} {}", "•".bright_green(), invite.to_string().bright_yellow());
        println!("    Claimer: {}", status);
        println!("    Channel: {}", invite.channel().dimmed());
    }

    Ok(())
}

async fn cmd_pending() -> Result<()> {
    let config = config::Config::load()?;
    let node = open_node(&config)?;

    let pending = node.claims().pending();
    if pending.is_empty() {
        println!("{}", "Nothing left to redeem.".dimmed());
        return Ok(());
    }

    println!("{} ({} total)", "Pending Invites".bold(), pending.len());
    println!();
    for invite in pending {
        println!("  {} {}", "•".bright_green(), invite.bright_yellow());
    }

    Ok(())
}

async fn cmd_remove(invite: String) -> Result<()> {
    let config = config::Config::load()?;
    let node = open_node(&config)?;

    if node.remove(&invite).context("Failed to remove invite")? {
        println!("{} Removed invite: {}", "✓".green(), invite.bright_yellow());
    } else {
        println!("{}", "No such invite.".dimmed());
    }

    Ok(())
}

async fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<24} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}

async fn cmd_demo(timeout_secs: u64) -> Result<()> {
    println!("{}", "DHT invite demo".bold());
    println!();

    let network = LoopbackNetwork::new();
    let invite_config = InviteConfig::default();
    let mut nodes = Vec::new();
    for _ in 0..2 {
        let identity = NodeIdentity::ephemeral();
        let node = build_node(
            &network,
            &identity.feed_id(),
            invite_config.clone(),
            Arc::new(MemoryStorage::new()),
        );
        node.start()?;
        network.attach(&node);
        nodes.push(node);
    }
    let (alice, bob) = (&nodes[0], &nodes[1]);

    println!("  Issuer:   {}", alice.id().bright_cyan());
    println!("  Redeemer: {}", bob.id().bright_cyan());
    println!();

    let invite = alice.create()?;
    println!("{} Issuer created {}", "✓".green(), invite.bright_yellow());

    let accepted = tokio::time::timeout(Duration::from_secs(timeout_secs), bob.accept(&invite))
        .await
        .context("Timed out redeeming invite")??;
    println!("{} Redeemer accepted: {}", "✓".green(), accepted);

    for entry in alice.hosting().borrow().iter() {
        println!(
            "  {} claimed by {} (online: {})",
            entry.seed.dimmed(),
            entry.claimer.to_string().bright_cyan(),
            entry.online
        );
    }

    Ok(())
}

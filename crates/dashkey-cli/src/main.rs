//! Dashkey CLI
//!
//! Device-side front end for Dashkey end-to-end encryption: key
//! provisioning, hybrid encrypt/decrypt, and local history resolution.

mod api;
mod commands;
mod config;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use commands::crypto::Recipient;
use dashkey_core::UserId;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dashkey")]
#[command(author, version, about = "Dashkey - end-to-end encryption for direct messages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage this device's key pairs
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Encrypt text for a recipient
    #[command(group(ArgGroup::new("recipient").required(true).args(["key", "to"])))]
    Encrypt {
        /// Recipient public key (base64)
        #[arg(long)]
        key: Option<String>,

        /// Recipient user id, looked up in the key directory
        #[arg(long)]
        to: Option<UserId>,

        /// Text to encrypt
        text: String,
    },

    /// Decrypt a payload with a local private key
    Decrypt {
        /// User whose private key to use
        #[arg(short, long)]
        user: UserId,

        /// Payload as received from the server
        payload: String,
    },

    /// Resolve an incoming message through local history, then decryption
    Resolve {
        /// Receiving user
        #[arg(short, long)]
        user: UserId,

        /// Sending user
        #[arg(long)]
        from: UserId,

        /// Server-assigned message id
        #[arg(long)]
        id: i64,

        /// Payload as received from the server
        payload: String,
    },

    /// Show local history with another user
    History {
        #[arg(short, long)]
        user: UserId,

        /// The other participant
        #[arg(short, long)]
        with: UserId,
    },

    /// Print the conversation id of two users
    #[command(name = "conv-id")]
    ConvId { a: UserId, b: UserId },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Generate a key pair unless one exists
    Init {
        #[arg(short, long)]
        user: UserId,

        /// Also register the public key with the server
        #[arg(long)]
        publish: bool,

        /// Remember this server URL in settings.json
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },
    /// Print the public key
    Show {
        #[arg(short, long)]
        user: UserId,
    },
    /// Show key pair details
    Status {
        #[arg(short, long)]
        user: UserId,
    },
    /// Delete the key pair (irreversible)
    Delete {
        #[arg(short, long)]
        user: UserId,

        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "dashkey=debug,dashkey_core=debug,dashkey_store=debug"
        } else {
            "dashkey=warn,dashkey_core=warn,dashkey_store=warn"
        })
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    info!("Starting Dashkey CLI");

    let result = match cli.command {
        Commands::Keys { action } => match action {
            KeysAction::Init {
                user,
                publish,
                server,
            } => commands::keys::init(user, publish, server).await,
            KeysAction::Show { user } => commands::keys::show(user).await,
            KeysAction::Status { user } => commands::keys::status(user).await,
            KeysAction::Delete { user, yes } => commands::keys::delete(user, yes).await,
        },
        Commands::Encrypt { key, to, text } => {
            let recipient = match (key, to) {
                (Some(key), _) => Recipient::Key(key),
                (None, Some(user)) => Recipient::User(user),
                (None, None) => anyhow::bail!("Either --key or --to is required"),
            };
            commands::crypto::encrypt(recipient, &text).await
        }
        Commands::Decrypt { user, payload } => commands::crypto::decrypt(user, &payload).await,
        Commands::Resolve {
            user,
            from,
            id,
            payload,
        } => commands::crypto::resolve(user, from, id, &payload).await,
        Commands::History { user, with } => commands::history::show(user, with).await,
        Commands::ConvId { a, b } => commands::history::conv_id(a, b),
    };

    if let Err(ref e) = result {
        error!("Command failed: {:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    result
}

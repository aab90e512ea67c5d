//! Shopgate CLI - migrations, vault keys and request signing.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! shopgate migrate
//!
//! # Generate a VAULT_ENCRYPTION_KEY
//! shopgate vault keygen
//!
//! # Remove a tenant's stored credential
//! shopgate vault purge --shop foo.myshopify.com
//!
//! # Sign an app proxy query string for local testing
//! shopgate sign proxy --secret "$SHOPIFY_API_SECRET" "shop=foo.myshopify.com&path_prefix=/apps/x"
//!
//! # Sign a webhook body for local testing
//! shopgate sign webhook --secret "$SHOPIFY_WEBHOOK_SECRET" --file payload.json
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "shopgate")]
#[command(author, version, about = "Shopgate operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Manage the credential vault
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
    /// Sign requests the way the platform does
    Sign {
        #[command(subcommand)]
        target: SignTarget,
    },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Print a new random vault key (base64)
    Keygen,
    /// Delete the stored credential of a shop
    Purge {
        /// Shop domain or store handle
        #[arg(short, long)]
        shop: String,
    },
}

#[derive(Subcommand)]
enum SignTarget {
    /// Sign an app proxy query string
    Proxy {
        /// Shared app secret
        #[arg(short, long, env = "SHOPIFY_API_SECRET", hide_env_values = true)]
        secret: String,

        /// Query string, with or without a leading `?`
        query: String,
    },
    /// Sign a webhook body
    Webhook {
        /// Webhook secret
        #[arg(short, long, env = "SHOPIFY_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,

        /// File holding the exact body bytes
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Vault { action } => match action {
            VaultAction::Keygen => commands::vault::keygen()?,
            VaultAction::Purge { shop } => commands::vault::purge(&shop).await?,
        },
        Commands::Sign { target } => match target {
            SignTarget::Proxy { secret, query } => commands::sign::proxy(&secret, &query),
            SignTarget::Webhook { secret, file } => commands::sign::webhook(&secret, &file)?,
        },
    }
    Ok(())
}

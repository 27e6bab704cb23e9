//! Livraison CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! lv-cli migrate
//!
//! # Create users
//! lv-cli user create -e admin@livraison.sn -n "Awa Ndiaye" -r admin -p 'long-password'
//! lv-cli user create -e moussa@livraison.sn -n "Moussa Diop" -r livreur
//!
//! # List couriers
//! lv-cli user list -r livreur
//!
//! # Sync the active spreadsheet configuration
//! lv-cli sync
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lv-cli")]
#[command(author, version, about = "Livraison CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Sync orders from the active spreadsheet configuration
    Sync,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Email address, used to log in
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role (`admin`, `closeur`, `livreur`)
        #[arg(short, long, default_value = "livreur")]
        role: String,

        /// Shop a closeur works for
        #[arg(long)]
        shop: Option<String>,

        /// Password; falls back to `LIVRAISON_USER_PASSWORD`
        #[arg(short, long)]
        password: Option<String>,
    },
    /// List users
    List {
        /// Only this role
        #[arg(short, long)]
        role: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

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
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                role,
                shop,
                password,
            } => {
                commands::user::create(&email, &name, &role, shop, password).await?;
            }
            UserAction::List { role } => commands::user::list(role.as_deref()).await?,
        },
        Commands::Sync => commands::sync::run().await?,
    }
    Ok(())
}

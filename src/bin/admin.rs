//! Remove My Data Admin CLI
//!
//! Administration tool for the account deletion server's database.
//!
//! # Usage
//!
//! ```bash
//! remove-my-data-admin user add ada@example.com --name Ada --role subscriber
//! remove-my-data-admin user list
//! remove-my-data-admin user roles ada@example.com --role subscriber --role customer
//! remove-my-data-admin session create ada@example.com
//! remove-my-data-admin pending list
//! remove-my-data-admin purge
//! ```
//!
//! # Environment Variables
//!
//! - `RMD_CONFIG`: Path to config file (default: ~/.config/remove-my-data/config.yaml)
//! - `RMD_DATABASE_PATH`: SQLite database, overrides the config file

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use mockable::DefaultClock;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

use remove_my_data::collaborators::HookRegistry;
use remove_my_data::db::TokenStore;
use remove_my_data::{init_db, AccountDeletion, Collaborators, Config, EmailSender, SqliteAccounts};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "remove-my-data-admin")]
#[command(version)]
#[command(about = "Remove My Data server administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User(UserCommand),
    /// Manage sessions
    Session(SessionCommand),
    /// Inspect pending deletion requests
    Pending(PendingCommand),
    /// Remove expired deletion requests and success flags
    Purge,
}

#[derive(Args)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand)]
enum UserSubcommand {
    /// Add a new user
    Add {
        /// User's email address
        email: String,
        /// User's display name
        #[arg(long, short)]
        name: Option<String>,
        /// Role to grant (repeatable)
        #[arg(long = "role", short, default_value = "subscriber")]
        roles: Vec<String>,
    },
    /// List all users
    List,
    /// Replace a user's roles
    Roles {
        /// User's email address
        email: String,
        /// Role to grant (repeatable)
        #[arg(long = "role", short, required = true)]
        roles: Vec<String>,
    },
}

#[derive(Args)]
struct SessionCommand {
    #[command(subcommand)]
    command: SessionSubcommand,
}

#[derive(Subcommand)]
enum SessionSubcommand {
    /// Create a session and print its bearer token
    Create {
        /// User's email address
        email: String,
    },
}

#[derive(Args)]
struct PendingCommand {
    #[command(subcommand)]
    command: PendingSubcommand,
}

#[derive(Subcommand)]
enum PendingSubcommand {
    /// List pending deletion requests
    List,
}

// ============================================================================
// Commands
// ============================================================================

async fn add_user(
    pool: SqlitePool,
    email: String,
    name: Option<String>,
    roles: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let accounts = SqliteAccounts::new(pool);

    if accounts.find_by_email(&email).await?.is_some() {
        eprintln!("Error: User '{}' already exists", email);
        std::process::exit(1);
    }

    let name = name.unwrap_or_else(|| email.clone());
    let user = accounts.create_user(&email, &name, &roles).await?;

    println!("Added user: {}", user.email);
    println!("  ID: {}", user.id);
    println!("  Name: {}", user.display_name);
    println!("  Roles: {}", user.roles.join(", "));

    Ok(())
}

async fn list_users(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    let users = SqliteAccounts::new(pool).list_users().await?;

    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    println!("{:<8} {:<40} {:<20} {:<20}", "ID", "EMAIL", "NAME", "ROLES");
    println!("{}", "-".repeat(88));

    for user in &users {
        println!(
            "{:<8} {:<40} {:<20} {:<20}",
            user.id,
            user.email,
            user.display_name,
            user.roles.join(",")
        );
    }

    println!();
    println!("Total: {} user(s)", users.len());

    Ok(())
}

async fn set_roles(
    pool: SqlitePool,
    email: String,
    roles: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let accounts = SqliteAccounts::new(pool);

    let Some(user) = accounts.find_by_email(&email).await? else {
        eprintln!("Error: User '{}' not found", email);
        std::process::exit(1);
    };

    accounts.set_roles(user.id, &roles).await?;
    println!("Updated user: {}", user.email);
    println!("  Roles: {}", roles.join(", "));

    Ok(())
}

async fn create_session(pool: SqlitePool, email: String) -> Result<(), Box<dyn std::error::Error>> {
    let accounts = SqliteAccounts::new(pool);

    let Some(user) = accounts.find_by_email(&email).await? else {
        eprintln!("Error: User '{}' not found", email);
        std::process::exit(1);
    };

    let token = accounts.create_session(user.id).await?;
    println!("{}", token);

    Ok(())
}

async fn list_pending(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    let pending = TokenStore::new(pool).list_pending().await?;

    if pending.is_empty() {
        println!("No pending deletion requests.");
        return Ok(());
    }

    let now = Utc::now();
    println!("{:<8} {:<25} {:<10}", "USER", "EXPIRES (UTC)", "STATE");
    println!("{}", "-".repeat(45));

    for (id, request) in &pending {
        let state = if request.is_expired(now) { "expired" } else { "live" };
        println!(
            "{:<8} {:<25} {:<10}",
            id,
            request.expires_at.format("%Y-%m-%d %H:%M:%S"),
            state
        );
    }

    println!();
    println!("Total: {} request(s)", pending.len());

    Ok(())
}

async fn purge(config: Config, pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    let accounts = SqliteAccounts::new(pool.clone());
    let collaborators = Collaborators {
        identity: Arc::new(accounts.clone()),
        content: Arc::new(accounts),
        mailer: Arc::new(EmailSender::unconfigured()),
        hooks: HookRegistry::new(),
    };
    let deletion = AccountDeletion::new(config, pool, collaborators, Arc::new(DefaultClock))?;

    let (requests, flags) = deletion.purge_expired().await?;

    println!("Removed {} expired request(s) and {} flag(s)", requests, flags);

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .or_else(|| std::env::var("RMD_CONFIG").ok().map(PathBuf::from));
    let config = Config::load(config_path)?;
    let pool = init_db(&config.database_path).await?;

    match cli.command {
        Commands::User(user_cmd) => match user_cmd.command {
            UserSubcommand::Add { email, name, roles } => add_user(pool, email, name, roles).await,
            UserSubcommand::List => list_users(pool).await,
            UserSubcommand::Roles { email, roles } => set_roles(pool, email, roles).await,
        },
        Commands::Session(session_cmd) => match session_cmd.command {
            SessionSubcommand::Create { email } => create_session(pool, email).await,
        },
        Commands::Pending(pending_cmd) => match pending_cmd.command {
            PendingSubcommand::List => list_pending(pool).await,
        },
        Commands::Purge => purge(config, pool).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

//! Remove My Data Server
//!
//! Serves the self-service account deletion flow over HTTP.
//!
//! # Configuration
//!
//! Environment variables:
//! - `RMD_CONFIG`: Path to config file (default: ~/.config/remove-my-data/config.yaml)
//! - `RMD_PORT`: Port to listen on (default: 8080)
//! - `RMD_DATABASE_PATH`: SQLite database (default: ~/.local/share/remove-my-data/remove-my-data.db)
//! - `RMD_BASE_URL`: Public URL used in emailed links
//! - `RMD_SECRET_KEY`: Key for token digests, at least 32 bytes
//! - `RMD_OPERATOR_EMAIL`: Where deletion notices go
//!
//! # Config File Format
//!
//! ```yaml
//! site_name: "Example"
//! base_url: "https://example.com"
//! secret_key: "a-long-random-string-of-at-least-32-bytes"
//! allowed_roles: ["subscriber", "customer"]
//! operator_email: "ops@example.com"
//! smtp:
//!   smtp_host: "smtp.example.com"
//!   smtp_port: 587
//!   smtp_user: "mailer"
//!   smtp_pass: "secret"
//!   from_email: "noreply@example.com"
//!   from_name: "Example"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remove_my_data::collaborators::{HookRegistry, Mailer};
use remove_my_data::server::{router, AppState};
use remove_my_data::{init_db, AccountDeletion, Collaborators, Config, EmailSender, SqliteAccounts};

/// Logs the error and exits.
fn fail(context: &str, error: impl std::fmt::Display) -> ! {
    tracing::error!("{}: {}", context, error);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remove_my_data=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("RMD_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path).unwrap_or_else(|e| fail("Failed to load config", e));

    tracing::info!("Database: {}", config.database_path.display());
    let pool = init_db(&config.database_path)
        .await
        .unwrap_or_else(|e| fail("Failed to open database", e));

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(EmailSender::new(smtp.clone())),
        None => {
            tracing::warn!("No SMTP configured - deletion emails cannot be sent");
            Arc::new(EmailSender::unconfigured())
        }
    };

    let accounts = SqliteAccounts::new(pool.clone());
    let collaborators = Collaborators {
        identity: Arc::new(accounts.clone()),
        content: Arc::new(accounts),
        mailer,
        hooks: HookRegistry::new(),
    };

    let port = config.port;
    let deletion = AccountDeletion::new(config, pool, collaborators, Arc::new(mockable::DefaultClock))
        .unwrap_or_else(|e| fail("Invalid configuration", e));
    let state = AppState::new(deletion).unwrap_or_else(|e| fail("Invalid configuration", e));

    let app = router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| fail("Failed to bind", e));
    if let Err(e) = axum::serve(listener, app).await {
        fail("Server error", e);
    }
}

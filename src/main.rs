mod engine;
mod error;
mod mcp;
mod models;
mod modules;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use error::AppError;
use mcp::server::McpServer;
use models::AccountRecord;
use modules::oauth::{self, PkcePair};
use modules::oauth_server::CallbackListener;
use modules::quota;
use modules::store::CredentialStore;

#[derive(Parser)]
#[command(
    name = "gemini-bridge",
    version,
    about = "Multi-account MCP bridge for the Gemini Cloud Code API"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server on stdin/stdout (the default).
    Serve,
    /// Authorize a Google account in the browser and store it.
    Login,
    /// List stored accounts and their status.
    Accounts,
    /// Remove an account by email.
    Remove { email: String },
    /// Re-enable an account for selection.
    Enable { email: String },
    /// Exclude an account from selection without deleting it.
    Disable { email: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is the MCP transport; all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = CredentialStore::open_default().context("opening the account store")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            McpServer::new(store).run_stdio().await?;
        }
        Command::Login => login(&store).await?,
        Command::Accounts => list_accounts(&store),
        Command::Remove { email } => {
            if store.remove(&email)? {
                println!("Removed {}", email);
            } else {
                println!("No account named {}", email);
            }
        }
        Command::Enable { email } => toggle(&store, &email, true)?,
        Command::Disable { email } => toggle(&store, &email, false)?,
    }
    Ok(())
}

/// Interactive login: PKCE authorization in the browser, code exchange on a
/// one-shot loopback listener, then the account lands in the primary store.
async fn login(store: &CredentialStore) -> anyhow::Result<()> {
    let listener = CallbackListener::bind().await?;
    let redirect_uri = listener.redirect_uri.clone();
    let pkce = PkcePair::generate();
    let auth_url = oauth::get_auth_url(&redirect_uri, &pkce);

    println!("Open this URL in your browser to authorize:");
    println!();
    println!("  {}", auth_url);
    println!();
    println!("Waiting for the callback on {} ...", redirect_uri);

    let code = listener.wait_for_code().await?;
    let client = reqwest::Client::new();
    let token = oauth::exchange_code(&client, &code, &redirect_uri, &pkce.verifier).await?;
    let refresh_token = token
        .refresh_token
        .ok_or_else(|| AppError::Auth("Google returned no refresh token".into()))?;

    let user = oauth::get_user_info(&client, &token.access_token).await?;
    let project_id = match quota::fetch_project_id(&client, &token.access_token).await {
        Ok(project) => project,
        Err(e) => {
            tracing::warn!("project lookup failed, account stored without one: {}", e);
            None
        }
    };

    let mut record = AccountRecord::new(user.email.clone(), refresh_token);
    record.project_id = project_id.clone();
    store.upsert(record)?;

    match project_id {
        Some(project) => println!("Added {} (project {})", user.email, project),
        None => println!("Added {}", user.email),
    }
    Ok(())
}

fn list_accounts(store: &CredentialStore) {
    let accounts = store.load();
    if accounts.is_empty() {
        println!("No accounts. Run `gemini-bridge login` to add one.");
        return;
    }
    for account in accounts {
        let status = if account.invalid {
            "invalid"
        } else if account.enabled {
            "enabled"
        } else {
            "disabled"
        };
        match &account.project_id {
            Some(project) => println!("{}  {}  project={}", account.email, status, project),
            None => println!("{}  {}", account.email, status),
        }
    }
}

fn toggle(store: &CredentialStore, email: &str, enabled: bool) -> anyhow::Result<()> {
    if store.set_enabled(email, enabled)? {
        println!(
            "{} is now {}",
            email,
            if enabled { "enabled" } else { "disabled" }
        );
    } else {
        println!("No account named {}", email);
    }
    Ok(())
}

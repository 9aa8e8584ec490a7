//! dexdesk - a command-line console for the DEX admin backend.
//!
//! Manages tokens, liquidity pools and trades behind a renewing session.

mod app;
mod commands;
mod utils;

use std::io;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dexdesk_core::models::{LiquidityPool, ResourceModel, Token, Trade, UpdateAccountRequest};
use dexdesk_core::routes::Route;
use dexdesk_core::Config;

use app::App;
use commands::TableRow;

/// Directory for rolling log files; stderr only when unset
const LOG_DIR_ENV: &str = "DEXDESK_LOG_DIR";

#[derive(Parser)]
#[command(name = "dexdesk", version, about = "Console for tokens, liquidity pools and trades")]
struct Cli {
    /// Override the API base URL for this run
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Forget the stored tokens
    Logout,
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Request a password reset email
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password using the token from the reset email
    ResetPassword { token: String },
    /// Confirm an email address using the token from the verification email
    VerifyEmail { token: String },
    /// Send the verification email again
    ResendVerification {
        #[arg(long)]
        email: String,
    },
    /// Show the signed-in account
    Whoami,
    /// Manage the signed-in account
    #[command(subcommand)]
    Account(AccountCommand),
    #[command(subcommand)]
    Tokens(ResourceCommand),
    #[command(subcommand)]
    Pools(ResourceCommand),
    #[command(subcommand)]
    Trades(ResourceCommand),
}

#[derive(Subcommand)]
enum AccountCommand {
    /// Update first and last name
    Update {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    ChangePassword,
}

#[derive(Subcommand)]
enum ResourceCommand {
    List(ListArgs),
    Show {
        id: i64,
    },
    /// Create from a JSON body
    Create {
        #[arg(long)]
        json: String,
    },
    /// Replace from a JSON body
    Update {
        id: i64,
        #[arg(long)]
        json: String,
    },
    Delete {
        id: i64,
    },
    /// Options for select inputs
    Dropdown {
        #[arg(long)]
        keyword: Option<String>,
    },
}

#[derive(Args)]
struct ListArgs {
    /// Zero-based page index
    #[arg(long, default_value_t = 0)]
    page: u32,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    search: Option<String>,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir.trim(), "dexdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

async fn run_resource<M>(app: &mut App, command: ResourceCommand) -> Result<()>
where
    M: ResourceModel + TableRow,
    M::Input: serde::de::DeserializeOwned,
{
    match command {
        ResourceCommand::List(args) => {
            commands::list::<M>(app, args.page, args.limit, args.search.as_deref()).await
        }
        ResourceCommand::Show { id } => commands::show::<M>(app, id).await,
        ResourceCommand::Create { json } => commands::create::<M>(app, &json).await,
        ResourceCommand::Update { id, json } => commands::update::<M>(app, id, &json).await,
        ResourceCommand::Delete { id } => commands::delete::<M>(app, id).await,
        ResourceCommand::Dropdown { keyword } => {
            commands::dropdown::<M>(app, keyword.as_deref()).await
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.override_api_url(url);
    }
    let mut app = App::new(config)?;

    match cli.command {
        Command::Login { email } => app.login(email).await,
        Command::Logout => {
            app.logout();
            Ok(())
        }
        Command::Register {
            email,
            first_name,
            last_name,
        } => app.register(email, first_name, last_name).await,
        Command::ForgotPassword { email } => app.forgot_password(&email).await,
        Command::ResetPassword { token } => app.reset_password(&token).await,
        Command::VerifyEmail { token } => app.verify_email(&token).await,
        Command::ResendVerification { email } => app.resend_verification(&email).await,
        Command::Whoami => {
            app.require_session(Route::MyAccount).await?;
            if let Some(account) = app.account() {
                println!("{}", account.display_name());
                println!("{}", serde_json::to_string_pretty(account)?);
            }
            Ok(())
        }
        Command::Account(AccountCommand::Update {
            first_name,
            last_name,
        }) => {
            app.update_account(UpdateAccountRequest {
                first_name,
                last_name,
            })
            .await
        }
        Command::Account(AccountCommand::ChangePassword) => app.change_password().await,
        Command::Tokens(command) => run_resource::<Token>(&mut app, command).await,
        Command::Pools(command) => run_resource::<LiquidityPool>(&mut app, command).await,
        Command::Trades(command) => run_resource::<Trade>(&mut app, command).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();
    info!("dexdesk starting");

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

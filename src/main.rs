//! medinsight - command-line client for the Medical Insight Engine.
//!
//! Handles account registration, login, and session management against
//! the engine's authentication API. Once logged in, the session (token
//! plus user record) is persisted and attached to every request until
//! logout or until the server rejects the token.

mod api;
mod app;
mod auth;
mod config;
mod models;
mod utils;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{friendly_error, App};
use auth::CredentialStore;
use utils::validators;

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level; MEDINSIGHT_LOG_FILE adds a file target.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var(config::ENV_LOG_FILE) {
        Ok(path) => {
            let path = PathBuf::from(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "medinsight.log".into());

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
            None
        }
    }
}

fn print_usage() {
    eprintln!("medinsight - Medical Insight Engine client");
    eprintln!();
    eprintln!("Usage: medinsight <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login [email]      Log in and store the session");
    eprintln!("  register           Create an account and log in");
    eprintln!("  logout             Clear the session (and revoke it server-side)");
    eprintln!("  whoami             Show the account for the current session");
    eprintln!("  refresh            Renew the session tokens");
    eprintln!("  change-password    Change the account password");
    eprintln!("  health             Check that the engine is reachable");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    info!("medinsight starting");

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");

    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return Ok(());
    }

    let mut app = App::new()?;

    let result = match command {
        "login" => cmd_login(&mut app, args.get(2).map(String::as_str)).await,
        "register" => cmd_register(&mut app).await,
        "logout" => cmd_logout(&mut app).await,
        "whoami" => cmd_whoami(&mut app).await,
        "refresh" => cmd_refresh(&mut app).await,
        "change-password" => cmd_change_password(&mut app).await,
        "health" => cmd_health(&app).await,
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", friendly_error(&e));
        std::process::exit(1);
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_with_default(label: &str, default: &str) -> Result<String> {
    print!("{} [{}]: ", label, default);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    if input.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(input.to_string())
    }
}

fn confirm(label: &str, default_yes: bool) -> Result<bool> {
    let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    print!("{} {}: ", label, hint);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(match input.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    })
}

async fn cmd_login(app: &mut App, email_arg: Option<&str>) -> Result<()> {
    let email = match email_arg {
        Some(email) => email.to_string(),
        None => {
            if let Ok(email) = std::env::var(config::ENV_EMAIL) {
                email
            } else if let Some(last) = app.config.last_email.clone() {
                prompt_with_default("Email", &last)?
            } else {
                prompt("Email")?
            }
        }
    };

    let mut remember = false;
    let password = if let Ok(password) = std::env::var(config::ENV_PASSWORD) {
        password
    } else if CredentialStore::has_credentials(&email)
        && confirm("Use stored password?", true)?
    {
        CredentialStore::get_password(&email)?
    } else {
        let password = rpassword::prompt_password("Password: ")?;
        remember = confirm("Remember password in system keychain?", false)?;
        password
    };

    println!("Authenticating...");
    let user = app.login(&email, &password, remember).await?;

    println!("Logged in as {}", user.display_name());
    Ok(())
}

async fn cmd_register(app: &mut App) -> Result<()> {
    let email = prompt("Email")?;
    let username = prompt_with_default("Username", &validators::username_from_email(&email))?;
    let full_name = prompt("Full name")?;

    let password = rpassword::prompt_password("Password: ")?;
    let confirmed = rpassword::prompt_password("Confirm password: ")?;
    if password != confirmed {
        anyhow::bail!("Passwords do not match");
    }

    println!("Creating account...");
    let user = app
        .register(&email, Some(&username), &password, &full_name)
        .await?;

    println!("Registered and logged in as {}", user.display_name());
    Ok(())
}

async fn cmd_logout(app: &mut App) -> Result<()> {
    app.logout().await;
    println!("Logged out.");
    Ok(())
}

async fn cmd_whoami(app: &mut App) -> Result<()> {
    if !app.is_authenticated() {
        anyhow::bail!("Not logged in. Run `medinsight login` first.");
    }

    let user = app.whoami().await?;

    println!("{}", user.display_name());
    println!("  email:      {}", user.email);
    println!("  role:       {}", user.role.display_name());
    if let Some(ref department) = user.department {
        println!("  department: {}", department);
    }
    if let Some(minutes) = app.session_minutes_left() {
        println!("  session:    expires in {}m", minutes);
    }
    Ok(())
}

async fn cmd_refresh(app: &mut App) -> Result<()> {
    if !app.is_authenticated() {
        anyhow::bail!("Not logged in. Run `medinsight login` first.");
    }

    app.refresh().await?;
    println!("Session refreshed.");
    Ok(())
}

async fn cmd_change_password(app: &mut App) -> Result<()> {
    if !app.is_authenticated() {
        anyhow::bail!("Not logged in. Run `medinsight login` first.");
    }

    let current = rpassword::prompt_password("Current password: ")?;
    let new = rpassword::prompt_password("New password: ")?;
    let confirmed = rpassword::prompt_password("Confirm new password: ")?;
    if new != confirmed {
        anyhow::bail!("Passwords do not match");
    }

    app.change_password(&current, &new).await?;
    println!("Password changed.");
    Ok(())
}

async fn cmd_health(app: &App) -> Result<()> {
    let status = app.health().await?;
    println!("Engine status: {}", status);
    Ok(())
}

//! Command-line interface.
//!
//! With no subcommand the binary runs the API server. Subcommands:
//! - `create-user <username>` - Create an account in the configured database
//! - `config check` - Validate the configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::api::auth::{hash_password, validate_password_strength};
use crate::api::validation::{validate_email, validate_username};
use crate::config::Config;
use crate::db;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(author, version, about = "Product catalogue and ordering API", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "STOREFRONT_CONFIG", default_value = "storefront.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a user account
    CreateUser {
        /// Login name
        username: String,
        /// Password for the new account
        #[arg(short, long, env = "STOREFRONT_USER_PASSWORD")]
        password: String,
        /// Email address
        #[arg(short, long, default_value = "")]
        email: String,
        /// Grant staff (admin) rights
        #[arg(long)]
        staff: bool,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Check,
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::CreateUser {
            username,
            password,
            email,
            staff,
        }) => cmd_create_user(cli, username, password, email, *staff).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

async fn cmd_create_user(
    cli: &Cli,
    username: &str,
    password: &str,
    email: &str,
    staff: bool,
) -> Result<()> {
    validate_username(username).map_err(|e| anyhow::anyhow!("Invalid username: {}", e))?;
    validate_email(email).map_err(|e| anyhow::anyhow!("Invalid email: {}", e))?;
    if let Some(problem) = validate_password_strength(password, username) {
        anyhow::bail!("Weak password: {}", problem);
    }

    let config = Config::load(&cli.config)?;
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;
    let pool = db::init(&config).await?;

    if db::find_user_by_username(&pool, username).await?.is_some() {
        anyhow::bail!("User '{}' already exists", username);
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    let user = db::insert_user(&pool, username, email, &password_hash, staff)
        .await
        .context("Failed to create user")?;

    println!(
        "[OK] Created {} '{}' (id {})",
        if user.is_staff { "staff user" } else { "user" },
        user.username,
        user.id
    );
    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    let config = match Config::load(config_path).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            anyhow::bail!("Invalid configuration file");
        }
    };

    println!("[OK] Configuration file is valid!");
    println!();
    println!("=== Configuration Summary ===");
    println!();
    println!("Server:");
    println!("  Address:      {}:{}", config.server.host, config.server.port);
    println!("  Database:     {}", config.database_path().display());
    println!();
    println!("Auth:");
    println!("  Access token:  {}s", config.auth.access_token_lifetime);
    println!("  Refresh token: {}s", config.auth.refresh_token_lifetime);
    println!();
    println!("Throttling:     {}", enabled(config.throttle.enabled));
    let mut rates: Vec<_> = config.throttle.rates.iter().collect();
    rates.sort();
    for (scope, rate) in rates {
        println!("  {:<12} {}", scope, rate);
    }
    println!();
    println!(
        "Cache:          {} (ttl {}s)",
        enabled(config.cache.enabled),
        config.cache.ttl_seconds
    );
    match config.pagination.default_limit {
        Some(limit) => println!("Pagination:     {} per page (max {})", limit, config.pagination.max_limit),
        None => println!("Pagination:     on request (max {})", config.pagination.max_limit),
    }
    println!();

    let mut warnings = Vec::new();
    if config.auth.admin_password.is_some() {
        warnings.push("Bootstrap admin password is stored in the configuration file");
    }
    if config.throttle.enabled && config.throttle.rates.is_empty() {
        warnings.push("Throttling is enabled but no rates are configured");
    }

    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("  [!] {}", warning);
        }
        println!();
    }

    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "Enabled"
    } else {
        "Disabled"
    }
}

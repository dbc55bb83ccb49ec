use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use clubchat_core::config::ClubChatConfig;
use clubchat_core::import;
use clubchat_core::storage::{create_backend, SqliteStorage, StorageBackend};
use owo_colors::OwoColorize;

#[derive(Parser)]
#[command(name = "clubchat", about = "ClubChat: student club catalog tools", version)]
enum Cli {
    /// Load clubs from a CSV file into the store
    Import {
        /// CSV file with a header row (name, description, majors, membership, ...)
        path: String,
    },
    /// Check that the club store opens and answers queries
    Check,
    /// List clubs in the catalog
    Clubs {
        /// Maximum number of clubs to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let config = ClubChatConfig::load(Some(&std::env::current_dir()?))
        .context("failed to load configuration")?;

    run(cli, &config).await
}

async fn run(cli: Cli, config: &ClubChatConfig) -> Result<()> {
    match cli {
        Cli::Import { path } => {
            let storage = make_storage(config)?;
            cmd_import(&storage, &path).await
        }
        Cli::Check => cmd_check(config).await,
        Cli::Clubs { limit, json } => {
            let storage = make_storage(config)?;
            cmd_clubs(&storage, limit, json).await
        }
    }
}

fn make_storage(config: &ClubChatConfig) -> Result<SqliteStorage> {
    create_backend(config).context("failed to open club store")
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

async fn cmd_import(storage: &SqliteStorage, path: &str) -> Result<()> {
    if !Path::new(path).exists() {
        anyhow::bail!("file not found: {}", path);
    }

    let report = import::import_csv_file(storage, Path::new(path))
        .await
        .with_context(|| format!("failed to import {path}"))?;

    if report.skipped_empty > 0 {
        println!("Skipped {} rows without a club name", report.skipped_empty);
    }
    if report.skipped_invalid > 0 {
        println!(
            "Skipped {} rows with an invalid club name",
            report.skipped_invalid
        );
    }
    if report.skipped_duplicates > 0 {
        println!(
            "Skipped {} clubs that already exist",
            report.skipped_duplicates
        );
    }
    println!(
        "{} Imported {} clubs from {}",
        "✓".green(),
        report.imported,
        path
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

async fn cmd_check(config: &ClubChatConfig) -> Result<()> {
    println!("{}", "ClubChat store check".bold());

    let storage = match create_backend(config) {
        Ok(s) => s,
        Err(e) => {
            println!("  {}   {} - {}", "Store:".dimmed(), "unavailable".red(), e);
            anyhow::bail!("store check failed");
        }
    };
    println!(
        "  {}   {} ({})",
        "Store:".dimmed(),
        "opened".green(),
        storage.path().display()
    );

    match storage.count_clubs().await {
        Ok(n) => {
            println!("  {}   {}", "Clubs:".dimmed(), n);
            if n == 0 {
                println!(
                    "\n{} The catalog is empty. Load it with: clubchat import <file.csv>",
                    "!".yellow()
                );
            }
        }
        Err(e) => {
            println!("  {}   {} - {}", "Clubs:".dimmed(), "query failed".red(), e);
            anyhow::bail!("store check failed");
        }
    }

    let secret = if config.auth.require_secret().is_ok() {
        "set".green().to_string()
    } else {
        "missing (set JWT_SECRET_KEY)".yellow().to_string()
    };
    println!("  {}  {}", "Secret:".dimmed(), secret);

    println!("\n{} Store is working.", "✓".green());
    Ok(())
}

// ---------------------------------------------------------------------------
// clubs
// ---------------------------------------------------------------------------

async fn cmd_clubs(storage: &SqliteStorage, limit: Option<usize>, json: bool) -> Result<()> {
    let clubs = storage
        .list_clubs(limit)
        .await
        .context("failed to list clubs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&clubs)?);
        return Ok(());
    }

    if clubs.is_empty() {
        println!("No clubs in the catalog.");
        return Ok(());
    }

    for club in &clubs {
        let majors = if club.majors.is_empty() {
            String::new()
        } else {
            format!("  [{}]", club.majors)
        };
        println!("{}{}", club.name.bold(), majors.dimmed());
        if !club.description.is_empty() {
            println!("    {}", truncate(&club.description, 100));
        }
    }
    println!("\n{} clubs", clubs.len());
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stt_cli::commands::{record, stats, types};
use stt_cli::{Cli, Commands, Config, TypesAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(stt_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = stt_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Types(action)) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            match action {
                TypesAction::Add { name, categories } => types::add(&mut db, name, categories)?,
                TypesAction::List { json } => types::list(&db, *json)?,
                TypesAction::Remove { name } => types::remove(&db, name)?,
            }
        }
        Some(Commands::Add {
            type_name,
            from,
            to,
            comment,
            tags,
        }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            record::add(&mut db, type_name, from, to, comment, tags)?;
        }
        Some(Commands::Start {
            type_name,
            at,
            comment,
            tags,
        }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            record::start(&mut db, type_name, at.as_deref(), comment, tags)?;
        }
        Some(Commands::Stop { type_name, at }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            record::stop(&mut db, type_name, at.as_deref())?;
        }
        Some(Commands::Stats(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            stats::run(db, &config, args)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

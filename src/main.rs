mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use previewar_core::Settings;

use cli::{CacheAction, Cli, Command, ConfigAction, KeyAction};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON results, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let use_cache = !cli.global.no_cache;
    // Loaded only by the commands that use it, so `key`, `cache` and
    // `config init` still run when the settings file is broken.
    let settings = || load_settings(&cli);

    match &cli.command {
        Command::Identify { url } => commands::product::identify(&settings()?, url).await,
        Command::Scrape { url, company, .. } => {
            commands::product::scrape(&settings()?, url, company.as_deref()).await
        }
        Command::Select {
            url,
            print_scrape,
            out,
            ..
        } => {
            commands::product::select(&settings()?, url, use_cache, *print_scrape, out.clone()).await
        }
        Command::Prompt { url } => commands::product::prompt(&settings()?, url, use_cache).await,
        Command::Key { action } => match action {
            KeyAction::Set { provider, key } => commands::keys::set(*provider, key),
            KeyAction::Delete { provider } => commands::keys::delete(*provider),
            KeyAction::Status => commands::keys::status(),
        },
        Command::Cache {
            action: CacheAction::Clear { all },
        } => commands::cache::clear(*all).await,
        Command::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&settings()?),
            ConfigAction::Init { force } => commands::config::init(cli.global.config.as_deref(), *force),
        },
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.global.config.as_deref()).context(
        "Could not load settings; `previewar config init --force` rewrites the file with defaults",
    )?;
    cli.apply_overrides(&mut settings)?;
    Ok(settings)
}

mod api;
mod app;
mod cache;
mod cli;
mod config;
mod db;
mod event;
mod logging;
mod notify;
mod prefs;
mod queries;
mod query;
mod session;
mod state;
mod views;

use clap::Parser;
use color_eyre::Result;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let cli = cli::Cli::parse();

  // Logs go to a file; keep the guard until exit so they get flushed
  let _guard = logging::init(&db::LocalStore::data_dir()?.join("logs"))?;

  // Load configuration
  let config = config::Config::load(cli.config.as_deref())?;

  let mut app = app::App::new(config, cli.ephemeral, cli.json)?;
  app.run(cli.command).await
}

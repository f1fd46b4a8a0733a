//! # rpcdeck CLI Entry Point
//!
//! The interactive shell around `rpcdeck_core`. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and opens the saved
//!    workspace store.
//! 2. **Connection**: Connects to `--address`, or restores the last successful connection.
//! 3. **Execution**: Hands standard input to the [`shell`] until `quit`, end of input or Ctrl-C.
//! 4. **Presentation**: Prints every engine event as it arrives.

mod cli;
mod formatter;
mod shell;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use directories::ProjectDirs;
use formatter::{FormattedString, GenericError};
use rpcdeck_core::store::FileStore;
use rpcdeck_core::{Engine, Event};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rpcdeck=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let store = FileStore::new(data_dir(&args)?);
    let (events, mut receiver) = mpsc::unbounded_channel::<Event>();
    let engine = Engine::new(Arc::new(store), Arc::new(events));

    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            println!("{}", FormattedString::from(event));
        }
    });

    let options = match &args.address {
        Some(address) => Some(args.connection_options(address.clone())),
        None => engine
            .get_saved_options()
            .await
            .context("Failed to read the saved workspace")?,
    };

    match options {
        Some(options) => {
            if let Err(err) = engine.connect(options).await {
                eprintln!("{}", FormattedString::from(GenericError("Connect failed", err)));
            }
        }
        None => println!("Not connected. Type 'connect <address>' or 'help'."),
    }

    tokio::select! {
        result = shell::run(engine.clone(), &args) => result.context("Failed to read input")?,
        _ = tokio::signal::ctrl_c() => {}
    }

    engine.close().await.context("Failed to close the session")?;
    drop(engine);
    printer.abort();

    Ok(())
}

fn data_dir(args: &Cli) -> anyhow::Result<PathBuf> {
    match &args.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => ProjectDirs::from("com", "rpcdeck", "rpcdeck")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .context("Could not determine a config directory, pass --data-dir"),
    }
}

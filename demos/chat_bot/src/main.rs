//! Chat Bot Demo
//!
//! Runs a Kindred bot with three demo plugins and the builtin `plugins` admin
//! plugin:
//!
//! | command | plugin |
//! |---------|--------|
//! | `!ping` | ping |
//! | `!echo <text>` | echo |
//! | `!count` | counter |
//! | `!plugins`, `!load`, `!unload`, `!reload` | plugins (admins only) |
//!
//! # Usage
//!
//! ```bash
//! KINDRED_IRC__ENABLED=true KINDRED_IRC__TOKEN=oauth:xxxx \
//!     cargo run --package chat-bot -- --config demos/chat_bot/kindred.toml
//! ```

mod plugins;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use kindred::prelude::*;
use tracing::info;

/// Command line options.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file; searched for as `kindred.toml` when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production` loads `kindred.production.toml`.
    #[arg(short, long)]
    profile: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = KindredRuntime::builder()
        .plugin(plugins::ping())
        .plugin(plugins::echo())
        .plugin(plugins::counter());
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &cli.profile {
        builder = builder.profile(profile);
    }

    let runtime = builder.build()?;
    info!(
        irc = runtime.config().irc.enabled,
        webhook = runtime.config().webhook.enabled,
        "Chat bot starting. Press Ctrl+C to stop."
    );

    runtime.run().await?;
    Ok(())
}

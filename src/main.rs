//! yadro server binary.
//!
//! Boots the kernel with the sample handlers from [`yadro::demo`] and serves
//! until SIGINT/SIGTERM. With `--config` the file is watched and reloaded.

use std::path::PathBuf;

use clap::Parser;

use yadro::lifecycle::startup;
use yadro::{demo, Components};

#[derive(Parser)]
#[command(name = "yadro")]
#[command(about = "Routing and middleware pipeline kernel", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    startup::run(cli.config.as_deref(), Components::new(demo::registry())).await?;
    Ok(())
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PrintView CLI - inspect models, the asset cache and hardware profiles
//! from a terminal.
//!
//! # Commands
//!
//! - `printview load <file>` - decode a local STL/OBJ and build its LOD ladder
//! - `printview fetch <url> --id <id>` - download through the cache like the viewer does
//! - `printview cache stats|clear|evict|purge|remove` - manage the asset cache
//! - `printview profile <report.json>` - classify a captured hardware report
//! - `printview config` - print the effective engine configuration

mod commands;

use clap::{Parser, Subcommand};
use printview_engine::EngineConfig;
use std::path::PathBuf;

use commands::cache::CacheCommand;

/// PrintView - adaptive 3D model viewer toolkit
#[derive(Parser, Debug)]
#[command(name = "printview", author, version, about)]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// JSON configuration file; defaults to PRINTVIEW_* environment variables
    #[arg(short, long, global = true, env = "PRINTVIEW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a local model file and build its levels of detail
    Load {
        /// Path to an .stl or .obj file
        file: PathBuf,

        /// Format override when the extension is missing or wrong
        #[arg(short, long)]
        format: Option<String>,

        /// Store the file in the asset cache under this id
        #[arg(long)]
        cache_id: Option<String>,

        /// Build coarser levels by stride sampling instead of edge collapse
        #[arg(long)]
        stride: bool,
    },

    /// Load a model over HTTP through the cache, with progressive previews
    Fetch {
        /// Model URL
        url: String,

        /// Cache key; omit to bypass the cache
        #[arg(long, default_value = "")]
        id: String,

        /// Format override when the URL has no extension
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Manage the asset cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Classify a hardware report captured by the viewer
    Profile {
        /// JSON report (webglVersion, benchmarkFps, userAgent, screen, ...)
        report: PathBuf,
    },

    /// Print the effective engine configuration as JSON
    Config,
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("{},hyper=warn,reqwest=warn,sqlx=warn", level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_file(path)?),
        None => Ok(EngineConfig::from_env()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = load_config(args.config.as_ref())?;
    tracing::debug!(?config, "Configuration loaded");

    match args.command {
        Command::Load {
            file,
            format,
            cache_id,
            stride,
        } => commands::model::load(&config, &file, format.as_deref(), cache_id.as_deref(), stride).await,
        Command::Fetch { url, id, format } => {
            commands::model::fetch(&config, &url, &id, format.as_deref()).await
        }
        Command::Cache { command } => commands::cache::run(&config, command).await,
        Command::Profile { report } => commands::profile::run(&config, &report).await,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

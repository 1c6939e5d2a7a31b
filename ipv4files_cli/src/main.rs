use anyhow::Result;
use clap::{Parser, Subcommand};
use ipv4files_core::config::{
    AppConfig, WireFormat, default_client_config, default_server_config,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod menu;
mod progress;

/// Serve a folder over TCP or download from one
#[derive(Parser)]
#[command(name = "ipv4files", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Share a folder, one client at a time
    Serve {
        /// Folder whose entries are offered (defaults to the saved one)
        #[arg(short, long)]
        folder: Option<PathBuf>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Unframed control messages, for peers without length prefixes
        #[arg(long)]
        legacy: bool,
    },
    /// Download one entry from a server
    Fetch {
        /// Server as host:port (defaults to the saved one)
        #[arg(short, long)]
        server: Option<String>,
        /// Entry name, or #N for the N-th catalog entry
        entry: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        legacy: bool,
    },
    /// Show where the configuration lives and what it holds
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let saved = AppConfig::load();

    match cli.command {
        None => menu::run().await,
        Some(Command::Serve {
            folder,
            port,
            legacy,
        }) => {
            let mut config = saved.server.unwrap_or_else(default_server_config);
            if let Some(folder) = folder {
                config.shared_folder = folder;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if legacy {
                config.wire_format = WireFormat::Legacy;
            }
            commands::serve(config).await
        }
        Some(Command::Fetch {
            server,
            entry,
            output,
            legacy,
        }) => {
            let mut config = saved.client.unwrap_or_else(default_client_config);
            if let Some(server) = server {
                config.server_addr = server;
            }
            if let Some(output) = output {
                config.download_folder = output;
            }
            if legacy {
                config.wire_format = WireFormat::Legacy;
            }

            let session = commands::connect(&config).await?;
            let index = commands::resolve(session.catalog(), &commands::parse_selection(&entry))?;
            let report = commands::download(session, index, &config).await?;
            if !report.verified() {
                std::process::exit(2);
            }
            Ok(())
        }
        Some(Command::Config) => {
            match AppConfig::config_path() {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No config directory available"),
            }
            println!("{:#?}", saved);
            Ok(())
        }
    }
}


//! Interactive console.

use anyhow::Result;
use ipv4files_core::config::{
    AppConfig, ClientConfig, ServerConfig, WireFormat, default_client_config,
    default_server_config,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use crate::commands;

type Input = Lines<BufReader<Stdin>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Main,
    Server,
    Client,
    EditConfig,
    Exit,
}

pub async fn run() -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut state = MenuState::Main;

    while state != MenuState::Exit {
        state = match state {
            MenuState::Main => main_menu(&mut input).await?,
            MenuState::Server => {
                let config = server_config(&mut input).await?;
                if let Err(e) = commands::serve(config).await {
                    println!("Server stopped: {:#}", e);
                }
                MenuState::Main
            }
            MenuState::Client => {
                let config = client_config(&mut input).await?;
                if let Err(e) = fetch(&mut input, &config).await {
                    println!("Client error: {:#}", e);
                    prompt(&mut input, "Press Enter to continue").await?;
                }
                MenuState::Main
            }
            MenuState::EditConfig => {
                edit_config(&mut input).await?;
                MenuState::Main
            }
            MenuState::Exit => MenuState::Exit,
        };
    }

    Ok(())
}

/// Print `text` and read one trimmed line; `None` on end of input
async fn prompt(input: &mut Input, text: &str) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{} ", text).as_bytes()).await?;
    stdout.flush().await?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}

async fn main_menu(input: &mut Input) -> Result<MenuState> {
    println!("===============");
    println!("ipv4files {}", env!("CARGO_PKG_VERSION"));
    println!("===============");
    println!("  [0] Server (send)");
    println!("  [1] Client (receive)");
    println!("  [2] Edit configuration");
    println!("  [q] Quit");

    Ok(match prompt(input, ">").await?.as_deref() {
        None | Some("q") => MenuState::Exit,
        Some("0") => MenuState::Server,
        Some("1") => MenuState::Client,
        Some("2") => MenuState::EditConfig,
        Some(other) => {
            println!("Invalid choice '{}', try again", other);
            MenuState::Main
        }
    })
}

/// Saved server settings, asked for on first use
async fn server_config(input: &mut Input) -> Result<ServerConfig> {
    let mut app = AppConfig::load();
    if let Some(server) = app.server.clone() {
        println!("Path: {}", server.shared_folder.display());
        println!("Port: {}", server.port);
        return Ok(server);
    }

    let server = ask_server(input, default_server_config()).await?;
    app.server = Some(server.clone());
    save(&app);
    Ok(server)
}

async fn client_config(input: &mut Input) -> Result<ClientConfig> {
    let mut app = AppConfig::load();
    if let Some(client) = app.client.clone() {
        println!("Server: {}", client.server_addr);
        println!("Download folder: {}", client.download_folder.display());
        return Ok(client);
    }

    let client = ask_client(input, default_client_config()).await?;
    app.client = Some(client.clone());
    save(&app);
    Ok(client)
}

async fn fetch(input: &mut Input, config: &ClientConfig) -> Result<()> {
    let session = commands::connect(config).await?;

    let index = loop {
        let Some(answer) = prompt(input, "Number of the entry to download:").await? else {
            return Ok(());
        };
        match answer.parse::<usize>() {
            Ok(index) if index < session.catalog().len() => break index,
            _ => println!("Invalid number, try again"),
        }
    };

    commands::download(session, index, config).await?;
    Ok(())
}

async fn edit_config(input: &mut Input) -> Result<()> {
    println!("  [0] Server configuration");
    println!("  [1] Client configuration");

    let mut app = AppConfig::load();
    match prompt(input, ">").await?.as_deref() {
        Some("0") => {
            let current = app.server.clone().unwrap_or_else(default_server_config);
            app.server = Some(ask_server(input, current).await?);
        }
        Some("1") => {
            let current = app.client.clone().unwrap_or_else(default_client_config);
            app.client = Some(ask_client(input, current).await?);
        }
        _ => {
            println!("Invalid choice");
            return Ok(());
        }
    }

    save(&app);
    println!("Configuration updated");
    Ok(())
}

/// Blank answers keep the current value
async fn ask_server(input: &mut Input, mut config: ServerConfig) -> Result<ServerConfig> {
    if let Some(port) = ask(input, "Server port", &config.port.to_string()).await? {
        match port.parse() {
            Ok(port) => config.port = port,
            Err(_) => println!("'{}' is not a port, keeping {}", port, config.port),
        }
    }
    if let Some(folder) = ask(
        input,
        "Shared folder",
        &config.shared_folder.display().to_string(),
    )
    .await?
    {
        config.shared_folder = PathBuf::from(folder);
    }
    config.wire_format = ask_format(input, config.wire_format).await?;
    Ok(config)
}

async fn ask_client(input: &mut Input, mut config: ClientConfig) -> Result<ClientConfig> {
    if let Some(addr) = ask(input, "Server address (host:port)", &config.server_addr).await? {
        config.server_addr = addr;
    }
    if let Some(folder) = ask(
        input,
        "Download folder",
        &config.download_folder.display().to_string(),
    )
    .await?
    {
        config.download_folder = PathBuf::from(folder);
    }
    config.wire_format = ask_format(input, config.wire_format).await?;
    Ok(config)
}

async fn ask_format(input: &mut Input, current: WireFormat) -> Result<WireFormat> {
    let current_name = match current {
        WireFormat::Legacy => "legacy",
        WireFormat::Framed => "framed",
    };
    Ok(match ask(input, "Wire format (legacy/framed)", current_name).await?.as_deref() {
        Some("legacy") => WireFormat::Legacy,
        Some("framed") => WireFormat::Framed,
        Some(other) => {
            println!("Unknown format '{}', keeping {}", other, current_name);
            current
        }
        None => current,
    })
}

async fn ask(input: &mut Input, label: &str, current: &str) -> Result<Option<String>> {
    let answer = prompt(input, &format!("{} [{}]:", label, current)).await?;
    Ok(answer.filter(|value| !value.is_empty()))
}

fn save(app: &AppConfig) {
    if let Err(e) = app.save() {
        tracing::warn!("Configuration not saved: {:#}", e);
    }
}

use anyhow::{Context, Result, bail};
use ipv4files_core::AppEvent;
use ipv4files_core::config::{ClientConfig, ServerConfig};
use ipv4files_core::transfer::{ClientSession, Listener, TransferReport};
use tokio::sync::mpsc;
use tracing::info;

use crate::progress;

/// Event channel capacity; progress is dropped rather than stalling a transfer
const EVENT_CAPACITY: usize = 1000;

/// Which catalog entry to download
pub enum Selection {
    Name(String),
    Index(usize),
}

/// Run the listener until Ctrl-C
pub async fn serve(config: ServerConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.shared_folder)
        .await
        .with_context(|| format!("Cannot create {}", config.shared_folder.display()))?;
    println!("Sharing {}", config.shared_folder.display());

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(EVENT_CAPACITY);
    let listener = Listener::bind(config).await?.with_events(event_tx);
    println!(
        "Listening on {} (Ctrl-C stops after the current session)",
        listener.local_addr()
    );

    let shutdown = listener.shutdown_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            shutdown.cancel();
        }
    });
    let renderer = tokio::spawn(progress::render(event_rx));

    let result = listener.run().await;
    ctrl_c.abort();
    let _ = renderer.await;
    result
}

/// Connect and print the server catalog
pub async fn connect(config: &ClientConfig) -> Result<ClientSession> {
    let session = ClientSession::connect(&config.server_addr, config.wire_format)
        .await
        .with_context(|| format!("Cannot reach {}", config.server_addr))?;

    println!("Server files:");
    for (index, entry) in session.catalog().iter().enumerate() {
        println!("  [{}] {}", index, entry);
    }
    if session.catalog().is_empty() {
        bail!("The server shares nothing");
    }
    Ok(session)
}

/// Catalog index for a selection given on the command line
pub fn resolve(catalog: &[String], selection: &Selection) -> Result<usize> {
    match selection {
        Selection::Index(index) if *index < catalog.len() => Ok(*index),
        Selection::Index(index) => bail!("No entry [{}] in the server catalog", index),
        Selection::Name(name) => catalog
            .iter()
            .position(|entry| entry == name)
            .with_context(|| format!("'{}' is not in the server catalog", name)),
    }
}

/// Download catalog entry `index` into the configured folder
pub async fn download(
    session: ClientSession,
    index: usize,
    config: &ClientConfig,
) -> Result<TransferReport> {
    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(EVENT_CAPACITY);
    let renderer = tokio::spawn(progress::render(event_rx));
    let outcome = session
        .download(index, &config.download_folder, &Some(event_tx))
        .await;
    let _ = renderer.await;

    let report = outcome.context("Download failed")?;
    println!(
        "Saved {} ({}, {} bytes) to {}",
        report.entry,
        report.descriptor.mode,
        report.bytes_received,
        report.descriptor.destination_path.display()
    );
    if !report.verified() {
        println!("Warning: the received data does not match the server's SHA-1");
    }
    Ok(report)
}

/// Parse `NAME` or `#INDEX`
pub fn parse_selection(raw: &str) -> Selection {
    match raw.strip_prefix('#').map(str::parse::<usize>) {
        Some(Ok(index)) => Selection::Index(index),
        _ => Selection::Name(raw.to_string()),
    }
}

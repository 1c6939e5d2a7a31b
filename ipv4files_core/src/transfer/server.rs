use crate::config::ServerConfig;
use crate::error::{Result, TransferError};
use crate::{AppEvent, TransferMode};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

use super::archive::{ArchiveArtifact, pack_directory};
use super::catalog::list_entries;
use super::hash::digest_file;
use super::protocol::Channel;
use super::stream::send_payload;
use super::utils::{EventSender, emit, validate_entry_name};

/// Server-side lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    ListingSent,
    AwaitingSelection,
    ModeDecided,
    Streaming,
    DigestSent,
    Closed,
}

impl SessionState {
    /// The only state reachable from `self`
    pub fn next(self) -> Option<SessionState> {
        use SessionState::*;
        match self {
            Accepted => Some(ListingSent),
            ListingSent => Some(AwaitingSelection),
            AwaitingSelection => Some(ModeDecided),
            ModeDecided => Some(Streaming),
            Streaming => Some(DigestSent),
            DigestSent => Some(Closed),
            Closed => None,
        }
    }
}

/// What a completed session sent
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub peer: SocketAddr,
    pub entry: String,
    pub mode: TransferMode,
    pub declared_size: u64,
    /// Shared entry the payload was produced from
    pub source_path: PathBuf,
    pub digest: String,
}

struct Session<S> {
    channel: Channel<S>,
    peer: SocketAddr,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn advance(&mut self, next: SessionState) {
        debug_assert_eq!(self.state.next(), Some(next));
        tracing::debug!("[{}] {:?} -> {:?}", self.peer, self.state, next);
        self.state = next;
    }
}

/// Drive one accepted connection from catalog to digest
///
/// A ZIP artifact created for the session is removed on every exit path.
pub async fn run_session<S>(
    stream: S,
    peer: SocketAddr,
    config: &ServerConfig,
    event_tx: &EventSender,
) -> Result<SessionSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session {
        channel: Channel::new(stream, config.wire_format),
        peer,
        state: SessionState::Accepted,
    };

    let entries = list_entries(&config.shared_folder).await?;
    session.channel.send_catalog(&entries).await?;
    tracing::info!("[{}] Catalog sent ({} entries)", peer, entries.len());
    session.advance(SessionState::ListingSent);

    session.advance(SessionState::AwaitingSelection);
    let entry = session.channel.recv_selection().await?;
    validate_entry_name(&entry)?;
    let source = config.shared_folder.join(&entry);

    let metadata = match tokio::fs::metadata(&source).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::EntryNotFound(source));
        }
        Err(e) => return Err(e.into()),
    };

    let mut artifact: Option<ArchiveArtifact> = None;
    let (mode, payload_path, declared_size) = if metadata.is_dir() {
        tracing::info!("[{}] Download mode: ZIP ({})", peer, entry);
        let packed = pack_directory(&source, &config.staging_dir(), event_tx).await?;
        let size = packed.size().await?;
        let path = packed.path().to_path_buf();
        artifact = Some(packed);
        (TransferMode::Zip, path, size)
    } else if metadata.is_file() {
        tracing::info!("[{}] Download mode: FILE ({})", peer, entry);
        (TransferMode::File, source.clone(), metadata.len())
    } else {
        return Err(TransferError::InvalidSelection(format!(
            "'{}' is neither a file nor a directory",
            entry
        )));
    };

    session.channel.send_header(mode, declared_size).await?;
    session.advance(SessionState::ModeDecided);

    session.advance(SessionState::Streaming);
    send_payload(
        session.channel.payload_writer(),
        &payload_path,
        declared_size,
        event_tx,
        &entry,
    )
    .await?;
    tracing::info!("[{}] Sent {} bytes of {}", peer, declared_size, entry);

    let digest = digest_file(&payload_path).await?;
    session.channel.send_digest(&digest).await?;
    session.advance(SessionState::DigestSent);
    tracing::info!("[{}] SHA-1 sent: {}", peer, digest);
    emit(
        event_tx,
        AppEvent::DigestSent {
            file_name: entry.clone(),
            digest: digest.clone(),
        },
    );

    if let Err(e) = session.channel.shutdown().await {
        tracing::debug!("[{}] Shutdown after transfer: {}", peer, e);
    }
    drop(artifact);
    session.advance(SessionState::Closed);

    Ok(SessionSummary {
        peer,
        entry,
        mode,
        declared_size,
        source_path: source,
        digest,
    })
}

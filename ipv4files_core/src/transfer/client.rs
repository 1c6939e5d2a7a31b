use crate::config::WireFormat;
use crate::error::{Result, TransferError};
use crate::{AppEvent, TransferDescriptor, TransferMode};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, warn};

use super::archive::unpack_archive;
use super::hash::{ChecksumRecord, IntegrityVerifier};
use super::protocol::Channel;
use super::stream::receive_payload;
use super::utils::{EventSender, emit, unique_destination, validate_entry_name};

/// Outcome of one download
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub entry: String,
    /// `destination_path` is the file (FILE) or directory root (ZIP)
    pub descriptor: TransferDescriptor,
    pub bytes_received: u64,
    /// Final locations of every written file
    pub placed_files: Vec<PathBuf>,
    pub checksum: ChecksumRecord,
}

impl TransferReport {
    pub fn verified(&self) -> bool {
        self.checksum.is_match()
    }
}

/// Client side of a session, positioned right after the catalog
pub struct ClientSession<S = TcpStream> {
    channel: Channel<S>,
    catalog: Vec<String>,
}

impl ClientSession<TcpStream> {
    /// Connect to `host:port` and receive the catalog
    pub async fn connect(server_addr: &str, format: WireFormat) -> Result<Self> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to server {}", server_addr);

        Self::from_stream(stream, format).await
    }
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Start a session over an already connected stream
    pub async fn from_stream(stream: S, format: WireFormat) -> Result<Self> {
        let mut channel = Channel::new(stream, format);
        let catalog = channel.recv_catalog().await?;
        info!("Server catalog: {} entries", catalog.len());

        Ok(Self {
            channel,
            catalog,
        })
    }

    /// Entry names published by the server, in its listing order
    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    /// Request catalog entry `index` and place it under `download_folder`
    ///
    /// A digest mismatch is reported in the returned checksum record; the
    /// downloaded files are kept either way.
    pub async fn download(
        mut self,
        index: usize,
        download_folder: &Path,
        event_tx: &EventSender,
    ) -> Result<TransferReport> {
        let entry = self.catalog.get(index).cloned().ok_or_else(|| {
            TransferError::InvalidSelection(format!(
                "index {} outside catalog of {} entries",
                index,
                self.catalog.len()
            ))
        })?;
        // Server-provided names become local paths
        validate_entry_name(&entry)?;
        tokio::fs::create_dir_all(download_folder).await?;

        self.channel.send_selection(&entry).await?;
        let (mode, declared_size) = self.channel.recv_header().await?;
        info!("Download mode: {} ({} bytes)", mode, declared_size);

        // FILE lands at its final place, ZIP in a staging dir next to it
        let staging = match mode {
            TransferMode::File => None,
            TransferMode::Zip => Some(
                tempfile::Builder::new()
                    .prefix(".ipv4files-")
                    .tempdir_in(download_folder)?,
            ),
        };
        let payload_path = match &staging {
            Some(dir) => dir.path().join(format!("{}.zip", entry)),
            None => unique_destination(&download_folder.join(&entry)).await?,
        };

        let mut file = File::create(&payload_path).await?;
        let mut verifier = IntegrityVerifier::new();
        let received = receive_payload(
            self.channel.payload_reader(),
            declared_size,
            &mut file,
            &mut verifier,
            event_tx,
            &entry,
        )
        .await?;
        drop(file);
        emit(event_tx, AppEvent::TransferCompleted(entry.clone()));

        let sender_digest = self.channel.recv_digest().await?;
        let checksum = ChecksumRecord {
            sender_digest,
            receiver_digest: verifier.finalize(),
        };
        report_checksum(&entry, &checksum, event_tx);

        if let Err(e) = self.channel.shutdown().await {
            tracing::debug!("Shutdown after download: {}", e);
        }

        let (destination, placed_files) = match staging {
            None => {
                emit(
                    event_tx,
                    AppEvent::FilePlaced {
                        path: payload_path.clone(),
                        renamed: payload_path != download_folder.join(&entry),
                    },
                );
                (payload_path.clone(), vec![payload_path])
            }
            Some(staging) => {
                let extract_root = staging.path().join("extract");
                match unpack_archive(&payload_path, &extract_root).await {
                    Ok(extracted) => {
                        let destination = directory_root(download_folder, &entry).await?;
                        let placed =
                            place_extracted(&extract_root, &extracted, &destination, event_tx)
                                .await?;
                        (destination, placed)
                    }
                    Err(source) => {
                        let archive =
                            keep_archive(&payload_path, download_folder, &entry, event_tx).await?;
                        return Err(TransferError::ArchiveKept {
                            archive,
                            checksum,
                            source: Box::new(source),
                        });
                    }
                }
            }
        };

        Ok(TransferReport {
            descriptor: TransferDescriptor {
                mode,
                declared_size,
                source_path: PathBuf::from(&entry),
                destination_path: destination,
            },
            entry,
            bytes_received: received,
            placed_files,
            checksum,
        })
    }
}

/// Move an archive that failed to unpack out of staging as `<entry>.zip`
async fn keep_archive(
    staged: &Path,
    download_folder: &Path,
    entry: &str,
    event_tx: &EventSender,
) -> Result<PathBuf> {
    let wanted = download_folder.join(format!("{}.zip", entry));
    let kept = unique_destination(&wanted).await?;
    tokio::fs::rename(staged, &kept).await?;
    warn!("Could not unpack {}, archive kept at {}", entry, kept.display());
    emit(
        event_tx,
        AppEvent::FilePlaced {
            path: kept.clone(),
            renamed: kept != wanted,
        },
    );
    Ok(kept)
}

/// Root directory for an unpacked entry; a file in the way forces a suffix
async fn directory_root(download_folder: &Path, entry: &str) -> Result<PathBuf> {
    let root = download_folder.join(entry);
    match tokio::fs::metadata(&root).await {
        Ok(m) if !m.is_dir() => unique_destination(&root).await,
        _ => Ok(root),
    }
}

/// Move every extracted file below `destination`, resolving collisions per file
async fn place_extracted(
    extract_root: &Path,
    extracted: &[PathBuf],
    destination: &Path,
    event_tx: &EventSender,
) -> Result<Vec<PathBuf>> {
    for relative in extracted {
        if let Some(parent) = destination.join(relative).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut placed = Vec::with_capacity(extracted.len());
    for relative in extracted {
        let wanted = destination.join(relative);
        let target = unique_destination(&wanted).await?;
        if target != wanted {
            info!(
                "'{}' already exists, renamed to '{}'",
                wanted.display(),
                target.display()
            );
        }

        tokio::fs::rename(extract_root.join(relative), &target).await?;
        emit(
            event_tx,
            AppEvent::FilePlaced {
                path: target.clone(),
                renamed: target != wanted,
            },
        );
        placed.push(target);
    }

    Ok(placed)
}

fn report_checksum(entry: &str, checksum: &ChecksumRecord, event_tx: &EventSender) {
    if checksum.is_match() {
        info!("Integrity check passed for {}: {}", entry, checksum.receiver_digest);
        emit(
            event_tx,
            AppEvent::ChecksumVerified {
                file_name: entry.to_string(),
                digest: checksum.receiver_digest.clone(),
            },
        );
    } else {
        warn!(
            "Integrity check FAILED for {}: server {} / client {}",
            entry, checksum.sender_digest, checksum.receiver_digest
        );
        emit(
            event_tx,
            AppEvent::ChecksumMismatch {
                file_name: entry.to_string(),
                sender_digest: checksum.sender_digest.clone(),
                receiver_digest: checksum.receiver_digest.clone(),
            },
        );
    }
}

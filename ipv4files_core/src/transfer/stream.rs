//! Fixed-block payload streaming.
//!
//! Send and receive sides use different block sizes; only the total length
//! is part of the wire contract.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::{PROGRESS_INTERVAL, RECV_BLOCK_SIZE, SEND_BLOCK_SIZE};
use super::hash::IntegrityVerifier;
use super::utils::{EventSender, report_progress};
use crate::error::{Result, TransferError};

/// Map a socket error to `ConnectionLost` when the peer went away
fn peer_error(e: std::io::Error, received: u64, expected: u64) -> TransferError {
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => TransferError::ConnectionLost { received, expected },
        _ => TransferError::Io(e),
    }
}

/// Send exactly `total_size` bytes of `path` to `conn`
pub async fn send_payload<W>(
    conn: &mut W,
    path: &Path,
    total_size: u64,
    event_tx: &EventSender,
    label: &str,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut file = File::open(path).await?;
    let mut buffer = vec![0u8; SEND_BLOCK_SIZE];
    let mut sent: u64 = 0;
    let start_time = Instant::now();
    let mut last_progress_update = 0u64;

    while sent < total_size {
        let to_read = std::cmp::min(SEND_BLOCK_SIZE as u64, total_size - sent) as usize;
        let n = file.read(&mut buffer[..to_read]).await?;
        if n == 0 {
            return Err(TransferError::SourceChanged {
                path: path.to_path_buf(),
                expected: total_size,
                actual: sent,
            });
        }

        conn.write_all(&buffer[..n])
            .await
            .map_err(|e| peer_error(e, sent, total_size))?;
        sent += n as u64;

        if sent == total_size || sent - last_progress_update >= PROGRESS_INTERVAL {
            last_progress_update = sent;
            report_progress(event_tx, label, sent, total_size, start_time, true);
        }
    }

    conn.flush()
        .await
        .map_err(|e| peer_error(e, sent, total_size))?;
    Ok(sent)
}

/// Receive exactly `total_size` bytes from `conn` into `sink`
///
/// Every block is fed to `verifier` before the next read. A zero-length
/// read before the end fails with `ConnectionLost`; bytes already written
/// to `sink` stay there.
pub async fn receive_payload<R, W>(
    conn: &mut R,
    total_size: u64,
    sink: &mut W,
    verifier: &mut IntegrityVerifier,
    event_tx: &EventSender,
    label: &str,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; RECV_BLOCK_SIZE];
    let mut received: u64 = 0;
    let start_time = Instant::now();
    let mut last_progress_update = 0u64;

    while received < total_size {
        let to_read = std::cmp::min(RECV_BLOCK_SIZE as u64, total_size - received) as usize;
        let n = conn
            .read(&mut buffer[..to_read])
            .await
            .map_err(|e| peer_error(e, received, total_size))?;

        if n == 0 {
            tracing::error!(
                "Stream closed early: received {}/{} bytes",
                received,
                total_size
            );
            sink.flush().await?;
            return Err(TransferError::ConnectionLost {
                received,
                expected: total_size,
            });
        }

        sink.write_all(&buffer[..n]).await?;
        verifier.update(&buffer[..n]);
        received += n as u64;

        if received == total_size || received - last_progress_update >= PROGRESS_INTERVAL {
            last_progress_update = received;
            report_progress(event_tx, label, received, total_size, start_time, false);
        }
    }

    sink.flush().await?;
    debug_assert_eq!(verifier.bytes(), received);
    Ok(received)
}

//! Control messages of a session.
//!
//! Message order is fixed: catalog, selection, mode, size, payload, digest.
//! `WireFormat::Legacy` writes them unframed exactly like existing peers
//! expect; `WireFormat::Framed` prefixes each control message with a
//! 4-byte big-endian length. The payload itself is never framed.

use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::catalog::{CatalogAccumulator, decode_listing, encode_listing};
use super::constants::{CONTROL_BUFFER_SIZE, DIGEST_HEX_LEN, LEGACY_SIZE_SETTLE, MAX_FRAME_LEN};
use crate::TransferMode;
use crate::config::WireFormat;
use crate::error::{Result, TransferError};

/// Longest decimal representation of a `u64`
const MAX_SIZE_DIGITS: usize = 20;

/// A connection speaking the session protocol
///
/// Reads go through a buffer so bytes that arrive together with a control
/// message are handed to the payload reader instead of being lost.
pub struct Channel<S> {
    inner: BufReader<S>,
    format: WireFormat,
}

fn closed_while(e: std::io::Error, what: &'static str) -> TransferError {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            TransferError::ConnectionClosed(what)
        }
        _ => TransferError::Io(e),
    }
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, format: WireFormat) -> Self {
        Self {
            inner: BufReader::with_capacity(CONTROL_BUFFER_SIZE, stream),
            format,
        }
    }

    /// Reader for the raw payload, buffered bytes first
    pub fn payload_reader(&mut self) -> &mut BufReader<S> {
        &mut self.inner
    }

    /// Writer for the raw payload
    pub fn payload_writer(&mut self) -> &mut S {
        self.inner.get_mut()
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.get_mut().shutdown().await?;
        Ok(())
    }

    /// One control message as a single write, framed when configured
    async fn write_control(&mut self, body: &[u8]) -> Result<()> {
        let stream = self.inner.get_mut();
        match self.format {
            WireFormat::Legacy => stream.write_all(body).await?,
            WireFormat::Framed => {
                let mut frame = Vec::with_capacity(4 + body.len());
                frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
                frame.extend_from_slice(body);
                stream.write_all(&frame).await?;
            }
        }
        stream.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self, what: &'static str) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.inner
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| closed_while(e, what))?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransferError::Protocol(format!(
                "{} frame of {} bytes exceeds limit of {}",
                what, len, MAX_FRAME_LEN
            )));
        }

        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(|e| closed_while(e, what))?;
        Ok(buf)
    }

    async fn read_exact_control(&mut self, len: usize, what: &'static str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(|e| closed_while(e, what))?;
        Ok(buf)
    }

    pub async fn send_catalog(&mut self, entries: &[String]) -> Result<()> {
        match self.format {
            WireFormat::Legacy => self.write_control(&encode_listing(entries)).await,
            WireFormat::Framed => self.write_control(entries.join("\n").as_bytes()).await,
        }
    }

    pub async fn recv_catalog(&mut self) -> Result<Vec<String>> {
        match self.format {
            WireFormat::Legacy => {
                let mut acc = CatalogAccumulator::new();
                let mut buf = vec![0u8; CONTROL_BUFFER_SIZE];
                loop {
                    let n = self
                        .inner
                        .read(&mut buf)
                        .await
                        .map_err(|e| closed_while(e, "catalog"))?;
                    if n == 0 {
                        return Err(TransferError::ConnectionClosed("catalog"));
                    }
                    if acc.push(&buf[..n]) {
                        break;
                    }
                }
                acc.finish()
                    .ok_or_else(|| TransferError::Protocol("catalog sentinel missing".to_string()))
            }
            WireFormat::Framed => {
                let body = self.read_frame("catalog").await?;
                Ok(decode_listing(&body))
            }
        }
    }

    pub async fn send_selection(&mut self, name: &str) -> Result<()> {
        self.write_control(name.as_bytes()).await
    }

    /// Requested entry name; in the legacy format it must fit one read
    pub async fn recv_selection(&mut self) -> Result<String> {
        let body = match self.format {
            WireFormat::Legacy => {
                let mut buf = vec![0u8; CONTROL_BUFFER_SIZE];
                let n = self
                    .inner
                    .read(&mut buf)
                    .await
                    .map_err(|e| closed_while(e, "selection"))?;
                if n == 0 {
                    return Err(TransferError::ConnectionClosed("selection"));
                }
                buf.truncate(n);
                buf
            }
            WireFormat::Framed => self.read_frame("selection").await?,
        };

        String::from_utf8(body)
            .map_err(|_| TransferError::Protocol("selection is not valid UTF-8".to_string()))
    }

    /// Mode tag and decimal size, written as two separate messages
    ///
    /// The legacy size has no terminator, so the payload is held back for
    /// `LEGACY_SIZE_SETTLE` after it.
    pub async fn send_header(&mut self, mode: TransferMode, size: u64) -> Result<()> {
        self.write_control(mode.wire_tag().as_bytes()).await?;
        self.write_control(size.to_string().as_bytes()).await?;
        if self.format == WireFormat::Legacy && size > 0 {
            tokio::time::sleep(LEGACY_SIZE_SETTLE).await;
        }
        Ok(())
    }

    pub async fn recv_header(&mut self) -> Result<(TransferMode, u64)> {
        match self.format {
            WireFormat::Legacy => {
                let mode = self.recv_legacy_mode().await?;
                let size = self.recv_legacy_size().await?;
                Ok((mode, size))
            }
            WireFormat::Framed => {
                let tag = self.read_frame("mode").await?;
                let mode = TransferMode::from_wire(&tag).ok_or_else(|| {
                    TransferError::Protocol(format!(
                        "unknown mode tag {:?}",
                        String::from_utf8_lossy(&tag)
                    ))
                })?;
                let size = self.read_frame("payload size").await?;
                Ok((mode, parse_size(&size)?))
            }
        }
    }

    /// `ZIP` is three bytes, `FILE` four: read exactly what the tag needs
    async fn recv_legacy_mode(&mut self) -> Result<TransferMode> {
        let mut tag = self.read_exact_control(3, "mode").await?;
        if tag == b"FIL" {
            tag.extend(self.read_exact_control(1, "mode").await?);
        }

        TransferMode::from_wire(&tag).ok_or_else(|| {
            TransferError::Protocol(format!(
                "unknown mode tag {:?}",
                String::from_utf8_lossy(&tag)
            ))
        })
    }

    /// Leading ASCII digits of the next read; the rest stays buffered
    async fn recv_legacy_size(&mut self) -> Result<u64> {
        let available = self
            .inner
            .fill_buf()
            .await
            .map_err(|e| closed_while(e, "payload size"))?;
        if available.is_empty() {
            return Err(TransferError::ConnectionClosed("payload size"));
        }

        let digits = available
            .iter()
            .take(MAX_SIZE_DIGITS + 1)
            .take_while(|b| b.is_ascii_digit())
            .count();
        let size = parse_size(&available[..digits])?;
        self.inner.consume(digits);
        Ok(size)
    }

    pub async fn send_digest(&mut self, digest: &str) -> Result<()> {
        self.write_control(digest.as_bytes()).await
    }

    pub async fn recv_digest(&mut self) -> Result<String> {
        let body = match self.format {
            WireFormat::Legacy => self.read_exact_control(DIGEST_HEX_LEN, "digest").await?,
            WireFormat::Framed => self.read_frame("digest").await?,
        };

        if body.len() != DIGEST_HEX_LEN || !body.iter().all(u8::is_ascii_hexdigit) {
            return Err(TransferError::Protocol(format!(
                "malformed digest {:?}",
                String::from_utf8_lossy(&body)
            )));
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn parse_size(digits: &[u8]) -> Result<u64> {
    if digits.is_empty() || digits.len() > MAX_SIZE_DIGITS {
        return Err(TransferError::Protocol(format!(
            "expected decimal payload size, got {:?}",
            String::from_utf8_lossy(digits)
        )));
    }

    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            TransferError::Protocol(format!(
                "invalid payload size {:?}",
                String::from_utf8_lossy(digits)
            ))
        })
}

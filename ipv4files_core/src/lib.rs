use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

pub mod config;
pub mod error;
pub mod transfer;

pub use error::TransferError;

/// Payload shape negotiated for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// A single regular file streamed as-is
    File,
    /// A directory packaged into a zip archive first
    Zip,
}

impl TransferMode {
    /// Tag sent on the wire right after the selection is received
    pub fn wire_tag(self) -> &'static str {
        match self {
            TransferMode::File => "FILE",
            TransferMode::Zip => "ZIP",
        }
    }

    pub fn from_wire(tag: &[u8]) -> Option<Self> {
        match tag {
            b"FILE" => Some(TransferMode::File),
            b"ZIP" => Some(TransferMode::Zip),
            _ => None,
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

//Struct transfer metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub mode: TransferMode,
    /// Exact number of payload bytes exchanged before the digest
    pub declared_size: u64,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

//Struct report from Core to the operator console
#[derive(Debug, Clone)]
pub enum AppEvent {
    Status(String),

    ClientConnected {
        peer: SocketAddr,
    },

    /// Server-side archive packaging, one event per added file
    PackagingProgress {
        processed: usize,
        total: usize,
        percent: u8,
    },

    TransferProgress {
        file_name: String,
        progress: f32,
        speed: String,
        speed_bps: f64,
        is_sending: bool,
    },
    TransferCompleted(String),

    DigestSent {
        file_name: String,
        digest: String,
    },

    ChecksumVerified {
        file_name: String,
        digest: String,
    },

    /// Receiver digest differs from the sender's; output is kept
    ChecksumMismatch {
        file_name: String,
        sender_digest: String,
        receiver_digest: String,
    },

    /// A downloaded file reached its final location
    FilePlaced {
        path: PathBuf,
        renamed: bool,
    },

    SessionClosed {
        peer: SocketAddr,
    },

    Error(String),
}

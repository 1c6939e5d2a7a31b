use std::time::Duration;

/// Default TCP port for the file server
pub const DEFAULT_PORT: u16 = 25565;

/// Block size used when reading the payload from disk and sending it
pub const SEND_BLOCK_SIZE: usize = 4096;

/// Block size used when reading the payload from the socket
pub const RECV_BLOCK_SIZE: usize = 1024;

/// Single-read buffer for unframed control messages
pub const CONTROL_BUFFER_SIZE: usize = 4096;

/// Marker closing the catalog listing in the legacy wire format
pub const CATALOG_SENTINEL: &[u8] = b"<<EOF>>";

/// Length of a hex-encoded SHA-1 digest
pub const DIGEST_HEX_LEN: usize = 40;

/// Upper bound for one length-prefixed control frame (1MB)
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Minimum bytes between two progress events
pub const PROGRESS_INTERVAL: u64 = 64 * 1024;

/// Pause between the legacy size message and the payload
///
/// Lets the receiver consume the size before payload bytes can join it in
/// one read.
pub const LEGACY_SIZE_SETTLE: Duration = Duration::from_millis(50);

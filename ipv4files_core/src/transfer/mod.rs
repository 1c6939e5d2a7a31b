//! TCP file transfer engine.
//!
//! This module provides:
//! - Catalog publishing of the shared folder
//! - Fixed-block byte streaming with SHA-1 verification
//! - Zip packaging of requested directories
//! - The server session state machine and its supervised listener
//! - The client session that downloads and places entries

pub mod archive;
pub mod catalog;
pub mod client;
pub mod constants;
pub mod hash;
pub mod listener;
pub mod protocol;
pub mod server;
pub mod stream;
pub mod utils;

// Re-export public API
pub use client::{ClientSession, TransferReport};
pub use constants::DEFAULT_PORT;
pub use hash::ChecksumRecord;
pub use listener::Listener;
pub use server::{SessionState, run_session};

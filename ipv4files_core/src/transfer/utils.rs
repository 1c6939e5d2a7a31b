use crate::AppEvent;
use crate::error::{Result, TransferError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;

/// Optional channel towards the operator console
pub type EventSender = Option<mpsc::Sender<AppEvent>>;

/// Forward an event without ever stalling the transfer
///
/// A full or closed channel drops the event.
pub fn emit(event_tx: &EventSender, event: AppEvent) {
    if let Some(tx) = event_tx {
        if let Err(e) = tx.try_send(event) {
            tracing::trace!("Dropped console event: {}", e);
        }
    }
}

/// Check that a requested name designates an immediate entry of a folder
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name.trim().is_empty() {
        return Err(TransferError::InvalidSelection("empty name".to_string()));
    }

    if name == "." || name == ".." {
        return Err(TransferError::InvalidSelection(format!(
            "'{}' is not an entry",
            name
        )));
    }

    if name.contains(['/', '\\']) || name.chars().any(char::is_control) {
        return Err(TransferError::InvalidSelection(format!(
            "'{}' is not a plain entry name",
            name
        )));
    }

    Ok(())
}

/// Candidate path carrying the `_<index>` suffix before the extension
fn suffixed_path(path: &Path, index: u32) -> PathBuf {
    let mut name: OsString = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();

    name.push(format!("_{}", index));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }

    path.with_file_name(name)
}

/// First free path among `path`, `stem_1.ext`, `stem_2.ext`, ...
pub async fn unique_destination(path: &Path) -> Result<PathBuf> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(path.to_path_buf());
    }

    let mut index = 1;
    loop {
        let candidate = suffixed_path(path, index);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        index += 1;
    }
}

/// Format transfer speed from bytes and elapsed time
pub fn format_transfer_speed(bytes_transferred: u64, elapsed_secs: f64) -> String {
    if elapsed_secs <= 0.0 {
        return "Starting...".to_string();
    }

    let speed_bps = bytes_transferred as f64 / elapsed_secs;
    if speed_bps > 1_000_000.0 {
        format!("{:.2} MB/s", speed_bps / 1_000_000.0)
    } else if speed_bps > 1_000.0 {
        format!("{:.1} KB/s", speed_bps / 1_000.0)
    } else {
        format!("{:.0} B/s", speed_bps)
    }
}

/// Report transfer progress to the event channel
pub fn report_progress(
    event_tx: &EventSender,
    file_name: &str,
    bytes_done: u64,
    total_bytes: u64,
    start_time: Instant,
    is_sending: bool,
) {
    if event_tx.is_none() {
        return;
    }

    let progress = if total_bytes == 0 {
        100.0
    } else {
        (bytes_done as f32 / total_bytes as f32) * 100.0
    };
    let elapsed = start_time.elapsed().as_secs_f64();
    let speed_bps = if elapsed > 0.0 {
        bytes_done as f64 / elapsed
    } else {
        0.0
    };

    emit(
        event_tx,
        AppEvent::TransferProgress {
            file_name: file_name.to_string(),
            progress,
            speed: format_transfer_speed(bytes_done, elapsed),
            speed_bps,
            is_sending,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_entry_name() {
        assert!(validate_entry_name("report.pdf").is_ok());
        assert!(validate_entry_name("data").is_ok());
        assert!(validate_entry_name(".hidden").is_ok());

        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name("   ").is_err());
        assert!(validate_entry_name(".").is_err());
        assert!(validate_entry_name("..").is_err());
        assert!(validate_entry_name("../etc/passwd").is_err());
        assert!(validate_entry_name("dir\\file").is_err());
        assert!(validate_entry_name("line\nbreak").is_err());
    }

    #[test]
    fn test_suffixed_path() {
        let base = Path::new("/downloads/a.txt");
        assert_eq!(suffixed_path(base, 1), PathBuf::from("/downloads/a_1.txt"));
        assert_eq!(
            suffixed_path(Path::new("/d/archive.tar.gz"), 2),
            PathBuf::from("/d/archive.tar_2.gz")
        );
        assert_eq!(suffixed_path(Path::new("/d/README"), 3), PathBuf::from("/d/README_3"));
        assert_eq!(suffixed_path(Path::new("/d/.bashrc"), 1), PathBuf::from("/d/.bashrc_1"));
    }

    #[tokio::test]
    async fn test_unique_destination_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.txt");

        assert_eq!(unique_destination(&target).await.unwrap(), target);

        std::fs::write(&target, b"first").unwrap();
        let second = unique_destination(&target).await.unwrap();
        assert_eq!(second, dir.path().join("a_1.txt"));

        std::fs::write(&second, b"second").unwrap();
        let third = unique_destination(&target).await.unwrap();
        assert_eq!(third, dir.path().join("a_2.txt"));
    }

    #[test]
    fn test_format_transfer_speed() {
        assert_eq!(format_transfer_speed(100, 0.0), "Starting...");
        assert_eq!(format_transfer_speed(500, 1.0), "500 B/s");
        assert_eq!(format_transfer_speed(2_500, 1.0), "2.5 KB/s");
        assert_eq!(format_transfer_speed(3_000_000, 1.0), "3.00 MB/s");
    }

    #[tokio::test]
    async fn test_emit_never_blocks_on_full_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let event_tx: EventSender = Some(tx);

        emit(&event_tx, AppEvent::Status("one".to_string()));
        emit(&event_tx, AppEvent::Status("two".to_string()));

        match rx.recv().await {
            Some(AppEvent::Status(s)) => assert_eq!(s, "one"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}

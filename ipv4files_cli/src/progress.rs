//! Terminal rendering of core events.

use indicatif::{ProgressBar, ProgressStyle};
use ipv4files_core::AppEvent;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Consumes events until every sender is gone
pub async fn render(mut events: mpsc::Receiver<AppEvent>) {
    let mut console = Console::default();
    while let Some(event) = events.recv().await {
        console.handle(event);
    }
    console.finish();
}

#[derive(Default)]
struct Console {
    packaging: Option<ProgressBar>,
    transfers: HashMap<String, ProgressBar>,
}

fn percent_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:>10} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl Console {
    fn bar(prefix: &str) -> ProgressBar {
        let bar = ProgressBar::new(100);
        bar.set_style(percent_style());
        bar.set_prefix(prefix.to_string());
        bar
    }

    /// Print above any live bar
    fn line(&self, text: String) {
        match self.transfers.values().next().or(self.packaging.as_ref()) {
            Some(bar) => bar.println(text),
            None => println!("{}", text),
        }
    }

    fn handle(&mut self, event: AppEvent) {
        match event {
            AppEvent::Status(msg) => self.line(msg),
            AppEvent::ClientConnected { peer } => {
                self.line(format!("Client {} connected", peer));
            }
            AppEvent::PackagingProgress {
                processed,
                total,
                percent,
            } => {
                let bar = self.packaging.get_or_insert_with(|| Self::bar("Packing"));
                bar.set_position(percent as u64);
                bar.set_message(format!("{}/{} files", processed, total));
                if processed >= total {
                    bar.finish();
                    self.packaging = None;
                }
            }
            AppEvent::TransferProgress {
                file_name,
                progress,
                speed,
                is_sending,
                ..
            } => {
                let bar = self.transfers.entry(file_name).or_insert_with(|| {
                    Self::bar(if is_sending { "Sending" } else { "Receiving" })
                });
                bar.set_position(progress.clamp(0.0, 100.0) as u64);
                bar.set_message(speed);
            }
            AppEvent::TransferCompleted(file_name) => {
                if let Some(bar) = self.transfers.remove(&file_name) {
                    bar.finish_with_message("done");
                }
                self.line(format!("Transfer complete: {}", file_name));
            }
            AppEvent::DigestSent { file_name, digest } => {
                self.line(format!("SHA-1 sent for {}: {}", file_name, digest));
            }
            AppEvent::ChecksumVerified { file_name, digest } => {
                self.line(format!("Integrity check passed for {} ({})", file_name, digest));
            }
            AppEvent::ChecksumMismatch {
                file_name,
                sender_digest,
                receiver_digest,
            } => {
                self.line(format!(
                    "Integrity check FAILED for {}\n  server: {}\n  local:  {}",
                    file_name, sender_digest, receiver_digest
                ));
            }
            AppEvent::FilePlaced { path, renamed } => {
                if renamed {
                    self.line(format!("Name taken, saved as {}", path.display()));
                }
            }
            AppEvent::SessionClosed { peer } => {
                for (_, bar) in self.transfers.drain() {
                    bar.abandon();
                }
                self.line(format!("Session with {} closed", peer));
            }
            AppEvent::Error(msg) => self.line(format!("[ERROR] {}", msg)),
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.packaging.take() {
            bar.abandon();
        }
        for (_, bar) in self.transfers.drain() {
            bar.abandon();
        }
    }
}

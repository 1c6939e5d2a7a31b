#[cfg(test)]
mod tests {
    use ipv4files_core::config::{ServerConfig, WireFormat};
    use ipv4files_core::transfer::{ClientSession, Listener, TransferReport};
    use ipv4files_core::{AppEvent, TransferMode};
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    /// report.pdf (2000 bytes) plus data/ holding three files
    fn populate(share: &Path) {
        let mut report = b"%PDF-1.4\n".to_vec();
        report.resize(2000, b'r');
        std::fs::create_dir_all(share.join("data").join("sub")).unwrap();
        std::fs::write(share.join("report.pdf"), &report).unwrap();
        std::fs::write(share.join("data").join("a.txt"), b"alpha").unwrap();
        std::fs::write(share.join("data").join("b.txt"), b"bravo").unwrap();
        std::fs::write(share.join("data").join("sub").join("c.txt"), b"charlie").unwrap();
    }

    struct Harness {
        addr: String,
        events: mpsc::Receiver<AppEvent>,
        shutdown: tokio_util::sync::CancellationToken,
        _dir: tempfile::TempDir,
        share: std::path::PathBuf,
        staging: std::path::PathBuf,
        downloads: std::path::PathBuf,
    }

    async fn start(format: WireFormat) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let share = dir.path().join("share");
        let staging = dir.path().join("staging");
        let downloads = dir.path().join("downloads");
        populate(&share);

        let mut config = ServerConfig::new(&share, 0);
        config.staging_dir = Some(staging.clone());
        config.wire_format = format;

        let (tx, events) = mpsc::channel(1024);
        let listener = Listener::bind(config).await.unwrap().with_events(tx);
        let addr = format!("127.0.0.1:{}", listener.local_addr().port());
        let shutdown = listener.shutdown_token();
        tokio::spawn(listener.run());

        Harness {
            addr,
            events,
            shutdown,
            _dir: dir,
            share,
            staging,
            downloads,
        }
    }

    impl Harness {
        async fn fetch(&self, name: &str, format: WireFormat) -> TransferReport {
            let session = ClientSession::connect(&self.addr, format).await.unwrap();
            let index = session
                .catalog()
                .iter()
                .position(|entry| entry == name)
                .unwrap_or_else(|| panic!("{} missing from {:?}", name, session.catalog()));
            session.download(index, &self.downloads, &None).await.unwrap()
        }

        async fn wait_session_closed(&mut self) {
            tokio::time::timeout(Duration::from_secs(10), async {
                while let Some(event) = self.events.recv().await {
                    if matches!(event, AppEvent::SessionClosed { .. }) {
                        return;
                    }
                }
            })
            .await
            .expect("session never closed");
        }
    }

    #[tokio::test]
    async fn test_catalog_lists_share_root() {
        let harness = start(WireFormat::Legacy).await;

        let session = ClientSession::connect(&harness.addr, WireFormat::Legacy)
            .await
            .unwrap();
        let mut catalog = session.catalog().to_vec();
        catalog.sort();
        assert_eq!(catalog, vec!["data", "report.pdf"]);

        harness.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_file_download() {
        let harness = start(WireFormat::Legacy).await;

        let report = harness.fetch("report.pdf", WireFormat::Legacy).await;

        assert_eq!(report.descriptor.mode, TransferMode::File);
        assert_eq!(report.descriptor.declared_size, 2000);
        assert_eq!(report.bytes_received, 2000);
        assert!(report.verified());
        assert_eq!(
            std::fs::read(harness.downloads.join("report.pdf")).unwrap(),
            std::fs::read(harness.share.join("report.pdf")).unwrap()
        );

        harness.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_directory_download_and_artifact_cleanup() {
        let mut harness = start(WireFormat::Legacy).await;

        let report = harness.fetch("data", WireFormat::Legacy).await;
        harness.wait_session_closed().await;

        assert_eq!(report.descriptor.mode, TransferMode::Zip);
        assert!(report.verified());
        assert_eq!(report.placed_files.len(), 3);

        let root = harness.downloads.join("data");
        assert_eq!(std::fs::read(root.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(root.join("b.txt")).unwrap(), b"bravo");
        assert_eq!(std::fs::read(root.join("sub").join("c.txt")).unwrap(), b"charlie");

        // Neither side leaves its archive behind
        assert!(!harness.staging.join("data.zip").exists());
        let leftovers: Vec<_> = std::fs::read_dir(&harness.downloads)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["data"]);

        harness.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_empty_file() {
        let harness = start(WireFormat::Legacy).await;
        std::fs::write(harness.share.join("empty.log"), b"").unwrap();

        let report = harness.fetch("empty.log", WireFormat::Legacy).await;

        assert_eq!(report.descriptor.declared_size, 0);
        assert_eq!(report.checksum.sender_digest, EMPTY_SHA1);
        assert_eq!(report.checksum.receiver_digest, EMPTY_SHA1);
        assert_eq!(std::fs::metadata(harness.downloads.join("empty.log")).unwrap().len(), 0);

        harness.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_framed_format_handles_digit_payload() {
        let harness = start(WireFormat::Framed).await;
        std::fs::write(harness.share.join("numbers.csv"), b"1,2,3\n4,5,6\n").unwrap();

        let report = harness.fetch("numbers.csv", WireFormat::Framed).await;

        assert!(report.verified());
        assert_eq!(report.descriptor.declared_size, 12);
        assert_eq!(
            std::fs::read(harness.downloads.join("numbers.csv")).unwrap(),
            b"1,2,3\n4,5,6\n"
        );

        harness.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_legacy_format_handles_digit_payload() {
        let mut harness = start(WireFormat::Legacy).await;
        let content: Vec<u8> = b"2024-01-01,12\n".iter().copied().cycle().take(14000).collect();
        std::fs::write(harness.share.join("daily.csv"), &content).unwrap();

        for round in 0..5 {
            let report = harness.fetch("daily.csv", WireFormat::Legacy).await;
            harness.wait_session_closed().await;

            assert_eq!(report.descriptor.declared_size, 14000, "round {}", round);
            assert!(report.verified(), "round {}", round);
            assert_eq!(std::fs::read(&report.descriptor.destination_path).unwrap(), content);
        }

        harness.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_repeated_downloads_are_suffixed() {
        let mut harness = start(WireFormat::Legacy).await;

        harness.fetch("report.pdf", WireFormat::Legacy).await;
        harness.wait_session_closed().await;
        let second = harness.fetch("report.pdf", WireFormat::Legacy).await;
        harness.wait_session_closed().await;
        assert_eq!(
            second.descriptor.destination_path,
            harness.downloads.join("report_1.pdf")
        );

        harness.fetch("data", WireFormat::Legacy).await;
        harness.wait_session_closed().await;
        let again = harness.fetch("data", WireFormat::Legacy).await;

        let root = harness.downloads.join("data");
        assert!(root.join("a.txt").exists());
        assert!(root.join("a_1.txt").exists());
        assert!(root.join("sub").join("c_1.txt").exists());
        assert!(again.placed_files.contains(&root.join("b_1.txt")));

        harness.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use ipv4files_core::TransferError;
    use ipv4files_core::config::{ServerConfig, WireFormat};
    use ipv4files_core::transfer::protocol::Channel;
    use ipv4files_core::transfer::{ClientSession, Listener};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// The listener rebinds after a fault, so the first attempts may be refused
    async fn connect_with_retry(addr: &str) -> ClientSession {
        for _ in 0..50 {
            match ClientSession::connect(addr, WireFormat::Legacy).await {
                Ok(session) => return session,
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        panic!("listener on {} never came back", addr);
    }

    #[tokio::test]
    async fn test_listener_survives_bad_selection() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("ipv4files_core=debug"))
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let share = dir.path().join("share");
        std::fs::create_dir_all(&share).unwrap();
        std::fs::write(share.join("hello.txt"), b"hello world").unwrap();

        let mut config = ServerConfig::new(&share, 0);
        config.staging_dir = Some(dir.path().join("staging"));
        config.wire_format = WireFormat::Legacy;
        let listener = Listener::bind(config).await.unwrap();
        let addr = format!("127.0.0.1:{}", listener.local_addr().port());
        let shutdown = listener.shutdown_token();
        let server = tokio::spawn(listener.run());

        // 1. A client asking for something outside the share
        let stream = TcpStream::connect(&addr).await.unwrap();
        let mut rogue = Channel::new(stream, WireFormat::Legacy);
        rogue.recv_catalog().await.unwrap();
        rogue.send_selection("../outside").await.unwrap();
        let err = rogue.recv_header().await.unwrap_err();
        assert!(err.is_connection_lost(), "unexpected error: {}", err);

        // 2. A client that disappears before selecting
        let idle = connect_with_retry(&addr).await;
        drop(idle);

        // 3. A well-behaved client is still served
        let session = connect_with_retry(&addr).await;
        let downloads = dir.path().join("downloads");
        let report = session.download(0, &downloads, &None).await.unwrap();
        assert!(report.verified());
        assert_eq!(
            std::fs::read(downloads.join("hello.txt")).unwrap(),
            b"hello world"
        );

        shutdown.cancel();
        let stopped = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("listener ignored shutdown");
        assert!(stopped.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_client_reports_connection_lost() {
        let fake = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = fake.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = fake.accept().await.unwrap();
            stream.write_all(b"movie.mkv<<EOF>>").await.unwrap();
            let mut selection = [0u8; 64];
            let n = stream.read(&mut selection).await.unwrap();
            assert_eq!(&selection[..n], b"movie.mkv");

            stream.write_all(b"FILE").await.unwrap();
            stream.write_all(b"1000").await.unwrap();
            stream.write_all(&[b'm'; 10]).await.unwrap();
            // Dropped before the remaining 990 bytes
        });

        let dir = tempfile::tempdir().unwrap();
        let session = ClientSession::connect(&addr, WireFormat::Legacy)
            .await
            .unwrap();
        assert_eq!(session.catalog(), ["movie.mkv".to_string()]);

        let err = session.download(0, dir.path(), &None).await.unwrap_err();
        server.await.unwrap();

        match err {
            TransferError::ConnectionLost { received, expected } => {
                assert_eq!(received, 10);
                assert_eq!(expected, 1000);
            }
            other => panic!("Expected ConnectionLost, got: {}", other),
        }
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let first = Listener::bind(ServerConfig::new(dir.path(), 0)).await.unwrap();
        let port = first.local_addr().port();

        let second = Listener::bind(ServerConfig::new(dir.path(), port)).await;
        assert!(second.is_err());
    }
}

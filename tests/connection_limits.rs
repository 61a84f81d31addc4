//! Boundary coverage for `server::Server`'s `MaxConnections` gate: once the
//! cap is in use, the next accepted socket must be rejected outright and
//! counted, not silently dropped.

mod support;

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use nfs_mamont::config::ExportOptions;
use nfs_mamont::server::Server;

#[tokio::test]
async fn exceeding_max_connections_increments_rejected_counter() {
    support::init_logging();

    let config = ExportOptions { max_connections: 1, ..Default::default() };
    let server = Server::bind("127.0.0.1:0", support::DemoFS, config).await.unwrap();
    let port = server.local_port();
    let metrics = server.metrics();

    tokio::spawn(async move {
        let _ = server.serve().await;
    });

    // First connection takes the single slot and is held open for the
    // duration of the test so the second connection has nowhere to land.
    let _first = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    // Give the accept loop a moment to register the first connection before
    // the second one races it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(metrics.rejected_connections(), 0);

    let mut second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    // A rejected connection gets no reply and the listener drops it; reading
    // from our end should see EOF rather than any bytes.
    let mut buf = [0u8; 8];
    let read = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf)).await;
    match read {
        Ok(Ok(0)) => {}
        Ok(Ok(n)) => panic!("expected EOF on rejected connection, got {n} bytes"),
        Ok(Err(e)) => panic!("unexpected read error: {e:?}"),
        Err(_) => panic!("timed out waiting for rejected connection to close"),
    }

    assert_eq!(metrics.rejected_connections(), 1);
    assert_eq!(metrics.active_connections(), 1);
}

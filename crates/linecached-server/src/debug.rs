use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

const RESPONSE: &[u8] = b"HTTP/1.1 501 Not Implemented\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

/// A minimal stand-in for the reference server's profiling endpoint
/// (`net/http/pprof` in the original). Actual profiling instrumentation is
/// out of core scope (§1); this just satisfies the config-gated listener
/// the spec couples to the core via `debug.enabled`/`debug.address` (§6,
/// §4.8), matching the teacher's `DebugServer.Run()` shape: a no-op unless
/// enabled, logged at startup.
pub async fn run(address: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| anyhow::anyhow!("unable to bind debug server to {address}: {e}"))?;
    tracing::info!(address, "debug server listening");

    loop {
        let (mut stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let _ = stream.write_all(RESPONSE).await;
            let _ = stream.shutdown().await;
        });
    }
}

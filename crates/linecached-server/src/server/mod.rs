pub mod conn;
pub mod counting;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

pub use conn::Context;

use crate::cache::CacheEngine;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::stats::RuntimeSampler;

/// Binds the listener, brings up the cache engine and runtime sampler, and
/// runs the accept loop until a shutdown signal is observed. Mirrors the
/// reference server's "listener close observed on accept + per-connection
/// deadline drives eventual exit" cooperative shutdown (§5, §9).
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.server_address)
        .await
        .map_err(|e| anyhow::anyhow!("unable to bind to {}: {e}", cfg.server_address))?;
    tracing::info!(address = %cfg.server_address, "linecached-server listening");
    serve(listener, cfg).await
}

/// Runs the accept loop against an already-bound listener. Split out of
/// [`run`] so tests can bind an ephemeral port (`127.0.0.1:0`), read back
/// the real address with `local_addr()`, and drive the server without a
/// fixed, collision-prone port.
pub async fn serve(listener: TcpListener, cfg: Config) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new());
    let cache = CacheEngine::new(cfg.max_cost_bytes(), metrics.clone());
    let runtime = RuntimeSampler::new();
    tokio::spawn(runtime.clone().run());

    if cfg.debug_enabled {
        let debug_address = cfg.debug_address.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::debug::run(&debug_address).await {
                tracing::warn!(error = %e, "debug server exited");
            }
        });
    }

    let idle_timeout = (cfg.idle_timeout_secs > 0).then(|| Duration::from_secs(cfg.idle_timeout_secs));
    let max_connections = cfg.max_connections;
    let ctx = Arc::new(Context {
        cache,
        metrics,
        runtime,
        config: cfg,
    });

    let mut sigterm = unix_sigterm()?;

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept error");
                        continue;
                    }
                };

                if max_connections > 0
                    && ctx.metrics.curr_connections.load(Ordering::Relaxed) >= max_connections
                {
                    ctx.metrics.inc_rejected_connection();
                    tracing::debug!(%peer, "rejecting connection: at max connections");
                    tokio::spawn(conn::reject(stream, "max connections"));
                    continue;
                }

                ctx.metrics.inc_connection_opened();
                tracing::debug!(%peer, "accepted connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    conn::handle(stream, ctx.clone(), idle_timeout).await;
                    ctx.metrics.inc_connection_closed();
                });
            }
        }
    }

    Ok(())
}

fn unix_sigterm() -> anyhow::Result<tokio::signal::unix::Signal> {
    use tokio::signal::unix::{signal, SignalKind};
    Ok(signal(SignalKind::terminate())?)
}

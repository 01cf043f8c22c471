use std::future::{Future, IntoFuture};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::Router;
use if_addrs::get_if_addrs;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::oneshot;

use crate::routes::{router, Context, SERVICE_NAME};

/// Bind, announce and serve until SIGINT or SIGTERM.
///
/// After the signal, in-flight requests get `grace` to finish before this returns.
pub async fn serve<S: ToSocketAddrs>(addr: S, ctx: Context, grace: Duration) -> std::io::Result<()> {
    let tcp_listener = TcpListener::bind(addr).await?;
    announce(&tcp_listener, &ctx).await?;

    let journal = ctx.journal.clone();
    let signal = async move {
        let name = shutdown_signal().await;
        journal.info(&format!("{name} received, shutting down gracefully"), None);
    };
    serve_until(tcp_listener, router(ctx), signal, grace).await
}

/// Journal the start, print the banner, then build the mailer.
///
/// A failed build is journaled by the transport and retried on the first send.
pub async fn announce(listener: &TcpListener, ctx: &Context) -> std::io::Result<()> {
    let port = listener.local_addr()?.port();

    ctx.journal
        .info(&format!("{SERVICE_NAME} started on port {port}"), None);
    print_banner(port);
    print_listener_urls(listener);

    ctx.transport.ensure_initialized().await;
    Ok(())
}

/// Serve on an already-bound listener until `signal` completes.
pub async fn serve_until<F>(
    listener: TcpListener,
    router: Router,
    signal: F,
    grace: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = oneshot::channel();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = signalled_rx => {}
    }

    match tokio::time::timeout(grace, server).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                "requests still in flight after {}s grace period, exiting",
                grace.as_secs()
            );
            Ok(())
        }
    }
}

fn print_banner(port: u16) {
    let rule = "=".repeat(60);
    tracing::info!("{}", rule);
    tracing::info!("{}", SERVICE_NAME);
    tracing::info!("{}", rule);
    tracing::info!("Server running on: http://localhost:{}", port);
    tracing::info!("Health check: http://localhost:{}/health", port);
    tracing::info!("Send email: POST http://localhost:{}/send-email", port);
    tracing::info!("Test email: POST http://localhost:{}/test-email", port);
    tracing::info!("{}", rule);
}

fn print_listener_urls(listener: &TcpListener) {
    if let Ok(addr) = listener.local_addr() {
        let port = addr.port();
        match addr {
            SocketAddr::V4(addr4) if addr4.ip().is_unspecified() => {
                for ip in get_interface_ips(false) {
                    print_addr(ip, port)
                }
            }
            SocketAddr::V6(addr6) if addr6.ip().is_unspecified() => {
                for ip in get_interface_ips(true) {
                    print_addr(ip, port)
                }
            }
            _ => print_addr(addr.ip(), port),
        }
    } else {
        tracing::warn!("Could not determine the address the server is listening on.");
    }
}

fn get_interface_ips(ipv6: bool) -> Vec<IpAddr> {
    get_if_addrs()
        .into_iter()
        .flatten()
        .map(|i| i.ip())
        .filter(|ip| (ipv6 && ip.is_ipv6()) || (!ipv6 && ip.is_ipv4()))
        .collect()
}

fn print_addr(addr: IpAddr, port: u16) {
    match addr {
        _ if addr.is_loopback() => tracing::info!("➜  Local:   http://localhost:{}", port),
        IpAddr::V4(_) => tracing::info!("➜  Network: http://{}:{}", addr, port),
        // Enclose IPv6 addresses in square brackets
        IpAddr::V6(_) => tracing::info!("➜  Network: http://[{}]:{}", addr, port),
    }
}

/// Wait for Ctrl+C or SIGTERM and return the signal's name.
pub async fn shutdown_signal() -> &'static str {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

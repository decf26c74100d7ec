//! Router assembly and the HTTP/HTTPS listeners.

pub mod tls;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::config::{SecurityConfig, ServerConfig};
use crate::handlers::{protected, public};
use crate::middleware::bearer_auth_middleware;
use crate::AppState;

pub fn router(state: AppState, security: &SecurityConfig) -> Router {
    let gated = Router::new()
        .route("/verify", get(protected::verify))
        .merge(data_routes())
        .merge(sync_routes())
        .route_layer(from_fn_with_state(state.clone(), bearer_auth_middleware));

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/time", get(public::time))
        // Protected
        .merge(gated)
        .fallback(public::not_found)
        // Global middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&security.cors_origins)),
        )
        .with_state(state)
}

fn data_routes() -> Router<AppState> {
    use protected::data;

    Router::new()
        // Collection-level operations
        .route("/:collection", get(data::collection_get).post(data::collection_post))
        // Record-level operations
        .route(
            "/:collection/:id",
            get(data::record_get)
                .put(data::record_put)
                .delete(data::record_delete),
        )
}

fn sync_routes() -> Router<AppState> {
    use protected::sync;

    Router::new()
        .route("/sync/:collection/pull", post(sync::pull))
        .route("/sync/:collection/push", post(sync::push))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Serves until Ctrl-C or SIGTERM, over TLS when certificates are configured.
pub async fn serve(config: &ServerConfig, app: Router) -> Result<()> {
    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    let tls = tls::acceptor_for(config.tls_cert_path.as_deref(), config.tls_key_path.as_deref())?;
    serve_on(listener, app, tls).await
}

/// Serves on an already bound listener.
pub async fn serve_on(listener: TcpListener, app: Router, tls: Option<TlsAcceptor>) -> Result<()> {
    let addr = listener.local_addr()?;

    match tls {
        None => {
            info!("Listening on http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Some(acceptor) => {
            info!("Listening on https://{}", addr);
            serve_tls(listener, app, acceptor, shutdown_signal()).await?;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Upper bound on a TLS handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

async fn serve_tls<S>(listener: TcpListener, app: Router, acceptor: TlsAcceptor, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::pin!(shutdown);

    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        let stop_rx = stop_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_tls_connection(acceptor, stream, remote_addr, app, stop_rx).await {
                debug!(remote = %remote_addr, "TLS connection ended: {}", e);
            }
        });
    }

    // In-flight connections finish their current request, then close.
    drop(stop_rx);
    let _ = stop_tx.send(true);
    stop_tx.closed().await;
    Ok(())
}

/// Runs `work` until it finishes or the stop signal fires.
async fn until_stopped<F: Future>(work: F, stop_rx: &mut watch::Receiver<bool>) -> Option<F::Output> {
    tokio::select! {
        output = work => Some(output),
        _ = stop_rx.changed() => None,
    }
}

async fn handle_tls_connection(
    acceptor: TlsAcceptor,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
    app: Router,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<()> {
    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream));
    let stream = match until_stopped(handshake, &mut stop_rx).await {
        None => return Ok(()),
        Some(Err(_)) => bail!("TLS handshake with {remote_addr} timed out"),
        Some(Ok(accepted)) => {
            accepted.with_context(|| format!("TLS handshake with {remote_addr} failed"))?
        }
    };

    let service = TowerToHyperService::new(app);
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result?,
        _ = stop_rx.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await?;
        }
    }
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

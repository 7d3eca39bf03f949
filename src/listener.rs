use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::worker::{PassQueue, PassTrigger};

/// Webhook surface: any POST on `/` asks for one more pass.
pub fn router(queue: PassQueue) -> Router {
    Router::new()
        .route("/", post(on_event))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(queue)
}

async fn on_event(State(queue): State<PassQueue>) -> StatusCode {
    match queue.enqueue(PassTrigger::new("webhook")) {
        Ok(outcome) => {
            info!(?outcome, "webhook accepted");
            StatusCode::ACCEPTED
        }
        Err(err) => {
            error!(error = %err, "could not schedule a pass");
            StatusCode::BAD_REQUEST
        }
    }
}

/// Build a TLS acceptor from a PEM certificate chain and private key.
pub fn load_tls(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let cert_file = File::open(cert_path)
        .with_context(|| format!("Failed to open certificate {}", cert_path.display()))?;
    let key_file = File::open(key_path)
        .with_context(|| format!("Failed to open private key {}", key_path.display()))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read certificates from {}", cert_path.display()))?;
    if certs.is_empty() {
        bail!("No certificate found in {}", cert_path.display());
    }
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .with_context(|| format!("Failed to read private key from {}", key_path.display()))?
        .with_context(|| format!("No private key found in {}", key_path.display()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("Unsupported TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Invalid certificate or private key")?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(TlsAcceptor::from(Arc::new(config)))
}

pub async fn serve(addr: SocketAddr, queue: PassQueue, tls: Option<TlsAcceptor>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind webhook listener on {addr}"))?;
    let app = router(queue);

    match tls {
        Some(acceptor) => {
            info!(%addr, "webhook listener ready over https");
            serve_tls(listener, app, acceptor).await
        }
        None => {
            warn!(%addr, "no certificate configured, webhook listener is serving plain http");
            axum::serve(listener, app)
                .await
                .context("Webhook listener stopped")?;
            Ok(())
        }
    }
}

async fn serve_tls(listener: TcpListener, app: Router, acceptor: TlsAcceptor) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "failed to accept webhook connection");
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let service = TowerToHyperService::new(app.clone());

        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(err) => {
                    debug!(%peer, error = %err, "tls handshake failed");
                    return;
                }
            };
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, error = %err, "webhook connection ended with an error");
            }
        });
    }
}

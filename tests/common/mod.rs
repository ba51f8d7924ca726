//! Shared mock backends and key material for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pooled_http::config::{ClientConfig, TrustConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// How a mock backend answers.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub body: &'static str,
    /// Delay before each response is written.
    pub delay: Duration,
    /// Keep the connection open for further requests.
    pub keep_alive: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            body: "ok",
            delay: Duration::ZERO,
            keep_alive: true,
        }
    }
}

/// A running mock backend.
pub struct MockBackend {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl MockBackend {
    /// TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// URL by name so the certificate's `localhost` SAN applies.
    pub fn https_url(&self, path: &str) -> String {
        format!("https://localhost:{}{}", self.addr.port(), path)
    }
}

/// Start a plain HTTP/1.1 backend on an ephemeral port.
pub async fn start_backend(behavior: Behavior) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = connections.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let behavior = behavior.clone();
                    tokio::spawn(serve(socket, behavior));
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, connections }
}

/// Start an HTTPS backend presenting `cert`. With `client_roots`, clients
/// must present a certificate chaining to one of them.
pub async fn start_tls_backend(
    cert: &rcgen::CertifiedKey,
    client_roots: Option<&rcgen::CertifiedKey>,
    behavior: Behavior,
) -> MockBackend {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap();

    let builder = match client_roots {
        Some(ca) => {
            let mut roots = rustls::RootCertStore::empty();
            roots.add(ca.cert.der().clone()).unwrap();
            let verifier = rustls::server::WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .unwrap();
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };
    let config = builder
        .with_single_cert(vec![cert.cert.der().clone()], private_key(cert))
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = connections.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let acceptor = acceptor.clone();
                    let behavior = behavior.clone();
                    tokio::spawn(async move {
                        if let Ok(stream) = acceptor.accept(socket).await {
                            serve(stream, behavior).await;
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, connections }
}

/// Answer every request on the connection until the peer goes away.
async fn serve<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S, behavior: Behavior) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        // requests carry no body: the head ends the request
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            buf.drain(..end + 4);
        }

        if !behavior.delay.is_zero() {
            tokio::time::sleep(behavior.delay).await;
        }

        let connection = if behavior.keep_alive { "keep-alive" } else { "close" };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n{}",
            behavior.body.len(),
            connection,
            behavior.body
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
        let _ = stream.flush().await;

        if !behavior.keep_alive {
            let _ = stream.shutdown().await;
            return;
        }
    }
}

/// Self-signed certificate for `localhost`.
pub fn self_signed() -> rcgen::CertifiedKey {
    rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap()
}

pub fn private_key(cert: &rcgen::CertifiedKey) -> PrivateKeyDer<'static> {
    PrivateKeyDer::Pkcs8(cert.key_pair.serialize_der().into())
}

pub fn certificate(cert: &rcgen::CertifiedKey) -> CertificateDer<'static> {
    cert.cert.der().clone()
}

/// Write PEM text to a temp file kept alive by the returned handle.
pub fn write_pem(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Trust store file holding `cert`.
pub fn trust_store(cert: &rcgen::CertifiedKey) -> tempfile::NamedTempFile {
    write_pem(&cert.cert.pem())
}

/// Key store file holding `cert` and its private key.
pub fn key_store(cert: &rcgen::CertifiedKey) -> tempfile::NamedTempFile {
    write_pem(&format!("{}{}", cert.cert.pem(), cert.key_pair.serialize_pem()))
}

/// Client config with short timeouts suited to tests.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.pool.connect_timeout_ms = 2000;
    config.pool.read_timeout_ms = 5000;
    config.pool.request_timeout_ms = 200;
    config.pool.max_total = 10;
    config.pool.max_per_route = 4;
    config
}

/// Trust configuration pointing at the given files.
pub fn trust_config(trust: Option<PathBuf>, key: Option<PathBuf>, allowed: &[&str]) -> TrustConfig {
    TrustConfig {
        trust_store_path: trust,
        client_key_store_path: key,
        allowed_hostnames: allowed.iter().map(|h| h.to_string()).collect(),
        ..TrustConfig::default()
    }
}

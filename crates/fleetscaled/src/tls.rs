//! HTTPS serving.
//!
//! Loads a PEM certificate chain and key into a rustls server config and
//! runs an accept loop that hands each TLS stream to hyper with the axum
//! router as the service.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Build a rustls server config from PEM files.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> anyhow::Result<rustls::ServerConfig> {
    let cert_file = File::open(cert_path)
        .with_context(|| format!("failed to open certificate {}", cert_path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificate {}", cert_path.display()))?;
    if certs.is_empty() {
        bail!("no certificates found in {}", cert_path.display());
    }

    let key_file = File::open(key_path)
        .with_context(|| format!("failed to open private key {}", key_path.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .with_context(|| format!("failed to parse private key {}", key_path.display()))?
        .with_context(|| format!("no private key found in {}", key_path.display()))?;

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .context("unsupported TLS protocol versions")?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .context("certificate and key do not match")?;

    debug!(cert = %cert_path.display(), "loaded TLS certificate");
    Ok(config)
}

/// Serve `router` over TLS until `shutdown` flips.
///
/// Spawns a tokio task per connection using HTTP/1.1. Handshake and
/// connection errors are logged and never stop the listener.
pub async fn serve(
    listener: TcpListener,
    config: rustls::ServerConfig,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let acceptor = TlsAcceptor::from(Arc::new(config));

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, peer_addr) = match accept_result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let router = router.clone();

                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            debug!(%peer_addr, error = %e, "TLS handshake failed");
                            return;
                        }
                    };

                    let svc = TowerToHyperService::new(router);
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(tls_stream), svc)
                        .await
                    {
                        debug!(%peer_addr, error = %e, "connection error");
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("HTTPS server shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use fleetscale_core::PolicyConfig;
    use rustls::pki_types::ServerName;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct TestCert {
        cert: tempfile::NamedTempFile,
        key: tempfile::NamedTempFile,
        der: rustls::pki_types::CertificateDer<'static>,
    }

    fn write_test_cert() -> TestCert {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let mut cert = tempfile::NamedTempFile::new().unwrap();
        cert.write_all(certified.cert.pem().as_bytes()).unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        key.write_all(certified.key_pair.serialize_pem().as_bytes()).unwrap();

        TestCert {
            cert,
            key,
            der: certified.cert.der().clone(),
        }
    }

    #[test]
    fn loads_pem_pair() {
        let tc = write_test_cert();
        assert!(load_server_config(tc.cert.path(), tc.key.path()).is_ok());
    }

    #[test]
    fn missing_certificate_is_an_error() {
        let tc = write_test_cert();
        let err = load_server_config(Path::new("/nonexistent/tls.crt"), tc.key.path()).unwrap_err();
        assert!(err.to_string().contains("failed to open certificate"));
    }

    #[test]
    fn empty_certificate_file_is_an_error() {
        let tc = write_test_cert();
        let empty = tempfile::NamedTempFile::new().unwrap();
        let err = load_server_config(empty.path(), tc.key.path()).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
    }

    #[test]
    fn key_file_without_key_is_an_error() {
        let tc = write_test_cert();
        // A certificate is not a private key.
        let err = load_server_config(tc.cert.path(), tc.cert.path()).unwrap_err();
        assert!(err.to_string().contains("no private key"));
    }

    #[tokio::test]
    async fn serves_health_over_tls_and_shuts_down() {
        let tc = write_test_cert();
        let server_config = load_server_config(tc.cert.path(), tc.key.path()).unwrap();
        let router = fleetscale_api::build_router(Arc::new(PolicyConfig::default()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, server_config, router, rx));

        let mut roots = rustls::RootCertStore::empty();
        roots.add(tc.der.clone()).unwrap();
        let client_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));

        let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
        let server_name = ServerName::try_from("localhost").unwrap();
        let mut stream = connector.connect(server_name, tcp).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("Healthy"), "{response}");

        tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}

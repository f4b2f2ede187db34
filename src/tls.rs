use anyhow::{Context, Result, anyhow};
use std::{io, sync::Arc};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{self, RootCertStore, pki_types::ServerName},
};

/// Client-side TLS used when the relay unwraps the remote connection.
#[derive(Clone)]
pub struct TlsTarget {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsTarget {
    /// Verifies the remote against the bundled web PKI roots.
    pub fn new(remote_address: &str) -> Result<Self> {
        Ok(Self::with_connector(
            build_connector(),
            server_name(remote_address)?,
        ))
    }

    #[must_use]
    pub const fn with_connector(connector: TlsConnector, server_name: ServerName<'static>) -> Self {
        Self {
            connector,
            server_name,
        }
    }

    pub async fn connect(&self, stream: TcpStream) -> io::Result<TlsStream<TcpStream>> {
        self.connector
            .connect(self.server_name.clone(), stream)
            .await
    }
}

#[must_use]
pub fn build_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Extracts the host part of a `host:port` address for SNI and certificate checks.
pub fn server_name(remote_address: &str) -> Result<ServerName<'static>> {
    let host = match remote_address.rsplit_once(':') {
        Some((host, _port)) => host,
        None => remote_address,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.is_empty() {
        return Err(anyhow!(
            "Remote address {remote_address} has no host to verify TLS against"
        ));
    }

    ServerName::try_from(host.to_owned())
        .with_context(|| format!("Invalid TLS server name: {host}"))
}

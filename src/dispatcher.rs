//! Resolves the configured link, binds the listener and hands every accepted
//! connection to its own relay task.
//!
//! Resolution and bind failures are fatal to the caller. Accept failures are
//! logged and skipped. Relays are spawned with no join point, so a failing or
//! panicking relay never reaches the accept loop or any other relay.
//!
//! There is no limit on concurrent connections; every accept spawns a relay.

use std::{borrow::Cow, future::Future, io, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, lookup_host};

use crate::config::{Config, Link, Settings};
use crate::counters::Counters;
use crate::logger::Logger;
use crate::pattern::{Matcher, Replacer, compile_matcher, compile_replacer};
use crate::relay::Relay;
use crate::tls::TlsTarget;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to resolve local address {address}: {source}")]
    ResolveLocal { address: String, source: io::Error },
    #[error("Failed to resolve remote address {address}: {source}")]
    ResolveRemote { address: String, source: io::Error },
    #[error("Failed to open local port to listen: {0}")]
    Bind(#[source] io::Error),
    #[error("Failed to set up TLS unwrapping: {0:#}")]
    Tls(anyhow::Error),
}

/// A link whose addresses have been looked up.
#[derive(Debug, Clone)]
pub struct ResolvedLink {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    /// The remote address as configured, used for TLS server name checks.
    pub remote_address: String,
}

/// Source of accepted connections for [`Dispatcher::serve`].
pub trait Accept: Send {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        Self::accept(self)
    }
}

pub async fn resolve(link: &Link) -> Result<ResolvedLink, DispatchError> {
    let local = resolve_address(&link.local_address, "0.0.0.0")
        .await
        .map_err(|source| DispatchError::ResolveLocal {
            address: link.local_address.clone(),
            source,
        })?;
    let remote = resolve_address(&link.remote_address, "127.0.0.1")
        .await
        .map_err(|source| DispatchError::ResolveRemote {
            address: link.remote_address.clone(),
            source,
        })?;

    Ok(ResolvedLink {
        local,
        remote,
        remote_address: link.remote_address.clone(),
    })
}

/// An address with no host (`":9999"`) gets `default_host`.
async fn resolve_address(address: &str, default_host: &str) -> io::Result<SocketAddr> {
    let address = if address.starts_with(':') {
        Cow::Owned(format!("{default_host}{address}"))
    } else {
        Cow::Borrowed(address)
    };

    lookup_host(&*address).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {address}"),
        )
    })
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, DispatchError> {
    TcpListener::bind(addr).await.map_err(DispatchError::Bind)
}

/// Resolves, binds, compiles the traffic patterns and serves forever.
pub async fn run(
    config: Config,
    log: Logger,
    counters: Arc<Counters>,
) -> Result<(), DispatchError> {
    let link = resolve(&config.link).await?;
    let listener = bind(link.local).await?;
    let dispatcher = Dispatcher::new(link, &config.settings, log, counters)?;
    dispatcher.serve(listener).await;
    Ok(())
}

pub struct Dispatcher {
    link: ResolvedLink,
    tls: Option<TlsTarget>,
    matcher: Option<Arc<Matcher>>,
    replacer: Option<Arc<Replacer>>,
    disable_nagle: bool,
    output_hex: bool,
    counters: Arc<Counters>,
    log: Logger,
}

impl Dispatcher {
    /// Invalid patterns only disable themselves; the only error is an unusable TLS server name.
    pub fn new(
        link: ResolvedLink,
        settings: &Settings,
        log: Logger,
        counters: Arc<Counters>,
    ) -> Result<Self, DispatchError> {
        let tls = if settings.unwrap_tls {
            Some(TlsTarget::new(&link.remote_address).map_err(DispatchError::Tls)?)
        } else {
            None
        };

        let matcher = compile_matcher(&settings.match_regex, &log, counters.clone()).map(Arc::new);
        let replacer = compile_replacer(&settings.replace_regex, &log).map(Arc::new);

        Ok(Self {
            link,
            tls,
            matcher,
            replacer,
            disable_nagle: settings.disable_nagles_algorithm,
            output_hex: settings.output_hex,
            counters,
            log,
        })
    }

    /// Accept loop. Only returns if the task driving it is dropped.
    pub async fn serve<A: Accept>(&self, mut listener: A) {
        loop {
            match listener.accept().await {
                Ok((conn, peer)) => self.dispatch(conn, peer),
                Err(e) => {
                    self.log
                        .warn(format_args!("Failed to accept connection '{e}'"));
                }
            }
        }
    }

    fn dispatch(&self, conn: TcpStream, peer: SocketAddr) {
        let id = self.counters.next_connection_id();
        let log = self.log.with_prefix(format!("Connection #{id:03} "));
        log.verbose(format_args!("Accepted {peer}"));

        if self.tls.is_some() {
            self.log.info("Unwrapping TLS");
        }

        let local_addr = conn.local_addr().unwrap_or(self.link.local);
        let relay = Relay::new(conn, local_addr, self.link.remote, self.tls.clone())
            .with_matcher(self.matcher.clone())
            .with_replacer(self.replacer.clone())
            .with_nagle_disabled(self.disable_nagle)
            .with_hex_output(self.output_hex)
            .with_logger(log);

        tokio::spawn(relay.start());
    }
}

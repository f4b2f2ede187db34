//! One relay per accepted connection: dials the remote, optionally over TLS,
//! and pumps bytes both ways until either side closes.
//!
//! Only the local to remote direction is inspected and rewritten. Every
//! failure is logged through the connection's own logger and ends just this
//! relay.

use anyhow::{Context, Result};
use std::{
    borrow::Cow,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::logger::Logger;
use crate::pattern::{Matcher, Replacer};
use crate::stream::RemoteStream;
use crate::tls::TlsTarget;

pub const BUFFER_SIZE: usize = 0xffff;

pub struct Relay {
    conn: TcpStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    tls: Option<TlsTarget>,
    matcher: Option<Arc<Matcher>>,
    replacer: Option<Arc<Replacer>>,
    log: Logger,
    nagle_disabled: bool,
    hex_output: bool,
}

impl Relay {
    /// `tls` set means the remote side is spoken to over TLS and the local side sees cleartext.
    #[must_use]
    pub fn new(
        conn: TcpStream,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        tls: Option<TlsTarget>,
    ) -> Self {
        Self {
            conn,
            local_addr,
            remote_addr,
            tls,
            matcher: None,
            replacer: None,
            log: Logger::default(),
            nagle_disabled: false,
            hex_output: false,
        }
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: Option<Arc<Matcher>>) -> Self {
        self.matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_replacer(mut self, replacer: Option<Arc<Replacer>>) -> Self {
        self.replacer = replacer;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    #[must_use]
    pub const fn with_nagle_disabled(mut self, disabled: bool) -> Self {
        self.nagle_disabled = disabled;
        self
    }

    #[must_use]
    pub const fn with_hex_output(mut self, hex_output: bool) -> Self {
        self.hex_output = hex_output;
        self
    }

    /// Runs until either side closes. Errors never escape.
    pub async fn start(self) {
        let remote = match connect_remote(self.remote_addr, self.tls.as_ref()).await {
            Ok(remote) => remote,
            Err(e) => {
                self.log
                    .warn(format_args!("Remote connection failed: {e:#}"));
                return;
            }
        };

        if self.nagle_disabled
            && let Err(e) = disable_nagle(&self.conn, &remote)
        {
            self.log
                .warn(format_args!("Failed to disable Nagle's algorithm: {e}"));
        }

        self.log.info(format_args!(
            "Opened {} >>> {}",
            self.local_addr, self.remote_addr
        ));

        let sent = AtomicU64::new(0);
        let received = AtomicU64::new(0);

        let outbound = Pump {
            direction: Direction::Outbound,
            matcher: self.matcher.as_deref(),
            replacer: self.replacer.as_deref(),
            log: &self.log,
            hex_output: self.hex_output,
            bytes: &sent,
        };
        let inbound = Pump {
            direction: Direction::Inbound,
            matcher: None,
            replacer: None,
            log: &self.log,
            hex_output: self.hex_output,
            bytes: &received,
        };

        let (local_reader, local_writer) = tokio::io::split(self.conn);
        let (remote_reader, remote_writer) = tokio::io::split(remote);

        tokio::select! {
            () = outbound.run(local_reader, remote_writer) => {},
            () = inbound.run(remote_reader, local_writer) => {},
        }

        self.log.info(format_args!(
            "Closed ({} bytes sent, {} bytes received)",
            sent.load(Ordering::Relaxed),
            received.load(Ordering::Relaxed)
        ));
    }
}

async fn connect_remote(addr: SocketAddr, tls: Option<&TlsTarget>) -> Result<RemoteStream> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?;

    match tls {
        None => Ok(RemoteStream::Plain(stream)),
        Some(target) => {
            let stream = target
                .connect(stream)
                .await
                .with_context(|| format!("TLS handshake with {addr} failed"))?;
            Ok(RemoteStream::Tls(Box::new(stream)))
        }
    }
}

fn disable_nagle(conn: &TcpStream, remote: &RemoteStream) -> io::Result<()> {
    conn.set_nodelay(true)?;
    remote.set_nodelay(true)
}

#[derive(Clone, Copy)]
enum Direction {
    /// local to remote
    Outbound,
    /// remote to local
    Inbound,
}

impl Direction {
    /// Arrow and verb for the per-chunk verbose line.
    const fn labels(self) -> (&'static str, &'static str) {
        match self {
            Self::Outbound => (">>>", "sent"),
            Self::Inbound => ("<<<", "received"),
        }
    }
}

struct Pump<'a> {
    direction: Direction,
    matcher: Option<&'a Matcher>,
    replacer: Option<&'a Replacer>,
    log: &'a Logger,
    hex_output: bool,
    bytes: &'a AtomicU64,
}

impl Pump<'_> {
    async fn run<R, W>(&self, mut reader: R, mut writer: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buffer).await {
                Ok(0) => return,
                Ok(n) => n,
                Err(e) => {
                    self.log.warn(format_args!("Read failed '{e}'"));
                    return;
                }
            };

            let chunk = self.transform(&buffer[..n]);
            if let Err(e) = writer.write_all(&chunk).await {
                self.log.warn(format_args!("Write failed '{e}'"));
                return;
            }
            self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);

            let (arrows, verb) = self.direction.labels();
            let len = chunk.len();
            self.log.verbose(format_args!("{arrows} {len} bytes {verb}"));
            if self.log.is_very_verbose() {
                self.log.very_verbose(self.dump(&chunk));
            }
        }
    }

    fn transform<'b>(&self, chunk: &'b [u8]) -> Cow<'b, [u8]> {
        if let Some(matcher) = self.matcher {
            matcher.inspect(chunk);
        }
        match self.replacer {
            Some(replacer) => replacer.apply(chunk),
            None => Cow::Borrowed(chunk),
        }
    }

    fn dump(&self, chunk: &[u8]) -> String {
        if self.hex_output {
            hex::encode(chunk)
        } else {
            String::from_utf8_lossy(chunk).into_owned()
        }
    }
}

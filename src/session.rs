//! One session per connection: the read loop, reply writer, timeouts, and
//! the STARTTLS upgrade point.
//!
//! The session owns the stream and the [`Engine`]; it slices the inbound
//! byte stream into newline-terminated chunks, feeds them to the engine, and
//! flushes whatever replies the engine queued, in order.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    connection::Connection,
    engine::{Engine, Protocol},
    error::SessionError,
    event::{Event, Payload},
    extension::Extension,
    internal, outgoing,
    reply::Reply,
};

/// Reads are done in large blocks; the RFC line limit is enforced separately.
const READ_BLOCK: usize = 512 * 1024;

/// RFC 5321 §4.5.3.1.6: command lines are at most 1000 bytes with CRLF.
const MAX_LINE: usize = 1000;

/// Certificate and key for the STARTTLS upgrade, as PEM file paths.
#[derive(Clone, Debug, Deserialize)]
pub struct TlsContext {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hostname used in the banner and in QUIT/timeout replies. Falls back
    /// to `$HOSTNAME`, then `"localhost"`.
    pub hostname: Option<String>,
    /// Full banner text override (without the 220 code).
    pub banner: Option<String>,
    /// Seconds to wait before flushing a 4xx/5xx reply.
    pub error_sleep_time: u64,
    /// Seconds of read inactivity before the session is torn down; 0 disables.
    pub idle_timeout: u64,
    pub tls: Option<TlsContext>,
}

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    engine: Engine,
    connection: Connection<Stream>,
    tls_context: Option<TlsContext>,
    error_sleep: Duration,
    idle_timeout: Option<Duration>,
    pending: Vec<u8>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    pub fn new(stream: Stream, protocol: Protocol, config: Config) -> Self {
        let hostname = config.hostname.unwrap_or_else(|| {
            std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
        });

        let mut engine = Engine::new(protocol, hostname);
        if let Some(banner) = config.banner {
            engine.set_banner(banner);
        }
        engine.set_tls_available(config.tls.is_some());

        Self {
            engine,
            connection: Connection::Plain { stream },
            tls_context: config.tls,
            error_sleep: Duration::from_secs(config.error_sleep_time),
            idle_timeout: (config.idle_timeout > 0)
                .then(|| Duration::from_secs(config.idle_timeout)),
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Register a decision function for a named event.
    pub fn set_callback<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&mut Engine, Payload<'_>) -> Reply + Send + Sync + 'static,
    {
        self.engine.set_callback(name, callback);
    }

    /// Register a protocol extension.
    pub fn register<E: Extension + 'static>(
        &mut self,
        extension: E,
    ) -> Result<(), crate::error::RegistrationError> {
        self.engine.register(extension)
    }

    /// Run the session to termination: banner, read loop, final flush.
    pub async fn run(mut self) -> Result<(), SessionError> {
        internal!("Connected");

        self.engine.banner_event();
        self.flush().await?;

        let mut buffer = vec![0u8; READ_BLOCK];
        loop {
            let read = match self.read_some(&mut buffer).await {
                Ok(read) => read,
                Err(SessionError::Timeout(secs)) => {
                    self.engine.timeout_event();
                    // the peer may already be gone; the 421 is best effort
                    let _ = self.flush().await;
                    internal!("Connection timed out after {secs}s");
                    return Err(SessionError::Timeout(secs));
                }
                Err(err) => return Err(err),
            };

            if read == 0 {
                internal!("Connection closed by peer");
                return Ok(());
            }
            self.pending.extend_from_slice(&buffer[..read]);

            // everything up to the last newline is ready for the engine;
            // the remainder waits for the next read
            if let Some(end) = self.pending.iter().rposition(|&byte| byte == b'\n') {
                let chunk: Vec<u8> = self.pending.drain(..=end).collect();
                let close = self.engine.feed(&chunk);
                self.flush().await?;

                if close {
                    return Ok(());
                }

                if self.engine.take_starttls_request() {
                    if let Some(tls_context) = self.tls_context.clone() {
                        let (connection, info) = self.connection.upgrade(&tls_context).await?;
                        self.connection = connection;
                        internal!(
                            level = DEBUG,
                            "Connection upgraded to {} with {}",
                            info.proto(),
                            info.cipher()
                        );

                        // RFC 3207 §4.2: forget everything learned before the
                        // handshake and wait for a fresh greeting
                        self.engine.reset_session();
                        self.engine.set_tls_available(false);
                        self.pending.clear();

                        self.engine.make_event(Event {
                            name: "STARTTLS",
                            success_reply: Some(Reply::silent()),
                            ..Event::default()
                        });
                        self.flush().await?;
                    }
                }
            }

            if !self.engine.collecting_input() && self.pending.len() > MAX_LINE {
                self.engine.line_too_long_event();
                self.flush().await?;
                return Ok(());
            }
        }
    }

    async fn read_some(&mut self, buffer: &mut [u8]) -> Result<usize, SessionError> {
        match self.idle_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.connection.receive(buffer)).await {
                    Ok(result) => Ok(result?),
                    Err(_) => Err(SessionError::Timeout(limit.as_secs())),
                }
            }
            None => Ok(self.connection.receive(buffer).await?),
        }
    }

    /// Write out everything the engine queued, oldest first.
    async fn flush(&mut self) -> Result<(), SessionError> {
        for reply in self.engine.drain_replies() {
            if reply.code >= 400 && !self.error_sleep.is_zero() {
                tokio::time::sleep(self.error_sleep).await;
            }

            for line in reply.wire_lines() {
                outgoing!("{line}");
                self.connection.send(&line).await?;
            }
        }

        Ok(())
    }
}

//! The byte transport under a session: a plain stream, upgradable to TLS
//! in place when STARTTLS succeeds.

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{
    rustls::{
        pki_types::{CertificateDer, PrivateKeyDer},
        ProtocolVersion, ServerConfig, ServerConnection, SupportedCipherSuite,
    },
    server::TlsStream,
    TlsAcceptor,
};

use crate::{
    error::{ConnectionResult, TlsError, TlsResult},
    session::TlsContext,
};

#[derive(Debug)]
pub struct TlsInfo {
    version: ProtocolVersion,
    ciphers: SupportedCipherSuite,
}

impl TlsInfo {
    fn of(conn: &ServerConnection) -> TlsResult<Self> {
        Ok(Self {
            version: conn
                .protocol_version()
                .ok_or_else(|| TlsError::ProtocolInfoMissing("protocol version".to_string()))?,
            ciphers: conn
                .negotiated_cipher_suite()
                .ok_or_else(|| TlsError::ProtocolInfoMissing("cipher suite".to_string()))?,
        })
    }

    #[must_use]
    pub fn proto(&self) -> String {
        self.version.as_str().unwrap_or("unknown").to_string()
    }

    #[must_use]
    pub fn cipher(&self) -> String {
        self.ciphers.suite().as_str().unwrap_or("unknown").to_string()
    }
}

fn pem_reader(path: &Path) -> std::io::Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

/// The full certificate chain from the configured PEM file.
fn read_certificates(tls_context: &TlsContext) -> TlsResult<Vec<CertificateDer<'static>>> {
    let path = tls_context.certificate.as_path();

    let chain: Vec<_> = pem_reader(path)
        .and_then(|mut reader| rustls_pemfile::certs(&mut reader).collect())
        .map_err(|source| TlsError::CertificateLoad {
            path: path.display().to_string(),
            source,
        })?;

    if chain.is_empty() {
        return Err(TlsError::CertificateLoad {
            path: path.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "no certificates in PEM file",
            ),
        });
    }

    Ok(chain)
}

/// The first private key in the configured PEM file, whatever its format;
/// `rustls_pemfile::private_key` sorts out PKCS#1/PKCS#8/SEC1 itself.
fn read_private_key(tls_context: &TlsContext) -> TlsResult<PrivateKeyDer<'static>> {
    let path = tls_context.key.as_path();

    pem_reader(path)
        .and_then(|mut reader| rustls_pemfile::private_key(&mut reader))
        .map_err(|e| TlsError::KeyLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| TlsError::KeyLoad {
            path: path.display().to_string(),
            reason: "no private key in PEM file".to_string(),
        })
}

pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    Plain { stream: Stream },
    Tls { stream: Box<TlsStream<Stream>> },
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Connection<Stream> {
    /// Write one reply line, appending CRLF.
    pub(crate) async fn send(&mut self, line: &str) -> ConnectionResult<()> {
        let mut buffer = String::with_capacity(line.len() + 2);
        buffer.push_str(line);
        buffer.push_str("\r\n");

        match self {
            Self::Plain { stream } => stream.write_all(buffer.as_bytes()).await?,
            Self::Tls { stream } => stream.write_all(buffer.as_bytes()).await?,
        }

        Ok(())
    }

    pub(crate) async fn receive(&mut self, buf: &mut [u8]) -> ConnectionResult<usize> {
        Ok(match self {
            Self::Plain { stream } => stream.read(buf).await?,
            Self::Tls { stream } => stream.read(buf).await?,
        })
    }

    /// Perform the server side of the TLS handshake over this stream.
    pub(crate) async fn upgrade(self, tls_context: &TlsContext) -> TlsResult<(Self, TlsInfo)> {
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(
                read_certificates(tls_context)?,
                read_private_key(tls_context)?,
            )?;

        let acceptor = TlsAcceptor::from(Arc::new(config));

        match self {
            Self::Plain { stream } => {
                let stream = acceptor.accept(stream).await?;
                let info = TlsInfo::of(stream.get_ref().1)?;

                Ok((
                    Self::Tls {
                        stream: Box::new(stream),
                    },
                    info,
                ))
            }
            Self::Tls { .. } => Err(TlsError::UpgradeFailed(
                "session is already encrypted".to_string(),
            )),
        }
    }
}

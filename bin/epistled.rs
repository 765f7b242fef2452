use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context as _;
use clap::Parser;
use epistle::{
    extensions::{EightBitMime, Pipelining, StartTls},
    Config, Protocol, Reply, Session, TlsContext,
};
use tokio::net::TcpListener;

/// A small ESMTP server that accepts everything and logs what it gets.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:2525")]
    listen: SocketAddr,

    /// Hostname announced in the banner
    #[arg(long)]
    hostname: Option<String>,

    /// Seconds a connection may stay idle before being dropped
    #[arg(long, default_value_t = 300)]
    idle_timeout: u64,

    /// PEM certificate enabling STARTTLS (requires --tls-key)
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key enabling STARTTLS (requires --tls-cert)
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    epistle::logging::init();
    let args = Args::parse();

    let tls = match (&args.tls_cert, &args.tls_key) {
        (Some(certificate), Some(key)) => Some(TlsContext {
            certificate: certificate.clone(),
            key: key.clone(),
        }),
        _ => None,
    };

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    tracing::info!("listening on {}", args.listen);

    loop {
        let (stream, peer) = listener.accept().await?;

        let config = Config {
            hostname: args.hostname.clone(),
            idle_timeout: args.idle_timeout,
            tls: tls.clone(),
            ..Config::default()
        };

        tokio::spawn(async move {
            let mut session = Session::new(stream, Protocol::Esmtp, config);

            for result in [
                session.register(Pipelining::default()),
                session.register(EightBitMime),
                session.register(StartTls),
            ] {
                if let Err(err) = result {
                    tracing::error!("extension registration failed: {err}");
                    return;
                }
            }

            session.set_callback("DATA", |engine, payload| {
                tracing::info!(
                    sender = engine.sender().unwrap_or("<>"),
                    recipients = engine.recipients().len(),
                    bytes = payload.data.map_or(0, <[u8]>::len),
                    "message accepted"
                );
                Reply::accepted(250u16, "message queued")
            });

            if let Err(err) = session.run().await {
                tracing::warn!("session with {peer} ended: {err}");
            }
        });
    }
}

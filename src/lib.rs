//! An embeddable SMTP/ESMTP/LMTP server engine.
//!
//! `epistle` drives the server side of a mail-transfer session: it parses
//! the command stream, walks the envelope state machine, and answers every
//! command with the right reply, while the embedding application decides
//! the things only it can decide (which recipients exist, what happens to an
//! accepted message) through named callbacks.
//!
//! ```no_run
//! use epistle::{Config, Protocol, Reply, Session};
//! use epistle::extensions::{EightBitMime, Pipelining};
//!
//! # async fn serve(stream: tokio::net::TcpStream) -> Result<(), epistle::SessionError> {
//! let mut session = Session::new(stream, Protocol::Esmtp, Config::default());
//! session.register(Pipelining::default()).unwrap();
//! session.register(EightBitMime).unwrap();
//! session.set_callback("DATA", |_engine, payload| {
//!     let bytes = payload.data.map_or(0, <[u8]>::len);
//!     Reply::accepted(250u16, format!("queued {bytes} bytes"))
//! });
//! session.run().await
//! # }
//! ```
//!
//! The protocol core ([`Engine`]) is synchronous and I/O-free; the
//! [`Session`] wraps it around any `AsyncRead + AsyncWrite` stream and owns
//! every await point. Extensions ([`Extension`]) can add verbs, advertise
//! EHLO keywords, subscribe to MAIL/RCPT options, and rewrite replies;
//! PIPELINING, 8BITMIME, STARTTLS and XFORWARD ship built in.

pub mod command;
pub mod connection;
pub mod engine;
pub mod error;
pub mod event;
pub mod extension;
pub mod extensions;
pub mod logging;
pub mod reply;
pub mod session;
pub mod status;

pub use engine::{Engine, Protocol};
pub use error::{RegistrationError, SessionError};
pub use event::{Event, Payload};
pub use extension::{Extension, OptionSubscription};
pub use reply::{OutgoingReply, Reply, ReplyCode, Verdict};
pub use session::{Config, Session, TlsContext};
pub use status::Status;
pub use tracing;

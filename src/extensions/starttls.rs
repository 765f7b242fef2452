//! Opportunistic TLS (RFC 3207).
//!
//! The verb only reports readiness; the owning session performs the actual
//! handshake once the 220 is flushed, then resets the engine to its
//! just-connected state.

use std::sync::Arc;

use crate::{
    engine::{Engine, VerbHandler},
    extension::Extension,
    status::Status,
};

#[derive(Default)]
pub struct StartTls;

impl Extension for StartTls {
    fn keyword(&self) -> &'static str {
        "STARTTLS"
    }

    fn verbs(&self) -> Vec<(&'static str, VerbHandler)> {
        vec![("STARTTLS", Arc::new(starttls))]
    }
}

fn starttls(engine: &mut Engine, params: &str) -> bool {
    if !params.is_empty() {
        // RFC 3207 §4: STARTTLS takes no parameters
        engine.reply(
            Status::NotImplemented,
            "Syntax error (no parameters allowed)",
        );
        return false;
    }

    if !engine.tls_available() {
        engine.reply(
            Status::TlsUnavailable,
            "TLS not available due to temporary reason",
        );
        return false;
    }

    engine.reply(Status::ServiceReady, "Ready to start TLS");
    engine.request_starttls();

    false
}

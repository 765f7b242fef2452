//! The protocol-extension surface.
//!
//! An extension can add verbs, advertise a keyword in the EHLO/LHLO reply,
//! subscribe to MAIL/RCPT options, interpose on replies, and react to the
//! session entering or leaving extended mode. Extensions are owned by the
//! engine; every hook receives the engine as an argument, so no extension
//! needs to hold a reference back to its session.

use crate::engine::{Engine, OptionHandler, ReplyFilter, VerbHandler};

/// An option subscription: `handler` runs for every `KEY=VALUE` the client
/// attaches to the subscribed verb.
pub struct OptionSubscription {
    /// `"MAIL"` or `"RCPT"`; anything else is a registration error.
    pub verb: &'static str,
    pub key: &'static str,
    pub handler: OptionHandler,
}

pub trait Extension: Send + Sync {
    /// The keyword advertised in the EHLO/LHLO response.
    fn keyword(&self) -> &'static str;

    /// Optional parameters appended to the advertised keyword.
    fn parameters(&self) -> &[&'static str] {
        &[]
    }

    /// Verbs to install; these may override existing table entries.
    fn verbs(&self) -> Vec<(&'static str, VerbHandler)> {
        Vec::new()
    }

    /// MAIL/RCPT option subscriptions.
    fn options(&self) -> Vec<OptionSubscription> {
        Vec::new()
    }

    /// Reply transformers, keyed by the verb whose replies they rewrite.
    /// The verb must already exist in the verb table at registration time.
    fn reply_filters(&self) -> Vec<(&'static str, ReplyFilter)> {
        Vec::new()
    }

    /// Called whenever EHLO/LHLO or HELO flips extended mode.
    fn extend_mode_changed(&self, engine: &mut Engine, enabled: bool) {
        let _ = (engine, enabled);
    }
}

//! The protocol engine: verb dispatch, the event pipeline, and the
//! extension registry.
//!
//! The engine is synchronous and performs no I/O. It consumes chunks of the
//! input byte stream via [`Engine::feed`] and queues replies that the owning
//! session drains and writes. All protocol state (envelope, verb table,
//! callbacks, extension subscriptions) lives here, so every rule is
//! testable without a socket or a runtime.

use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    command,
    error::RegistrationError,
    event::{Callback, Event, Payload},
    extension::{Extension, OptionSubscription},
    incoming,
    reply::{OutgoingReply, Reply, ReplyCode, Verdict},
    status::Status,
};

mod data;
mod verbs;

/// A verb handler: receives the engine and the parameter rest of the command
/// line, returns whether the connection should close.
pub type VerbHandler = Arc<dyn Fn(&mut Engine, &str) -> bool + Send + Sync>;

/// The operation splitter slot. The default handler dispatches one command
/// per chunk; PIPELINING swaps in a multi-command splitter and restores the
/// previous handler when extended mode ends.
pub type OperationHandler = Arc<dyn Fn(&mut Engine, &[u8]) -> bool + Send + Sync>;

/// A one-shot claim on the next input chunk, used for DATA bodies. The slot
/// is cleared before invocation so the handler may re-arm itself.
pub type InputHandler = Arc<dyn Fn(&mut Engine, &[u8]) -> bool + Send + Sync>;

/// A MAIL/RCPT option handler: `(engine, verb, address, key, value)`.
pub type OptionHandler = Arc<dyn Fn(&mut Engine, &str, &str, &str, &str) + Send + Sync>;

/// A reply transformer: `(verb, code, message)` in, `(code, message)` out.
/// A returned code of 0 suppresses the reply.
pub type ReplyFilter = Arc<dyn Fn(&str, u16, &str) -> (u16, String) + Send + Sync>;

const APP_NAME: &str = concat!("epistle/", env!("CARGO_PKG_VERSION"));

/// Which protocol variant the engine speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Smtp,
    Esmtp,
    Lmtp,
}

impl Protocol {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Smtp => "SMTP",
            Self::Esmtp => "ESMTP",
            Self::Lmtp => "LMTP",
        }
    }
}

/// The reverse path negotiated by MAIL, including its pre-greeting states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReversePath {
    /// No HELO/EHLO/LHLO yet; MAIL is a 503.
    Initial,
    /// Greeted, no MAIL yet.
    Greeted,
    /// MAIL accepted.
    Sender(String),
}

pub struct Engine {
    protocol: Protocol,
    hostname: String,
    banner: Option<String>,

    pub(crate) reverse_path: ReversePath,
    /// `None` until MAIL succeeds; then the recipients in RCPT order.
    pub(crate) forward_path: Option<Vec<String>>,
    pub(crate) maildata_path: bool,
    pub(crate) data_buf: Vec<u8>,
    /// Body bytes withheld from `data_buf` so `<CRLF>.<CRLF>` is seen even
    /// when it straddles a chunk boundary. Never longer than 5 bytes.
    pub(crate) last_chunk: Vec<u8>,
    pub(crate) extend_mode: bool,
    data_handle_more_data: bool,

    next_input: Option<InputHandler>,
    operation: OperationHandler,
    verbs: AHashMap<String, VerbHandler>,
    callbacks: AHashMap<String, Callback>,
    x_option: AHashMap<&'static str, AHashMap<String, OptionHandler>>,
    x_reply: AHashMap<String, Vec<ReplyFilter>>,
    extensions: Vec<Arc<dyn Extension>>,
    pub(crate) forwarded: AHashMap<String, String>,

    do_job: bool,
    outgoing: Vec<OutgoingReply>,
    tls_available: bool,
    starttls_pending: bool,
}

impl Engine {
    #[must_use]
    pub fn new(protocol: Protocol, hostname: impl Into<String>) -> Self {
        let mut x_option = AHashMap::new();
        x_option.insert("MAIL", AHashMap::new());
        x_option.insert("RCPT", AHashMap::new());

        let mut engine = Self {
            protocol,
            hostname: hostname.into(),
            banner: None,
            reverse_path: ReversePath::Initial,
            forward_path: None,
            maildata_path: false,
            data_buf: Vec::new(),
            last_chunk: Vec::new(),
            extend_mode: false,
            data_handle_more_data: false,
            next_input: None,
            operation: Arc::new(Self::process_operation),
            verbs: AHashMap::new(),
            callbacks: AHashMap::new(),
            x_option,
            x_reply: AHashMap::new(),
            extensions: Vec::new(),
            forwarded: AHashMap::new(),
            do_job: true,
            outgoing: Vec::new(),
            tls_available: false,
            starttls_pending: false,
        };

        engine.install_verbs();

        if protocol == Protocol::Lmtp {
            // RFC 2033 §4.2
            engine
                .register(crate::extensions::Pipelining::default())
                .expect("PIPELINING subscribes no options or reply filters");
        }

        engine
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Hand one chunk of client input to the engine.
    ///
    /// A pending one-shot input handler (armed by DATA) claims the chunk;
    /// otherwise the current operation splitter dispatches it. Returns
    /// whether the connection should close.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if let Some(handler) = self.next_input.take() {
            handler(self, chunk)
        } else {
            let operation = Arc::clone(&self.operation);
            operation(self, chunk)
        }
    }

    /// The default operation splitter: exactly one command per chunk.
    pub(crate) fn process_operation(&mut self, chunk: &[u8]) -> bool {
        let line = String::from_utf8_lossy(chunk);
        let (verb, params) = command::tokenize(&line);

        if params.contains('\r') || params.contains('\n') {
            // grouped commands need the PIPELINING extension
            self.reply(
                Status::PrematureCommand,
                "Command received prior to completion of previous command sequence",
            );
            return false;
        }

        self.process_command(&verb, &params)
    }

    /// Look up and invoke a verb handler. 500 on unknown verbs.
    pub fn process_command(&mut self, verb: &str, params: &str) -> bool {
        incoming!("{verb} {params}");

        match self.verbs.get(verb).cloned() {
            Some(handler) => handler(self, params),
            None => {
                self.reply(Status::UnknownCommand, "Syntax error: unrecognized command");
                false
            }
        }
    }

    /// Arm a handler to claim the next input chunk instead of the dispatcher.
    pub fn next_input_to(&mut self, handler: InputHandler) {
        self.next_input = Some(handler);
    }

    /// True while a DATA body is being collected.
    #[must_use]
    pub fn collecting_input(&self) -> bool {
        self.next_input.is_some()
    }

    /// Install a new operation splitter, returning the previous one so the
    /// caller can restore it later.
    pub fn swap_operation_handler(&mut self, handler: OperationHandler) -> OperationHandler {
        std::mem::replace(&mut self.operation, handler)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Register a decision function for a named event.
    pub fn set_callback<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&mut Engine, Payload<'_>) -> Reply + Send + Sync + 'static,
    {
        self.callbacks.insert(name.to_string(), Arc::new(callback));
    }

    /// Suppress (or re-enable) the current event's side effects. Only
    /// meaningful from within a callback.
    pub fn set_do_job(&mut self, enabled: bool) {
        self.do_job = enabled;
    }

    /// Run an event through the decision pipeline: consult the callback,
    /// apply defaults, run side effects, and queue at most one reply.
    pub fn make_event(&mut self, event: Event<'_>) -> Verdict {
        let Event {
            name,
            args,
            data,
            on_success,
            on_failure,
            default_reply,
            success_reply,
            failure_reply,
        } = event;

        self.do_job = true;

        let mut reply = match self.callbacks.get(name).cloned() {
            Some(callback) => callback(
                self,
                Payload {
                    name,
                    args: &args,
                    data: data.as_deref(),
                },
            ),
            None => Reply::default(),
        };

        // an undecided callback falls back to the event default, then to
        // plain acceptance
        if reply.verdict == Verdict::Undecided {
            if let Some(default) = default_reply {
                reply = default;
            }
            if reply.verdict == Verdict::Undecided {
                reply.verdict = Verdict::Success;
            }
        }

        let verdict = reply.verdict;

        if self.do_job {
            match verdict {
                Verdict::Success => {
                    if let Some(job) = on_success {
                        job(self);
                    }
                }
                _ => {
                    if let Some(job) = on_failure {
                        job(self);
                    }
                }
            }
        }

        // every command gets at most one reply
        let (code, message) = match reply.code {
            ReplyCode::Unset => {
                let (fallback, configured) = match verdict {
                    Verdict::Success => (Status::Ok, success_reply),
                    _ => (Status::Error, failure_reply),
                };
                match configured {
                    Some(configured) => match configured.code {
                        ReplyCode::Unset => (ReplyCode::Code(fallback.into()), configured.message),
                        code => (code, configured.message),
                    },
                    None => (ReplyCode::Code(fallback.into()), String::new()),
                }
            }
            code => (code, reply.message),
        };

        if let ReplyCode::Code(code) = code {
            self.handle_reply(name, code, message);
        }

        verdict
    }

    // ------------------------------------------------------------------
    // Replies
    // ------------------------------------------------------------------

    /// Queue a reply directly, bypassing reply interposition.
    pub fn reply(&mut self, code: impl Into<u16>, message: impl Into<String>) {
        self.outgoing.push(OutgoingReply {
            code: code.into(),
            message: message.into(),
        });
    }

    /// Queue an event reply, first chaining any reply filters subscribed to
    /// the verb (extended mode only).
    pub(crate) fn handle_reply(&mut self, verb: &str, mut code: u16, mut message: String) {
        if self.extend_mode {
            if let Some(filters) = self.x_reply.get(verb).cloned() {
                for filter in filters {
                    let (new_code, new_message) = filter(verb, code, &message);
                    code = new_code;
                    message = new_message;
                }
            }
        }

        if code != 0 {
            self.reply(code, message);
        }
    }

    /// Take everything queued for the wire, in command order.
    pub fn drain_replies(&mut self) -> Vec<OutgoingReply> {
        std::mem::take(&mut self.outgoing)
    }

    // ------------------------------------------------------------------
    // Verb table
    // ------------------------------------------------------------------

    /// Define (or replace) a verb handler.
    pub fn def_verb<F>(&mut self, verb: &str, handler: F)
    where
        F: Fn(&mut Engine, &str) -> bool + Send + Sync + 'static,
    {
        self.verbs
            .insert(verb.to_ascii_uppercase(), Arc::new(handler));
    }

    /// Remove a verb from the table.
    pub fn undef_verb(&mut self, verb: &str) {
        self.verbs.remove(verb);
    }

    /// The verbs currently understood by the session.
    #[must_use]
    pub fn list_verbs(&self) -> Vec<String> {
        self.verbs.keys().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Extensions
    // ------------------------------------------------------------------

    /// Register a protocol extension: install its verbs, then its MAIL/RCPT
    /// option subscriptions, then its reply filters.
    pub fn register<E: Extension + 'static>(
        &mut self,
        extension: E,
    ) -> Result<(), RegistrationError> {
        let extension = Arc::new(extension);

        for (verb, handler) in extension.verbs() {
            self.verbs.insert(verb.to_ascii_uppercase(), handler);
        }
        for subscription in extension.options() {
            self.sub_option(subscription)?;
        }
        for (verb, filter) in extension.reply_filters() {
            self.sub_reply(verb, filter)?;
        }

        self.extensions.push(extension);
        Ok(())
    }

    fn sub_option(&mut self, subscription: OptionSubscription) -> Result<(), RegistrationError> {
        let OptionSubscription { verb, key, handler } = subscription;

        let Some(keys) = self.x_option.get_mut(verb) else {
            return Err(RegistrationError::OptionVerb(verb.to_string()));
        };
        if keys.contains_key(key) {
            return Err(RegistrationError::DuplicateOption(key.to_string()));
        }

        keys.insert(key.to_string(), handler);
        Ok(())
    }

    fn sub_reply(&mut self, verb: &str, filter: ReplyFilter) -> Result<(), RegistrationError> {
        if !self.verbs.contains_key(verb) {
            return Err(RegistrationError::UnknownVerb(verb.to_string()));
        }

        self.x_reply.entry(verb.to_string()).or_default().push(filter);
        Ok(())
    }

    /// Flip extended mode and notify every registered extension.
    pub fn set_extend_mode(&mut self, enabled: bool) {
        self.extend_mode = enabled;
        let extensions = self.extensions.clone();
        for extension in &extensions {
            extension.extend_mode_changed(self, enabled);
        }
    }

    /// Dispatch MAIL/RCPT options to their subscribed handlers.
    ///
    /// Outside extended mode any option is a 555; inside, each `KEY=VALUE`
    /// token is routed by key, and an unsubscribed key aborts with 555.
    /// Returns false when a reply was already queued and the verb should bail.
    pub(crate) fn handle_options(
        &mut self,
        verb: &'static str,
        address: &str,
        options: &[String],
    ) -> bool {
        if !options.is_empty() && !self.extend_mode {
            self.reply(
                Status::UnknownOption,
                format!("Unsupported option: {}", options[0]),
            );
            return false;
        }

        for option in options {
            let (key, value) = option
                .split_once('=')
                .unwrap_or((option.as_str(), ""));

            match self
                .x_option
                .get(verb)
                .and_then(|keys| keys.get(key))
                .cloned()
            {
                Some(handler) => handler(self, verb, address, key, value),
                None => {
                    self.reply(Status::UnknownOption, format!("Unsupported option: {key}"));
                    return false;
                }
            }
        }

        true
    }

    // ------------------------------------------------------------------
    // Envelope state
    // ------------------------------------------------------------------

    pub(crate) fn step_maildata(&mut self, ready: bool) {
        self.maildata_path = ready;
        if !ready {
            self.data_buf.clear();
        }
    }

    /// HELO/EHLO/LHLO/RSET landing state: greeted, empty envelope.
    pub(crate) fn reset_envelope(&mut self) {
        self.reverse_path = ReversePath::Greeted;
        self.forward_path = None;
        self.step_maildata(false);
    }

    /// Reset everything, as if the connection had just been accepted. Used
    /// after a successful STARTTLS handshake (RFC 3207 §4.2).
    pub(crate) fn reset_session(&mut self) {
        self.set_extend_mode(false);
        self.reverse_path = ReversePath::Initial;
        self.forward_path = None;
        self.step_maildata(false);
        self.last_chunk.clear();
        self.next_input = None;
        self.data_handle_more_data = false;
        self.forwarded.clear();
    }

    // ------------------------------------------------------------------
    // Introspection and configuration
    // ------------------------------------------------------------------

    /// The accepted sender address, once MAIL has succeeded.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        match &self.reverse_path {
            ReversePath::Sender(address) => Some(address),
            _ => None,
        }
    }

    /// Accepted recipients in RCPT order.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        self.forward_path.as_deref().unwrap_or(&[])
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn protoname(&self) -> &'static str {
        self.protocol.name()
    }

    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Attributes collected by the XFORWARD extension.
    #[must_use]
    pub fn forwarded_attributes(&self) -> &AHashMap<String, String> {
        &self.forwarded
    }

    /// Override the banner text (the `220` greeting minus the code).
    pub fn set_banner(&mut self, banner: impl Into<String>) {
        self.banner = Some(banner.into());
    }

    /// Whether bytes after a DATA terminator are fed back into the
    /// dispatcher (enabled by PIPELINING) instead of drawing a 453.
    #[must_use]
    pub fn handles_more_data(&self) -> bool {
        self.data_handle_more_data
    }

    pub fn set_handle_more_data(&mut self, enabled: bool) {
        self.data_handle_more_data = enabled;
    }

    #[must_use]
    pub fn tls_available(&self) -> bool {
        self.tls_available
    }

    pub fn set_tls_available(&mut self, available: bool) {
        self.tls_available = available;
    }

    /// Called by the STARTTLS verb once the `220 Ready to start TLS` reply is
    /// queued; the session performs the handshake after flushing.
    pub fn request_starttls(&mut self) {
        self.starttls_pending = true;
    }

    pub(crate) fn take_starttls_request(&mut self) -> bool {
        std::mem::take(&mut self.starttls_pending)
    }

    // ------------------------------------------------------------------
    // Connection-level events
    // ------------------------------------------------------------------

    pub(crate) fn banner_event(&mut self) {
        let banner = self.banner.clone().unwrap_or_else(|| {
            format!(
                "{} {} {} Service ready",
                self.hostname,
                self.protocol.name(),
                APP_NAME
            )
        });

        self.make_event(Event {
            name: "banner",
            success_reply: Some(Reply::accepted(Status::ServiceReady, banner)),
            failure_reply: Some(Reply::silent()),
            ..Event::default()
        });
    }

    pub(crate) fn timeout_event(&mut self) {
        let message = format!(
            "{} Timeout exceeded, closing transmission channel",
            self.hostname
        );
        self.make_event(Event {
            name: "timeout",
            success_reply: Some(Reply::accepted(Status::Unavailable, message)),
            ..Event::default()
        });
    }

    pub(crate) fn line_too_long_event(&mut self) {
        self.make_event(Event {
            name: "linetoolong",
            success_reply: Some(Reply::accepted(Status::ExceededStorage, "line too long")),
            ..Event::default()
        });
    }
}

//! Named decision points tying user callbacks to automatic replies.
//!
//! Every command the engine understands funnels through
//! [`Engine::make_event`](crate::Engine::make_event): the registered callback
//! (if any) decides, the event's side effects run, and exactly one reply is
//! resolved and queued unless the reply is silent.

use std::sync::Arc;

use crate::{engine::Engine, reply::Reply};

/// The view a callback gets of the event being decided.
#[derive(Clone, Copy, Debug)]
pub struct Payload<'a> {
    /// Event name, e.g. `"RCPT"` or `"DATA"`.
    pub name: &'a str,
    /// String arguments: addresses, hostnames, XFORWARD pairs.
    pub args: &'a [String],
    /// Raw body bytes for `DATA` and `DATA-PART` events.
    pub data: Option<&'a [u8]>,
}

/// A user-supplied decision function.
pub type Callback = Arc<dyn Fn(&mut Engine, Payload<'_>) -> Reply + Send + Sync>;

/// Envelope mutation run when the event resolves.
pub type SideEffect = Box<dyn FnOnce(&mut Engine)>;

/// One protocol decision point.
///
/// `default_reply` is consulted only when the callback (or its absence) leaves
/// the verdict undecided; `success_reply`/`failure_reply` supply the code and
/// message when the callback decided but named no code.
#[derive(Default)]
pub struct Event<'e> {
    pub name: &'e str,
    pub args: Vec<String>,
    pub data: Option<Arc<[u8]>>,
    pub on_success: Option<SideEffect>,
    pub on_failure: Option<SideEffect>,
    pub default_reply: Option<Reply>,
    pub success_reply: Option<Reply>,
    pub failure_reply: Option<Reply>,
}

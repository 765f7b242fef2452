//! Replies as decided by callbacks and resolved by the event engine.

/// A callback's decision about the event it was consulted on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verdict {
    /// The callback declined to decide; event defaults apply.
    #[default]
    Undecided,
    Failure,
    Success,
}

/// The numeric part of a reply, before resolution against event defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplyCode {
    /// Use the default code for this event.
    #[default]
    Unset,
    /// Suppress the reply entirely.
    Silent,
    Code(u16),
}

/// What a callback hands back to the event engine.
///
/// `Reply::default()` is fully undecided: the engine fills in verdict, code
/// and message from the event's configured defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub verdict: Verdict,
    pub code: ReplyCode,
    pub message: String,
}

impl Reply {
    /// Accept, letting the event pick its default success code and message.
    #[must_use]
    pub fn accept() -> Self {
        Self {
            verdict: Verdict::Success,
            ..Self::default()
        }
    }

    /// Accept with an explicit code and message.
    #[must_use]
    pub fn accepted(code: impl Into<u16>, message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Success,
            code: ReplyCode::Code(code.into()),
            message: message.into(),
        }
    }

    /// Reject with an explicit code and message.
    #[must_use]
    pub fn rejected(code: impl Into<u16>, message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Failure,
            code: ReplyCode::Code(code.into()),
            message: message.into(),
        }
    }

    /// A reply that produces no output on the wire.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            code: ReplyCode::Silent,
            ..Self::default()
        }
    }
}

/// A resolved reply queued for the writer, in command order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingReply {
    pub code: u16,
    pub message: String,
}

impl OutgoingReply {
    /// Format for the wire, one entry per physical line (without CRLF).
    ///
    /// All lines but the last separate code and text with a dash, per
    /// RFC 5321 §4.2.1. An empty message falls back to "Ok" or "Failure"
    /// depending on the code class.
    #[must_use]
    pub fn wire_lines(&self) -> Vec<String> {
        let message = if self.message.is_empty() {
            if self.code >= 400 {
                "Failure"
            } else {
                "Ok"
            }
        } else {
            self.message.as_str()
        };

        let lines: Vec<&str> = message
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        let last = lines.len() - 1;

        lines
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let sep = if index == last { ' ' } else { '-' };
                format!("{}{}{}", self.code, sep, line)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{OutgoingReply, Reply, ReplyCode, Verdict};

    #[test]
    fn single_line() {
        let reply = OutgoingReply {
            code: 250,
            message: "sender a@b OK".to_string(),
        };
        assert_eq!(reply.wire_lines(), vec!["250 sender a@b OK".to_string()]);
    }

    #[test]
    fn multi_line_continuation() {
        let reply = OutgoingReply {
            code: 250,
            message: "host Service ready\nPIPELINING\n8BITMIME".to_string(),
        };
        assert_eq!(
            reply.wire_lines(),
            vec![
                "250-host Service ready".to_string(),
                "250-PIPELINING".to_string(),
                "250 8BITMIME".to_string(),
            ]
        );
    }

    #[test]
    fn empty_message_defaults() {
        let ok = OutgoingReply {
            code: 250,
            message: String::new(),
        };
        assert_eq!(ok.wire_lines(), vec!["250 Ok".to_string()]);

        let failed = OutgoingReply {
            code: 550,
            message: String::new(),
        };
        assert_eq!(failed.wire_lines(), vec!["550 Failure".to_string()]);
    }

    #[test]
    fn constructors() {
        assert_eq!(Reply::default().verdict, Verdict::Undecided);
        assert_eq!(Reply::accept().code, ReplyCode::Unset);
        assert_eq!(
            Reply::rejected(554u16, "denied").code,
            ReplyCode::Code(554)
        );
        assert_eq!(Reply::silent().code, ReplyCode::Silent);
    }
}

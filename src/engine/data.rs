//! The DATA body accumulator.
//!
//! The end-of-data sequence `<CRLF>.<CRLF>` can straddle read boundaries, so
//! up to 5 trailing bytes are withheld from `data_buf` between chunks;
//! `data_buf + last_chunk` always equals the body bytes received so far.
//! Bare LF is accepted everywhere the line reader accepts it.

use std::sync::Arc;

use crate::{event::Event, reply::Reply, status::Status};

use super::{Engine, Protocol};

struct Terminator {
    /// End of the body proper, keeping the newline that closed the last line.
    body_end: usize,
    /// Start of whatever the client sent after the terminator.
    resume: usize,
}

/// Locate `\r?\n "." \r?\n` in `probe`. `allow_at_start` covers the empty
/// message, where the terminating dot line is the first thing received.
fn find_terminator(probe: &[u8], allow_at_start: bool) -> Option<Terminator> {
    if allow_at_start {
        if probe.starts_with(b".\n") {
            return Some(Terminator {
                body_end: 0,
                resume: 2,
            });
        }
        if probe.starts_with(b".\r\n") {
            return Some(Terminator {
                body_end: 0,
                resume: 3,
            });
        }
    }

    for (index, _) in probe.iter().enumerate().filter(|(_, byte)| **byte == b'\n') {
        if probe.get(index + 1) != Some(&b'.') {
            continue;
        }
        match probe.get(index + 2) {
            Some(b'\n') => {
                return Some(Terminator {
                    body_end: index + 1,
                    resume: index + 3,
                });
            }
            Some(b'\r') if probe.get(index + 3) == Some(&b'\n') => {
                return Some(Terminator {
                    body_end: index + 1,
                    resume: index + 4,
                });
            }
            _ => {}
        }
    }

    None
}

/// Remove one leading `.` from every body line (RFC 5321 §4.5.2).
fn unstuff(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len());
    let mut at_line_start = true;

    for &byte in buf {
        if at_line_start && byte == b'.' {
            at_line_start = false;
            continue;
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }

    out
}

impl Engine {
    /// Accumulate one chunk of DATA body, watching for the terminator.
    pub(crate) fn data_part(&mut self, chunk: &[u8]) -> bool {
        let mut probe = Vec::with_capacity(self.last_chunk.len() + chunk.len());
        probe.append(&mut self.last_chunk);
        probe.extend_from_slice(chunk);

        if let Some(terminator) = find_terminator(&probe, self.data_buf.is_empty()) {
            let more_data = probe[terminator.resume..].to_vec();
            if !more_data.is_empty() && !self.handles_more_data() {
                // a command arrived glued to the end-of-data indicator
                self.reply(
                    Status::PrematureCommand,
                    "Command received prior to completion of previous command sequence",
                );
                return false;
            }

            self.data_buf.extend_from_slice(&probe[..terminator.body_end]);
            self.data_buf = unstuff(&self.data_buf);

            return self.data_finished(&more_data);
        }

        // no terminator yet: commit all but the last 5 bytes
        let keep = probe.len().min(5);
        let tail = probe.split_off(probe.len() - keep);
        self.last_chunk = tail;

        let committed: Arc<[u8]> = probe.into();
        let body_chunk = Arc::clone(&committed);
        self.make_event(Event {
            name: "DATA-PART",
            data: Some(committed),
            on_success: Some(Box::new(move |engine: &mut Engine| {
                engine.data_buf.extend_from_slice(&body_chunk);
                // recall this handler for the next chunk
                engine.next_input_to(Arc::new(Engine::data_part));
            })),
            success_reply: Some(Reply::silent()),
            ..Event::default()
        });

        false
    }

    /// The body is complete: fire the DATA event (per recipient for LMTP),
    /// reset the transaction, and hand any trailing bytes back to the
    /// operation dispatcher.
    fn data_finished(&mut self, more_data: &[u8]) -> bool {
        let body: Arc<[u8]> = std::mem::take(&mut self.data_buf).into();

        match self.protocol {
            Protocol::Lmtp => {
                // RFC 2033 §4.3: one reply per accepted recipient, in order
                let recipients = self.forward_path.clone().unwrap_or_default();
                for recipient in recipients {
                    let failure = format!("{recipient} Failed");
                    self.make_event(Event {
                        name: "DATA",
                        args: vec![recipient],
                        data: Some(Arc::clone(&body)),
                        success_reply: Some(Reply::accepted(Status::Ok, "Ok")),
                        failure_reply: Some(Reply::rejected(Status::Error, failure)),
                        ..Event::default()
                    });
                }
            }
            Protocol::Smtp | Protocol::Esmtp => {
                self.make_event(Event {
                    name: "DATA",
                    data: Some(Arc::clone(&body)),
                    success_reply: Some(Reply::accepted(Status::Ok, "message sent")),
                    ..Event::default()
                });
            }
        }

        self.reset_envelope();

        if more_data.is_empty() {
            false
        } else {
            let operation = Arc::clone(&self.operation);
            operation(self, more_data)
        }
    }
}

#[cfg(test)]
mod test {
    use super::{find_terminator, unstuff};

    #[test]
    fn terminator_crlf() {
        let found = find_terminator(b"body\r\n.\r\n", false).unwrap();
        assert_eq!(found.body_end, 6);
        assert_eq!(found.resume, 9);
    }

    #[test]
    fn terminator_bare_lf() {
        let found = find_terminator(b"body\n.\n", false).unwrap();
        assert_eq!(found.body_end, 5);
        assert_eq!(found.resume, 7);
    }

    #[test]
    fn terminator_with_trailing_bytes() {
        let found = find_terminator(b"body\r\n.\r\nQUIT\r\n", false).unwrap();
        assert_eq!(found.body_end, 6);
        assert_eq!(&b"body\r\n.\r\nQUIT\r\n"[found.resume..], b"QUIT\r\n");
    }

    #[test]
    fn terminator_at_start_only_for_empty_body() {
        assert!(find_terminator(b".\r\n", true).is_some());
        assert!(find_terminator(b".\r\n", false).is_none());
    }

    #[test]
    fn stuffed_dot_is_not_a_terminator() {
        assert!(find_terminator(b"a\r\n..\r\nb\r\n", false).is_none());
    }

    #[test]
    fn unstuff_every_line() {
        assert_eq!(unstuff(b".a\r\n.b\r\n"), b"a\r\nb\r\n");
        assert_eq!(unstuff(b"..\r\n"), b".\r\n");
        assert_eq!(unstuff(b"plain\r\n"), b"plain\r\n");
    }

    #[test]
    fn unstuff_bare_lf_lines() {
        assert_eq!(unstuff(b".a\n..b\n"), b"a\n.b\n");
    }

    #[test]
    fn unstuff_only_at_line_start() {
        assert_eq!(unstuff(b"a.b\r\nc.d\r\n"), b"a.b\r\nc.d\r\n");
    }
}

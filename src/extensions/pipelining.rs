//! Command pipelining (RFC 2920).
//!
//! While extended mode is on, the session's operation splitter is replaced by
//! one that dispatches every command in the chunk, and bytes trailing a DATA
//! terminator are fed back into the dispatcher instead of drawing a 453.
//! Leaving extended mode restores the saved handler.

use std::sync::{Arc, Mutex, PoisonError};

use phf::phf_set;

use crate::{
    command,
    engine::{Engine, OperationHandler},
    extension::Extension,
    status::Status,
};

/// Verbs allowed in a non-terminal position of a pipelined group
/// (RFC 2920 §3.1): everything else changes state the client must see first.
static GROUP_COMMANDS: phf::Set<&'static str> =
    phf_set! {"RSET", "MAIL", "SEND", "SOML", "SAML", "RCPT"};

#[derive(Default)]
pub struct Pipelining {
    saved: Mutex<Option<Saved>>,
}

struct Saved {
    operation: OperationHandler,
    handle_more_data: bool,
}

impl Extension for Pipelining {
    fn keyword(&self) -> &'static str {
        "PIPELINING"
    }

    fn extend_mode_changed(&self, engine: &mut Engine, enabled: bool) {
        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);

        if enabled {
            // a repeated EHLO must not save our own splitter as the original
            if saved.is_none() {
                let operation = engine.swap_operation_handler(Arc::new(process_group));
                *saved = Some(Saved {
                    operation,
                    handle_more_data: engine.handles_more_data(),
                });
                engine.set_handle_more_data(true);
            }
        } else if let Some(Saved {
            operation,
            handle_more_data,
        }) = saved.take()
        {
            engine.swap_operation_handler(operation);
            engine.set_handle_more_data(handle_more_data);
        }
    }
}

/// The pipelined operation splitter: one chunk, many commands.
fn process_group(engine: &mut Engine, chunk: &[u8]) -> bool {
    let text = String::from_utf8_lossy(chunk);
    let commands: Vec<&str> = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .collect();

    for (index, line) in commands.iter().enumerate() {
        let (verb, params) = command::tokenize(line);

        if index + 1 < commands.len() && !GROUP_COMMANDS.contains(verb.as_str()) {
            engine.reply(
                Status::Error,
                format!("Protocol error: '{verb}' not allowed in a group of commands"),
            );
            return false;
        }

        if engine.process_command(&verb, &params) {
            return true;
        }
    }

    false
}

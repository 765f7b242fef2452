//! Built-in verb handlers. Handlers receive the engine itself, so extensions
//! and embedder callbacks can call back into it.

use std::sync::Arc;

use crate::{
    command,
    event::Event,
    reply::Reply,
    status::Status,
};

use super::{Engine, Protocol, ReversePath};

impl Engine {
    pub(super) fn install_verbs(&mut self) {
        self.def_verb("HELO", Self::helo);
        self.def_verb("NOOP", Self::noop);
        self.def_verb("MAIL", Self::mail);
        self.def_verb("RCPT", Self::rcpt);
        self.def_verb("DATA", Self::data);
        self.def_verb("RSET", Self::rset);
        self.def_verb("QUIT", Self::quit);

        self.def_verb("VRFY", |engine, params| engine.not_implemented("VRFY", params));
        self.def_verb("EXPN", |engine, params| engine.not_implemented("EXPN", params));
        self.def_verb("HELP", |engine, params| engine.not_implemented("HELP", params));
        self.def_verb("TURN", |engine, params| engine.not_implemented("TURN", params));
        self.def_verb("SEND", |engine, params| engine.not_implemented("SEND", params));
        self.def_verb("SOML", |engine, params| engine.not_implemented("SOML", params));
        self.def_verb("SAML", |engine, params| engine.not_implemented("SAML", params));

        match self.protocol {
            Protocol::Smtp => {}
            Protocol::Esmtp => {
                self.def_verb("EHLO", Self::ehlo);
            }
            Protocol::Lmtp => {
                self.undef_verb("HELO");
                self.def_verb("LHLO", Self::lhlo);
            }
        }
    }

    fn helo(&mut self, params: &str) -> bool {
        // HELO downgrades an extended session, restoring any swapped
        // operation handler along the way
        if self.protocol != Protocol::Smtp {
            self.set_extend_mode(false);
        }

        let hostname = params.trim();
        if hostname.is_empty() {
            self.reply(
                Status::SyntaxError,
                "Syntax error in parameters or arguments",
            );
            return false;
        }

        self.make_event(Event {
            name: "HELO",
            args: vec![hostname.to_string()],
            // RFC 5321 §4.1.1.1: HELO returns both sides to the initial state
            on_success: Some(Box::new(Engine::reset_envelope)),
            success_reply: Some(Reply::accepted(
                Status::Ok,
                "Requested mail action okey, completed",
            )),
            ..Event::default()
        });

        false
    }

    fn ehlo(&mut self, params: &str) -> bool {
        self.extended_hello("EHLO", params)
    }

    fn lhlo(&mut self, params: &str) -> bool {
        self.extended_hello("LHLO", params)
    }

    /// EHLO/LHLO: enter extended mode and advertise registered extensions as
    /// a multi-line 250.
    fn extended_hello(&mut self, name: &'static str, params: &str) -> bool {
        let hostname = params.trim();
        if hostname.is_empty() {
            self.reply(
                Status::SyntaxError,
                "Syntax error in parameters or arguments",
            );
            return false;
        }

        self.set_extend_mode(true);

        let mut message = format!("{} Service ready", self.hostname);
        for extension in &self.extensions {
            message.push('\n');
            message.push_str(extension.keyword());
            for parameter in extension.parameters() {
                message.push(' ');
                message.push_str(parameter);
            }
        }

        self.make_event(Event {
            name,
            args: vec![hostname.to_string()],
            on_success: Some(Box::new(Engine::reset_envelope)),
            success_reply: Some(Reply::accepted(Status::Ok, message)),
            ..Event::default()
        });

        false
    }

    fn mail(&mut self, params: &str) -> bool {
        if self.reverse_path == ReversePath::Initial {
            self.reply(Status::BadSequence, "Bad sequence of commands");
            return false;
        }
        if self.forward_path.is_some() {
            // a transaction is already open; MAIL needs RSET first
            self.reply(Status::BadSequence, "Bad sequence of commands");
            return false;
        }

        let Some(path) = command::parse_path(params, "FROM:") else {
            self.reply(
                Status::SyntaxError,
                "Syntax error in parameters or arguments",
            );
            return false;
        };

        if !self.handle_options("MAIL", &path.address, &path.options) {
            return false;
        }

        let address = path.address;
        self.make_event(Event {
            name: "MAIL",
            args: vec![address.clone()],
            on_success: Some(Box::new({
                let address = address.clone();
                move |engine: &mut Engine| {
                    engine.reverse_path = ReversePath::Sender(address);
                    engine.forward_path = Some(Vec::new());
                }
            })),
            success_reply: Some(Reply::accepted(Status::Ok, format!("sender {address} OK"))),
            failure_reply: Some(Reply::rejected(Status::Error, "Failure")),
            ..Event::default()
        });

        false
    }

    fn rcpt(&mut self, params: &str) -> bool {
        if self.forward_path.is_none() {
            self.reply(Status::BadSequence, "Bad sequence of commands");
            return false;
        }

        let Some(path) = command::parse_path(params, "TO:") else {
            self.reply(
                Status::SyntaxError,
                "Syntax error in parameters or arguments",
            );
            return false;
        };

        if !self.handle_options("RCPT", &path.address, &path.options) {
            return false;
        }

        let address = path.address;
        self.make_event(Event {
            name: "RCPT",
            args: vec![address.clone()],
            on_success: Some(Box::new({
                let address = address.clone();
                move |engine: &mut Engine| {
                    if let Some(recipients) = engine.forward_path.as_mut() {
                        recipients.push(address);
                    }
                    engine.step_maildata(true);
                }
            })),
            success_reply: Some(Reply::accepted(
                Status::Ok,
                format!("recipient {address} OK"),
            )),
            failure_reply: Some(Reply::rejected(Status::Error, "Failure")),
            ..Event::default()
        });

        false
    }

    fn data(&mut self, params: &str) -> bool {
        if !self.maildata_path {
            self.reply(Status::BadSequence, "Bad sequence of commands");
            return false;
        }
        if !params.is_empty() {
            self.reply(
                Status::SyntaxError,
                "Syntax error in parameters or arguments",
            );
            return false;
        }

        self.last_chunk.clear();
        self.make_event(Event {
            name: "DATA-INIT",
            on_success: Some(Box::new(|engine: &mut Engine| {
                engine.next_input_to(Arc::new(Engine::data_part));
            })),
            success_reply: Some(Reply::accepted(
                Status::StartMailInput,
                "Start mail input; end with <CRLF>.<CRLF>",
            )),
            ..Event::default()
        });

        false
    }

    fn rset(&mut self, _params: &str) -> bool {
        self.make_event(Event {
            name: "RSET",
            on_success: Some(Box::new(|engine: &mut Engine| {
                if engine.reverse_path != ReversePath::Initial {
                    engine.reverse_path = ReversePath::Greeted;
                }
                engine.forward_path = None;
                engine.step_maildata(false);
            })),
            success_reply: Some(Reply::accepted(
                Status::Ok,
                "Requested mail action okay, completed",
            )),
            ..Event::default()
        });

        false
    }

    fn noop(&mut self, _params: &str) -> bool {
        self.make_event(Event {
            name: "NOOP",
            ..Event::default()
        });

        false
    }

    fn quit(&mut self, _params: &str) -> bool {
        let message = format!("{} Service closing transmission channel", self.hostname);
        self.make_event(Event {
            name: "QUIT",
            success_reply: Some(Reply::accepted(Status::ServiceClosing, message)),
            ..Event::default()
        });

        true
    }

    /// VRFY and friends: 502 unless a callback decides otherwise.
    fn not_implemented(&mut self, name: &'static str, params: &str) -> bool {
        let args = if params.is_empty() {
            Vec::new()
        } else {
            vec![params.to_string()]
        };

        self.make_event(Event {
            name,
            args,
            default_reply: Some(Reply::rejected(
                Status::NotImplemented,
                "Command not implemented",
            )),
            ..Event::default()
        });

        false
    }
}

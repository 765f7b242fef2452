//! Postfix XFORWARD: an upstream proxy forwards the original client's
//! identity as `KEY=VALUE` attributes, which the engine stores per session.

use std::sync::Arc;

use crate::{
    engine::{Engine, VerbHandler},
    event::Event,
    extension::Extension,
    reply::Reply,
    status::Status,
};

const ATTRIBUTES: [&str; 5] = ["NAME", "ADDR", "PROTO", "HELO", "SOURCE"];

#[derive(Default)]
pub struct Xforward;

impl Extension for Xforward {
    fn keyword(&self) -> &'static str {
        "XFORWARD"
    }

    fn parameters(&self) -> &[&'static str] {
        &ATTRIBUTES
    }

    fn verbs(&self) -> Vec<(&'static str, VerbHandler)> {
        vec![("XFORWARD", Arc::new(xforward))]
    }
}

fn xforward(engine: &mut Engine, params: &str) -> bool {
    let mut values = Vec::new();
    let mut residue = Vec::new();

    for token in params.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if ATTRIBUTES.contains(&key) && !value.is_empty() => {
                values.push((key.to_string(), value.to_string()));
            }
            _ => residue.push(token),
        }
    }

    if !residue.is_empty() {
        engine.reply(
            Status::SyntaxError,
            format!("5.5.4 Bad XFORWARD attribute name: {}", residue.join(" ")),
        );
        return false;
    }

    let args = values
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    for (key, value) in values {
        engine.forwarded.insert(key, value);
    }

    engine.make_event(Event {
        name: "XFORWARD",
        args,
        success_reply: Some(Reply::accepted(Status::Ok, "OK")),
        failure_reply: Some(Reply::rejected(Status::Error, "Failure")),
        ..Event::default()
    });

    false
}

//! 8-bit MIME transport declaration (RFC 1652).
//!
//! The engine is 8-bit clean, so the `BODY` parameter is accepted with any
//! value and otherwise ignored.

use std::sync::Arc;

use crate::{
    engine::Engine,
    extension::{Extension, OptionSubscription},
};

#[derive(Default)]
pub struct EightBitMime;

impl Extension for EightBitMime {
    fn keyword(&self) -> &'static str {
        "8BITMIME"
    }

    fn options(&self) -> Vec<OptionSubscription> {
        vec![OptionSubscription {
            verb: "MAIL",
            key: "BODY",
            handler: Arc::new(
                |_engine: &mut Engine, _verb: &str, _address: &str, _key: &str, _value: &str| {},
            ),
        }]
    }
}

//! Wire-direction log macros and a ready-made subscriber setup.
//!
//! Session traffic is logged under three targets so embedders can filter
//! each stream independently: `epistle::incoming` (client to server),
//! `epistle::outgoing` (server to client), and `epistle::internal`
//! (lifecycle notes). Each macro defaults to TRACE and accepts an explicit
//! level: `internal!(level = DEBUG, "...")`.

use tracing_subscriber::EnvFilter;

/// Log a line received from the client.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($arg:tt)*) => {
        $crate::tracing::event!(
            target: "epistle::incoming",
            $crate::tracing::Level::$level,
            $($arg)*
        )
    };

    ($($arg:tt)*) => {
        $crate::incoming!(level = TRACE, $($arg)*)
    };
}

/// Log a reply line sent to the client.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($arg:tt)*) => {
        $crate::tracing::event!(
            target: "epistle::outgoing",
            $crate::tracing::Level::$level,
            $($arg)*
        )
    };

    ($($arg:tt)*) => {
        $crate::outgoing!(level = TRACE, $($arg)*)
    };
}

/// Log a session lifecycle note.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($arg:tt)*) => {
        $crate::tracing::event!(
            target: "epistle::internal",
            $crate::tracing::Level::$level,
            $($arg)*
        )
    };

    ($($arg:tt)*) => {
        $crate::internal!(level = TRACE, $($arg)*)
    };
}

/// Install a compact subscriber for the crate's log targets.
///
/// `EPISTLE_LOG` accepts any `tracing` filter directive and wins when set;
/// otherwise debug builds trace the full wire exchange and release builds
/// stay at info.
pub fn init() {
    let filter = EnvFilter::try_from_env("EPISTLE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if cfg!(debug_assertions) {
            "epistle=trace,epistled=debug"
        } else {
            "epistle=info,epistled=info"
        })
    });

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .init();
}

//! Reporting for panics caught on connection tasks.
//!
//! Application callbacks run under `catch_unwind`. The payload is turned into
//! text here so that a panic ends only its own connection and still leaves a
//! trace in the logs and metrics.

use std::{any::Any, fmt, net::SocketAddr};

use crate::{metrics, session::ConnectionId};

/// Displays a caught panic payload.
///
/// `panic!` payloads are `&'static str` or `String`; anything else prints
/// through `Debug`.
///
/// ```
/// use packetwire::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(format!("bad opcode {}", 7))).to_string(), "bad opcode 7");
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            self.0.downcast_ref::<&'static str>(),
            self.0.downcast_ref::<String>(),
        ) {
            (Some(s), _) => f.write_str(s),
            (None, Some(s)) => f.write_str(s),
            (None, None) => write!(f, "{:?}", self.0),
        }
    }
}

/// Wrap `panic` for display.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

/// Count and log a panic caught while driving connection `id`.
///
/// `site` names what panicked, e.g. `"connection callback"`. Returns the
/// formatted message for the connection's close reason.
pub(crate) fn report_panic(
    site: &str,
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    panic: Box<dyn Any + Send>,
) -> String {
    metrics::inc_connection_panics();
    let message = format_panic(panic).to_string();
    // Emit via both `log` and `tracing` for tests that capture either.
    log::error!("{site} panicked: id={id}, panic={message}, peer_addr={peer_addr:?}");
    tracing::error!(%id, panic = %message, ?peer_addr, "{site} panicked");
    message
}

//! The outbound seam between the arbitration engine and the transport.
//!
//! The engine never touches sockets.  It hands every payload it decides to
//! emit to an [`Outbox`] together with an [`Audience`]; the transport side
//! ([`FanOut`][crate::fanout::FanOut]) resolves the audience against the
//! [`ConnectionRegistry`][crate::registry::ConnectionRegistry].  Tests swap
//! in a recording implementation.

use nexus_types::{ConnectionId, ConnectionRole};
use serde_json::Value;

/// Who should receive an outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every open connection, declared role or not.
    All,
    /// Open connections that declared the role; every open connection when
    /// none did.
    Prefer(ConnectionRole),
    /// Every open connection except the originator.
    AllExcept(ConnectionId),
}

/// Sink for payloads emitted by the arbitration engine.
///
/// # Contract
///
/// * `emit` never blocks and never fails: closed or backpressured
///   connections are skipped silently.
/// * Payloads are delivered in the order `emit` is called.
pub trait Outbox: Send {
    /// Deliver `payload` to `audience`.  Returns the number of connections
    /// the payload was queued for.
    fn emit(&self, audience: Audience, payload: &Value) -> usize;
}

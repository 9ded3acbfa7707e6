//! `nexus-middleware` – connection bookkeeping and fan-out.
//!
//! Routes payloads to connected peers without caring what they mean.
//!
//! # Modules
//!
//! - [`registry`] – [`ConnectionRegistry`]: open connections, their declared
//!   [`ConnectionRole`][nexus_types::ConnectionRole] and bounded outbound
//!   queues.
//! - [`fanout`] – [`FanOut`]: resolves an [`Audience`] to connections and
//!   queues one frame for each.
//! - [`outbox`] – the [`Outbox`] trait the arbitration engine emits through.

pub mod fanout;
pub mod outbox;
pub mod registry;

pub use fanout::FanOut;
pub use outbox::{Audience, Outbox};
pub use registry::{ConnectionRegistry, DEFAULT_OUTBOUND_CAPACITY};

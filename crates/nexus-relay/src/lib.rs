//! `nexus-relay` – WebSocket front door for the rover
//!
//! Boots a TCP listener (default port `3000`) that:
//!
//! 1. **Upgrades** WebSocket requests on the configured path (default
//!    `/ws`), optionally gated by a shared-secret `?token=`.
//! 2. **Registers** every peer in the connection registry and records the
//!    role it declares (`{"register":..}` / `CAM_REGISTER`).
//! 3. **Forwards** every other text frame to the arbitration engine, after
//!    a per-connection `governor` rate limit.
//! 4. **Relays** binary camera frames to every other peer.
//! 5. **Answers** plain HTTP requests with a short status page.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nexus_middleware::{ConnectionRegistry, FanOut};
//! use nexus_relay::{RelayServer, RelaySettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let fanout = FanOut::new(Arc::new(ConnectionRegistry::new()));
//!     let (engine, _task) = nexus_runtime::spawn_engine(Box::new(fanout.clone()));
//!     RelayServer::new(RelaySettings::default(), fanout, engine)
//!         .run()
//!         .await
//!         .expect("relay failed");
//! }
//! ```

pub mod server;
pub mod settings;

pub use server::RelayServer;
pub use settings::{DEFAULT_PORT, DEFAULT_RATE_LIMIT, DEFAULT_WS_PATH, RelaySettings};

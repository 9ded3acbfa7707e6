//! [`FanOut`] – delivers one payload to many connections.
//!
//! Text payloads are serialised once and the resulting frame is cloned per
//! recipient (tungstenite frames are reference counted, so the clone is a
//! pointer bump).  Binary camera frames take the same path untouched.

use std::sync::Arc;

use nexus_types::ConnectionId;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::{trace, warn};

use crate::outbox::{Audience, Outbox};
use crate::registry::ConnectionRegistry;

/// Registry-backed broadcaster.  Cheap to clone.
#[derive(Clone)]
pub struct FanOut {
    registry: Arc<ConnectionRegistry>,
}

impl FanOut {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster resolves audiences against.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Resolve `audience` to the set of open connections it names.
    pub fn recipients(&self, audience: Audience) -> Vec<ConnectionId> {
        match audience {
            Audience::All => self.registry.open_connections(),
            Audience::Prefer(role) => {
                let preferred = self.registry.with_role(role);
                if preferred.is_empty() {
                    self.registry.open_connections()
                } else {
                    preferred
                }
            }
            Audience::AllExcept(origin) => self
                .registry
                .open_connections()
                .into_iter()
                .filter(|id| *id != origin)
                .collect(),
        }
    }

    /// Queue `msg` for every recipient of `audience`.  Returns how many
    /// connections accepted the frame.
    pub fn deliver(&self, audience: Audience, msg: Message) -> usize {
        let mut delivered = 0;
        for id in self.recipients(audience) {
            if self.registry.send(id, msg.clone()) {
                delivered += 1;
            }
        }
        trace!(?audience, delivered, "fan-out");
        delivered
    }
}

impl Outbox for FanOut {
    fn emit(&self, audience: Audience, payload: &Value) -> usize {
        match serde_json::to_string(payload) {
            Ok(text) => self.deliver(audience, Message::text(text)),
            Err(e) => {
                warn!(error = %e, "outbound payload failed to serialise");
                0
            }
        }
    }
}

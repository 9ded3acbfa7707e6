//! Test doubles shared by the runtime unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nexus_middleware::{Audience, Outbox};
use serde_json::Value;

use crate::scheduler::{Scheduler, TimerKind};

/// [`Outbox`] that records every emission in order.
#[derive(Clone, Default)]
pub struct RecordingOutbox {
    sent: Arc<Mutex<Vec<(Audience, Value)>>>,
}

impl RecordingOutbox {
    pub fn sent(&self) -> Vec<(Audience, Value)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Payloads whose `type` field equals `kind`.
    pub fn of_type(&self, kind: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .map(|(_, v)| v)
            .filter(|v| v["type"] == kind)
            .collect()
    }

    pub fn actuations(&self) -> Vec<Value> {
        self.of_type("ACTUATION")
    }
}

impl Outbox for RecordingOutbox {
    fn emit(&self, audience: Audience, payload: &Value) -> usize {
        self.sent.lock().unwrap().push((audience, payload.clone()));
        1
    }
}

/// [`Scheduler`] that only remembers which timers are armed.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    armed: HashMap<TimerKind, (u64, Duration)>,
    pub disarms: usize,
}

impl RecordingScheduler {
    /// Generation of the currently armed `timer`.
    pub fn armed(&self, timer: TimerKind) -> Option<u64> {
        self.armed.get(&timer).map(|(generation, _)| *generation)
    }
}

impl Scheduler for RecordingScheduler {
    fn arm(&mut self, timer: TimerKind, generation: u64, period: Duration) {
        self.armed.insert(timer, (generation, period));
    }

    fn disarm(&mut self, timer: TimerKind) {
        if self.armed.remove(&timer).is_some() {
            self.disarms += 1;
        }
    }
}

//! The engine task: one consumer, two lanes.
//!
//! Connections and timers never touch the [`Arbiter`] directly.  They push
//! [`EngineEvent`]s through an [`EngineHandle`]; a single Tokio task drains
//! them and runs each to completion.
//!
//! Sensor snapshots travel on a priority lane that the task always drains
//! first (`biased` select), so a stop decision never waits behind a backlog
//! of operator or AI commands.

use nexus_middleware::Outbox;
use nexus_types::wire::is_sensor_frame;
use nexus_types::{ConnectionId, RelayError};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::arbiter::Arbiter;
use crate::scheduler::{TimerKind, TokioScheduler};

/// Everything the engine task consumes.
#[derive(Debug)]
pub enum EngineEvent {
    /// A decoded text frame, tagged with the connection it came from.
    Inbound {
        origin: Option<ConnectionId>,
        value: Value,
    },
    Tick {
        timer: TimerKind,
        generation: u64,
    },
    /// Emit the final stop and exit.
    Shutdown,
}

/// Cloneable submission side of the engine.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    priority: mpsc::UnboundedSender<EngineEvent>,
    regular: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineHandle {
    /// Queue a decoded inbound frame.  Sensor snapshots take the priority
    /// lane.
    ///
    /// # Errors
    ///
    /// [`RelayError::Transport`] once the engine task has exited.
    pub fn submit(&self, origin: Option<ConnectionId>, value: Value) -> Result<(), RelayError> {
        let lane = if is_sensor_frame(&value) {
            &self.priority
        } else {
            &self.regular
        };
        lane.send(EngineEvent::Inbound { origin, value })
            .map_err(|_| RelayError::Transport("engine stopped".to_string()))
    }

    /// Ask the engine to emit its final stop and exit.
    ///
    /// # Errors
    ///
    /// [`RelayError::Transport`] once the engine task has exited.
    pub fn shutdown(&self) -> Result<(), RelayError> {
        self.priority
            .send(EngineEvent::Shutdown)
            .map_err(|_| RelayError::Transport("engine stopped".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.priority.is_closed()
    }
}

/// Spawn the engine task on the current Tokio runtime.
///
/// The task exits after [`EngineHandle::shutdown`] or once every handle has
/// been dropped.
pub fn spawn_engine(outbox: Box<dyn Outbox>) -> (EngineHandle, JoinHandle<()>) {
    let (priority_tx, priority_rx) = mpsc::unbounded_channel();
    let (regular_tx, regular_rx) = mpsc::unbounded_channel();

    let scheduler = TokioScheduler::new(&regular_tx);
    let mut arbiter = Arbiter::new(outbox, Box::new(scheduler));
    arbiter.start();

    let handle = EngineHandle {
        priority: priority_tx,
        regular: regular_tx,
    };
    let task = tokio::spawn(run(arbiter, priority_rx, regular_rx));
    (handle, task)
}

async fn run(
    mut arbiter: Arbiter,
    mut priority: mpsc::UnboundedReceiver<EngineEvent>,
    mut regular: mpsc::UnboundedReceiver<EngineEvent>,
) {
    loop {
        let event = tokio::select! {
            biased;
            Some(event) = priority.recv() => event,
            Some(event) = regular.recv() => event,
            else => break,
        };
        let now = tokio::time::Instant::now().into_std();
        match event {
            EngineEvent::Inbound { origin, value } => arbiter.handle(origin, value, now),
            EngineEvent::Tick { timer, generation } => arbiter.on_tick(timer, generation, now),
            EngineEvent::Shutdown => {
                arbiter.shutdown();
                info!("engine stopped");
                return;
            }
        }
    }
    debug!("all engine handles dropped");
    arbiter.shutdown();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::RecordingOutbox;

    fn forward_patrol() -> Value {
        json!({"type": "ACTUATION", "node": 2, "move": "FORWARD", "speed": 50, "source": "PATROL"})
    }

    #[tokio::test(start_paused = true)]
    async fn patrol_emits_three_steps_in_nine_seconds() {
        let outbox = RecordingOutbox::default();
        let (engine, _task) = spawn_engine(Box::new(outbox.clone()));
        engine.submit(None, json!({"type": "MODE", "mode": "PATROL"})).unwrap();

        tokio::time::sleep(Duration::from_millis(9_100)).await;
        assert_eq!(outbox.actuations(), vec![forward_patrol(); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn target_lock_steers_on_next_tick() {
        let outbox = RecordingOutbox::default();
        let (engine, _task) = spawn_engine(Box::new(outbox.clone()));
        engine.submit(None, json!({"type": "TARGET_LOCK", "pan": 90})).unwrap();
        engine.submit(None, json!({"node": 1, "imu": {"yaw": 70}})).unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        let first = outbox.actuations().into_iter().next();
        assert_eq!(
            first,
            Some(json!({
                "type": "ACTUATION", "node": 2, "move": "RIGHT", "speed": 80, "source": "TARGET_NAV"
            }))
        );
    }

    #[tokio::test]
    async fn sensor_lane_overtakes_queued_commands() {
        let outbox = RecordingOutbox::default();
        let (engine, _task) = spawn_engine(Box::new(outbox.clone()));
        engine.submit(None, json!({"type": "MODE", "mode": "FOLLOW"})).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Queued together: the radar trip is processed first, so the AI
        // command finds the latch set.
        engine.submit(None, json!({"type": "AI_CMD", "cmd": "FORWARD"})).unwrap();
        engine.submit(None, json!({"node": 1, "radar": {"front": 10}})).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let actuations = outbox.actuations();
        assert_eq!(actuations.len(), 1, "only the radar stop: {actuations:?}");
        assert_eq!(actuations[0]["source"], "RADAR");
    }

    #[tokio::test]
    async fn shutdown_emits_final_stop_and_exits() {
        let outbox = RecordingOutbox::default();
        let (engine, task) = spawn_engine(Box::new(outbox.clone()));
        engine.shutdown().unwrap();
        task.await.unwrap();

        assert_eq!(
            outbox.actuations(),
            vec![json!({
                "type": "ACTUATION", "node": 2, "move": "STOP", "speed": 0, "source": "MANUAL"
            })]
        );
        assert!(engine.is_closed());
        assert!(engine.submit(None, json!({})).is_err());
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_engine() {
        let outbox = RecordingOutbox::default();
        let (engine, task) = spawn_engine(Box::new(outbox.clone()));
        drop(engine);
        task.await.unwrap();
        assert_eq!(outbox.actuations().len(), 1);
    }
}

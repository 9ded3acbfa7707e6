//! Periodic timers that feed ticks into the engine queue.
//!
//! Controllers never run on their own task.  Arming a timer spawns a small
//! Tokio task that enqueues [`EngineEvent::Tick`] every period; the engine
//! task processes the tick like any other event, so a tick never overlaps a
//! message handler.
//!
//! Each arm carries a generation number.  A tick already queued when its
//! timer is disarmed still reaches the engine, which discards it by
//! comparing generations.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::worker::EngineEvent;

/// The periodic sources the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Patrol,
    Navigation,
}

/// Arms and disarms periodic tick sources.
pub trait Scheduler: Send {
    /// Start (or restart) `timer`.  The first tick fires one `period`
    /// after arming.
    fn arm(&mut self, timer: TimerKind, generation: u64, period: Duration);

    /// Stop `timer`.  No-op when it is not armed.
    fn disarm(&mut self, timer: TimerKind);
}

/// [`Scheduler`] backed by Tokio interval tasks.
///
/// Timer tasks hold only a weak reference to the engine queue, so they
/// wind down on their own once every [`EngineHandle`][crate::EngineHandle]
/// is gone.
pub struct TokioScheduler {
    events: mpsc::WeakUnboundedSender<EngineEvent>,
    tasks: HashMap<TimerKind, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: &mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            events: events.downgrade(),
            tasks: HashMap::new(),
        }
    }

    /// `true` while `timer` has a live task.
    pub fn is_armed(&self, timer: TimerKind) -> bool {
        self.tasks.get(&timer).is_some_and(|t| !t.is_finished())
    }
}

impl Scheduler for TokioScheduler {
    fn arm(&mut self, timer: TimerKind, generation: u64, period: Duration) {
        self.disarm(timer);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a Tokio interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(tx) = events.upgrade() else {
                    break;
                };
                if tx.send(EngineEvent::Tick { timer, generation }).is_err() {
                    break;
                }
            }
        });
        debug!(?timer, generation, period_ms = period.as_millis() as u64, "timer armed");
        self.tasks.insert(timer, task);
    }

    fn disarm(&mut self, timer: TimerKind) {
        if let Some(task) = self.tasks.remove(&timer) {
            task.abort();
            debug!(?timer, "timer disarmed");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn armed_timer_ticks_every_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(&tx);
        scheduler.arm(TimerKind::Patrol, 7, Duration::from_millis(3_000));

        time::sleep(Duration::from_millis(2_900)).await;
        assert!(rx.try_recv().is_err(), "no tick before the first period");

        time::sleep(Duration::from_millis(200)).await;
        match rx.try_recv() {
            Ok(EngineEvent::Tick { timer, generation }) => {
                assert_eq!(timer, TimerKind::Patrol);
                assert_eq!(generation, 7);
            }
            other => panic!("expected patrol tick, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_stops_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(&tx);
        scheduler.arm(TimerKind::Navigation, 1, Duration::from_millis(200));
        assert!(scheduler.is_armed(TimerKind::Navigation));

        scheduler.disarm(TimerKind::Navigation);
        assert!(!scheduler.is_armed(TimerKind::Navigation));
        time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_task() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(&tx);
        scheduler.arm(TimerKind::Patrol, 1, Duration::from_millis(100));
        scheduler.arm(TimerKind::Patrol, 2, Duration::from_millis(100));

        time::sleep(Duration::from_millis(150)).await;
        let mut generations = Vec::new();
        while let Ok(EngineEvent::Tick { generation, .. }) = rx.try_recv() {
            generations.push(generation);
        }
        assert_eq!(generations, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_task_exits_when_queue_is_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(&tx);
        scheduler.arm(TimerKind::Patrol, 1, Duration::from_millis(100));
        drop(tx);
        drop(rx);

        time::sleep(Duration::from_millis(250)).await;
        assert!(!scheduler.is_armed(TimerKind::Patrol));
    }
}

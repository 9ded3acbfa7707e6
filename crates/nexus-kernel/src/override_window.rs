//! [`ManualOverrideWindow`] – human-priority grace period.
//!
//! Every accepted manual command re-arms the window to `now + 500 ms`.
//! Autonomous sources (AI, target navigation, patrol) consult
//! [`ManualOverrideWindow::is_active`] before emitting.  The window is
//! measured from the most recent manual command; it never accumulates.
//!
//! Callers pass the current instant explicitly so the window can be driven
//! from a paused test clock.

use std::time::{Duration, Instant};

/// How long autonomy stays suppressed after a manual command.
pub const MANUAL_OVERRIDE_GRACE: Duration = Duration::from_millis(500);

/// Deadline tracker for the manual override grace period.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use nexus_kernel::override_window::ManualOverrideWindow;
///
/// let t0 = Instant::now();
/// let mut window = ManualOverrideWindow::new();
/// window.open(t0);
///
/// assert!(window.is_active(t0 + Duration::from_millis(100)));
/// assert!(!window.is_active(t0 + Duration::from_millis(500)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualOverrideWindow {
    until: Option<Instant>,
}

impl ManualOverrideWindow {
    /// A closed window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arm the window from `now`, replacing any earlier deadline.
    pub fn open(&mut self, now: Instant) {
        self.until = Some(now + MANUAL_OVERRIDE_GRACE);
    }

    /// `true` while autonomy must stay silent.
    pub fn is_active(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }
}

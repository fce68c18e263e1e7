//! Shared "what is the character doing" flags and the idle clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Busy/idle state read by the idle producer and the control channel.
#[derive(Debug)]
pub struct Activity {
    processing: AtomicBool,
    speaking: AtomicBool,
    user_engaged: AtomicBool,
    clock: Mutex<IdleClock>,
}

/// Idle time accrues only while the character is not speaking.
#[derive(Debug)]
struct IdleClock {
    last_awake: Instant,
    paused_at: Option<Instant>,
}

impl Default for Activity {
    fn default() -> Self {
        Self {
            processing: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
            user_engaged: AtomicBool::new(false),
            clock: Mutex::new(IdleClock {
                last_awake: Instant::now(),
                paused_at: None,
            }),
        }
    }
}

impl Activity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_processing(&self, active: bool) {
        self.processing.store(active, Ordering::SeqCst);
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Speaking pauses the idle clock; it resumes where it left off.
    pub fn set_speaking(&self, active: bool) {
        let mut clock = self.clock();
        self.speaking.store(active, Ordering::SeqCst);
        match (active, clock.paused_at) {
            (true, None) => clock.paused_at = Some(Instant::now()),
            (false, Some(paused_at)) => {
                clock.last_awake += paused_at.elapsed();
                clock.paused_at = None;
            }
            _ => {}
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Record that the user has talked to the character at least once.
    pub fn mark_user_engaged(&self) {
        self.user_engaged.store(true, Ordering::SeqCst);
    }

    pub fn user_engaged(&self) -> bool {
        self.user_engaged.load(Ordering::SeqCst)
    }

    /// Reset the idle clock.
    pub fn touch(&self) {
        let mut clock = self.clock();
        let now = Instant::now();
        clock.last_awake = now;
        if clock.paused_at.is_some() {
            clock.paused_at = Some(now);
        }
    }

    /// Time since the last user message, not counting time spent speaking.
    pub fn idle_time(&self) -> Duration {
        let clock = self.clock();
        let until = clock.paused_at.unwrap_or_else(Instant::now);
        until.saturating_duration_since(clock.last_awake)
    }

    fn clock(&self) -> std::sync::MutexGuard<'_, IdleClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip() {
        let activity = Activity::new();
        assert!(!activity.is_processing());
        activity.set_processing(true);
        activity.set_speaking(true);
        assert!(activity.is_processing());
        assert!(activity.is_speaking());
        assert!(!activity.user_engaged());
        activity.mark_user_engaged();
        assert!(activity.user_engaged());
    }

    #[test]
    fn touch_resets_idle_time() {
        let activity = Activity::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(activity.idle_time() >= Duration::from_millis(20));
        activity.touch();
        assert!(activity.idle_time() < Duration::from_millis(20));
    }

    #[test]
    fn speaking_pauses_idle_time() {
        let activity = Activity::new();
        activity.set_speaking(true);
        std::thread::sleep(Duration::from_millis(30));
        assert!(activity.idle_time() < Duration::from_millis(30));
        activity.set_speaking(false);
        assert!(activity.idle_time() < Duration::from_millis(30));
    }
}

// clock.rs

use crate::segment::AudioSegment;
use log::{debug, info};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// A request to start a segment at an absolute clock time
#[derive(Clone)]
pub struct ScheduledPlay {
    pub segment: Arc<dyn AudioSegment>,
    pub at: f64,
    pub looping: bool,
    pub volume: f32,
}

impl fmt::Debug for ScheduledPlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledPlay")
            .field("segment", &self.segment.name())
            .field("at", &self.at)
            .field("looping", &self.looping)
            .field("volume", &self.volume)
            .finish()
    }
}

/// Monotonic device clock plus the playback primitives the engine drives
pub trait PlaybackClock {
    /// Seconds since the clock's own origin; never decreases
    fn now(&self) -> f64;

    fn schedule_play(&mut self, play: ScheduledPlay);

    /// Stop everything scheduled or playing
    fn stop(&mut self);
}

/// Wall clock backed by `Instant`. Scheduling requests are only logged.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        info!("Creating new SystemClock");
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn schedule_play(&mut self, play: ScheduledPlay) {
        info!(
            "Scheduling segment '{}' at {:.3}s (loop: {}, volume: {:.2})",
            play.segment.name(),
            play.at,
            play.looping,
            play.volume
        );
    }

    fn stop(&mut self) {
        info!("Playback stopped");
    }
}

#[derive(Default)]
struct ManualState {
    // f64 bits
    now: AtomicU64,
    stops: AtomicUsize,
    scheduled: Mutex<Vec<ScheduledPlay>>,
}

/// Clock whose time only moves when told to.
///
/// Clones share the same time and the same record of scheduling calls, so a
/// test or replay driver can keep a handle while the engine owns another.
#[derive(Clone, Default)]
pub struct ManualClock {
    state: Arc<ManualState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    pub fn set(&self, seconds: f64) {
        self.state.now.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance_by(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }

    /// Every segment scheduled so far, oldest first
    pub fn scheduled(&self) -> Vec<ScheduledPlay> {
        self.state
            .scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }
}

impl PlaybackClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.state.now.load(Ordering::SeqCst))
    }

    fn schedule_play(&mut self, play: ScheduledPlay) {
        debug!("ManualClock recorded {:?}", play);
        self.state
            .scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(play);
    }

    fn stop(&mut self) {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentHandle;

    #[test]
    fn test_manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::starting_at(2.0);
        let handle = clock.clone();
        handle.advance_by(0.5);
        assert_eq!(clock.now(), 2.5);
    }

    #[test]
    fn test_manual_clock_records_calls() {
        let mut clock = ManualClock::new();
        let handle = clock.clone();
        clock.schedule_play(ScheduledPlay {
            segment: Arc::new(SegmentHandle::new("intro")),
            at: 0.5,
            looping: false,
            volume: 0.8,
        });
        clock.stop();

        let scheduled = handle.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].segment.name(), "intro");
        assert_eq!(scheduled[0].at, 0.5);
        assert_eq!(handle.stop_count(), 1);
    }

    #[test]
    fn test_manual_clock_keeps_recording_after_poison() {
        let mut clock = ManualClock::new();
        let state = Arc::clone(&clock.state);
        let _ = std::thread::spawn(move || {
            let _guard = state.scheduled.lock().unwrap();
            panic!("poison the schedule");
        })
        .join();
        assert!(clock.state.scheduled.is_poisoned());

        clock.schedule_play(ScheduledPlay {
            segment: Arc::new(SegmentHandle::new("loop")),
            at: 1.0,
            looping: true,
            volume: 1.0,
        });
        let scheduled = clock.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].segment.name(), "loop");
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}

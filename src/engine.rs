//! The beat engine
//!
//! [`BeatEngine`] keeps a tick position in step with a [`PlaybackClock`]. The
//! driver calls [`BeatEngine::advance`] once per frame; the engine compares
//! the loop-relative playing time against the map's tick timings and emits a
//! beat for every tick it passes, in order, exactly once per pass.

use crate::beat_map::BeatMap;
use crate::cancel::CancelToken;
use crate::clock::{PlaybackClock, ScheduledPlay};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{BeatEvent, BeatTiming, EventHub};
use crate::segment::AudioSegment;
use crossbeam::channel::Receiver;
use futures_lite::future;
use log::{debug, info, trace, warn};
use std::sync::Arc;

/// Result of a nearest-tick query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearTick {
    pub tick: u32,
    /// `tick_timing(tick) - music_time()`; positive when the tick is still ahead
    pub delta: f64,
}

pub struct BeatEngine<C: PlaybackClock> {
    clock: C,
    start_offset: f64,
    default_bpm: f64,
    current_map: Option<Arc<dyn BeatMap>>,
    retired: Option<Arc<dyn BeatMap>>,
    tick: u32,
    awaiting_loop_wrap: bool,
    loop_start_time: f64,
    start_time: f64,
    manual_offset: f64,
    current_bpm: f64,
    events: EventHub,
}

impl<C: PlaybackClock> BeatEngine<C> {
    pub fn new(clock: C, config: &EngineConfig) -> Self {
        let now = clock.now();
        info!(
            "Creating BeatEngine (start offset {:.3}s, default {} BPM)",
            config.start_offset, config.default_bpm
        );
        Self {
            clock,
            start_offset: config.start_offset,
            default_bpm: config.default_bpm,
            current_map: None,
            retired: None,
            tick: 0,
            awaiting_loop_wrap: false,
            loop_start_time: now,
            start_time: now,
            manual_offset: config.manual_offset,
            current_bpm: config.default_bpm,
            events: EventHub::new(),
        }
    }

    pub fn with_defaults(clock: C) -> Self {
        Self::new(clock, &EngineConfig::default())
    }

    /// Load `map` and schedule its playback `start_offset` seconds from now.
    ///
    /// Does nothing when `map` is already loaded unless `force` is set.
    /// Segment unload/load failures and cancellation are logged and ignored;
    /// the engine always ends up fully on the new map. Cancelling `cancel`
    /// stops the wait on segments that have not settled yet.
    pub async fn initialize(&mut self, map: Arc<dyn BeatMap>, force: bool, cancel: &CancelToken) {
        if !force && self.is_current(&map) {
            debug!("Map '{}' already loaded, skipping initialize", map.name());
            return;
        }
        info!("Initializing map '{}'", map.name());

        if self.current_map.is_some() {
            self.clock.stop();
        }
        // A map dropped by reset() still holds its segments until the next switch
        let retired = self.retired.take().filter(|old| !same_map(old, &map));
        let outgoing = self.current_map.clone().or(retired);

        let unload: future::Boxed<(Result<()>, Result<()>)> = match &outgoing {
            Some(old) => Box::pin(future::zip(
                old.intro_segment().unload(cancel.clone()),
                old.loop_segment().unload(cancel.clone()),
            )),
            None => Box::pin(future::ready((Ok(()), Ok(())))),
        };
        let load = future::zip(
            map.intro_segment().load(cancel.clone()),
            map.loop_segment().load(cancel.clone()),
        );

        let transfer = async { Some(future::zip(unload, load).await) };
        let aborted = async {
            cancel.cancelled().await;
            None
        };
        match future::or(transfer, aborted).await {
            Some(((unload_intro, unload_body), (load_intro, load_body))) => {
                if let Some(old) = &outgoing {
                    report("unload", old.intro_segment(), unload_intro);
                    report("unload", old.loop_segment(), unload_body);
                }
                report("load", map.intro_segment(), load_intro);
                report("load", map.loop_segment(), load_body);
                if cancel.is_cancelled() {
                    warn!("Initialize of '{}' was cancelled while loading; continuing", map.name());
                }
            }
            None => warn!(
                "Initialize of '{}' was cancelled before its segments settled; continuing",
                map.name()
            ),
        }

        self.install(map);
    }

    // No await points past here: the switch to the new map is all or nothing.
    fn install(&mut self, map: Arc<dyn BeatMap>) {
        self.tick = 0;
        self.awaiting_loop_wrap = false;
        self.start_time = self.clock.now() + self.start_offset;
        self.loop_start_time = self.start_time;

        self.clock.schedule_play(ScheduledPlay {
            segment: map.intro_segment(),
            at: self.start_time,
            looping: false,
            volume: map.volume(),
        });
        self.clock.schedule_play(ScheduledPlay {
            segment: map.loop_segment(),
            at: self.start_time + map.intro_length(),
            looping: map.is_loop(),
            volume: map.volume(),
        });

        self.current_map = Some(Arc::clone(&map));
        info!(
            "Map '{}' initialized, playback starts at {:.3}s",
            map.name(),
            self.start_time
        );
        self.events.emit_initialized(map);
    }

    fn is_current(&self, map: &Arc<dyn BeatMap>) -> bool {
        self.current_map
            .as_ref()
            .is_some_and(|current| same_map(current, map))
    }

    /// Move the tick position up to the clock reading `now`.
    ///
    /// Emits one beat per passed tick, an end-of-pass after the last tick of
    /// the map, and always finishes with an advanced event.
    pub fn advance(&mut self, now: f64) {
        if let Some(map) = self.current_map.clone() {
            self.advance_ticks(map.as_ref(), now);
        }
        self.events.emit_advanced();
    }

    fn advance_ticks(&mut self, map: &dyn BeatMap, now: f64) {
        let mut time = self.playing_time(self.loop_start_time, now);
        let tick_sum = map.tick_sum();

        loop {
            if self.awaiting_loop_wrap {
                if time < map.total_length() {
                    return;
                }
                let loop_length = map.loop_length();
                if loop_length <= 0.0 {
                    warn!("Map '{}' has an empty loop body, not wrapping", map.name());
                    return;
                }
                self.loop_start_time += loop_length;
                time -= loop_length;
                self.awaiting_loop_wrap = false;
                debug!("Loop wrapped, loop start now {:.3}s", self.loop_start_time);
            }

            // Only reachable on a finished non-looping map
            if self.tick >= tick_sum {
                return;
            }
            if time < map.tick_timing(self.tick) {
                return;
            }

            self.current_bpm = map.bpm_at(time);
            trace!("Beat at tick {} ({} BPM)", self.tick, self.current_bpm);
            self.events
                .emit_beat(BeatTiming::new(self.tick, map.measure_tick_count()));
            self.tick += 1;

            if self.tick == tick_sum {
                if map.is_loop() {
                    self.tick = map.intro_tick_sum();
                }
                self.awaiting_loop_wrap = true;
                debug!("End of pass for map '{}'", map.name());
                self.events.emit_end_of_pass();
            }
        }
    }

    /// Clear the loaded map, stop playback and drop every subscriber.
    ///
    /// The cleared map's segments stay loaded until the next
    /// [`initialize`](Self::initialize) unloads them.
    pub fn reset(&mut self) {
        info!("Resetting beat engine");
        if let Some(map) = self.current_map.take() {
            self.retired = Some(map);
        }
        self.tick = 0;
        self.current_bpm = self.default_bpm;
        self.awaiting_loop_wrap = false;
        self.start_time = self.clock.now();
        self.loop_start_time = self.start_time;
        self.events = EventHub::new();
        self.clock.stop();
    }

    /// Set the manual time bias added to every derived time
    pub fn change_offset(&mut self, seconds: f64) {
        debug!("Manual offset changed to {:.4}s", seconds);
        self.manual_offset = seconds;
    }

    /// Timing of `tick`, or `f64::INFINITY` when no map is loaded
    pub fn get_beat_timing(&self, tick: u32) -> f64 {
        match &self.current_map {
            Some(map) => map.tick_timing(tick),
            None => f64::INFINITY,
        }
    }

    /// Snap the current playing time to a grid of `subdivision` ticks per measure.
    ///
    /// Returns `None` when no map is loaded.
    ///
    /// # Panics
    ///
    /// When `subdivision` is zero, larger than the map's measure tick count,
    /// or does not divide it evenly.
    pub fn nearest_tick(&self, subdivision: u32) -> Option<NearTick> {
        let map = self.current_map.as_ref()?;
        let measure_tick_count = map.measure_tick_count();
        assert!(
            subdivision > 0 && subdivision <= measure_tick_count,
            "subdivision {} outside 1..={}",
            subdivision,
            measure_tick_count
        );
        assert!(
            measure_tick_count % subdivision == 0,
            "subdivision {} does not divide measure tick count {}",
            subdivision,
            measure_tick_count
        );

        let step = measure_tick_count / subdivision;
        let tick_sum = map.tick_sum();
        let now = self.music_time();

        let mut lo = self.tick - self.tick % step;
        let mut hi = lo + step;
        let mut lo_time = map.tick_timing(lo);
        let mut hi_time = map.tick_timing(hi);

        // The raw tick may sit past the playing time when it is not step aligned
        while now < lo_time && lo >= step {
            lo -= step;
            hi -= step;
            lo_time = map.tick_timing(lo);
            hi_time = map.tick_timing(hi);
        }
        while hi_time < now && hi + step < tick_sum {
            lo += step;
            hi += step;
            lo_time = map.tick_timing(lo);
            hi_time = map.tick_timing(hi);
        }

        let near = if now < (lo_time + hi_time) / 2.0 {
            NearTick {
                tick: lo,
                delta: lo_time - now,
            }
        } else {
            NearTick {
                tick: hi,
                delta: hi_time - now,
            }
        };
        Some(near)
    }

    /// [`nearest_tick`](Self::nearest_tick) on the raw tick grid
    pub fn nearest_tick_raw(&self) -> Option<NearTick> {
        let measure_tick_count = self.current_map.as_ref()?.measure_tick_count();
        self.nearest_tick(measure_tick_count)
    }

    fn playing_time(&self, origin: f64, now: f64) -> f64 {
        let map_offset = self.current_map.as_ref().map_or(0.0, |map| map.offset());
        now - origin + map_offset + self.manual_offset
    }

    /// Seconds since the last loop wrap
    pub fn music_time(&self) -> f64 {
        self.playing_time(self.loop_start_time, self.clock.now())
    }

    /// Seconds since the piece started; keeps counting across loop wraps
    pub fn music_time_no_repeat(&self) -> f64 {
        self.playing_time(self.start_time, self.clock.now())
    }

    pub fn music_beat_time(&self) -> f64 {
        self.music_time() / self.current_beat_length()
    }

    pub fn music_beat_time_no_repeat(&self) -> f64 {
        self.music_time_no_repeat() / self.current_beat_length()
    }

    pub fn current_beat_length(&self) -> f64 {
        60.0 / self.current_bpm
    }

    pub fn current_bpm(&self) -> f64 {
        self.current_bpm
    }

    pub fn measure_tick_count(&self) -> Option<u32> {
        self.current_map.as_ref().map(|map| map.measure_tick_count())
    }

    pub fn beat_count(&self) -> Option<u32> {
        self.current_map.as_ref().map(|map| map.beat_count())
    }

    /// Ticks per beat
    pub fn beat_tick(&self) -> Option<u32> {
        self.current_map
            .as_ref()
            .map(|map| map.measure_tick_count() / map.beat_count())
    }

    /// Clock time at which the current map started playing
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Clock time of the most recent loop start
    pub fn loop_start_time(&self) -> f64 {
        self.loop_start_time
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn is_awaiting_loop_wrap(&self) -> bool {
        self.awaiting_loop_wrap
    }

    /// True once a non-looping map has emitted its last beat
    pub fn is_finished(&self) -> bool {
        self.current_map
            .as_ref()
            .is_some_and(|map| !map.is_loop() && self.tick >= map.tick_sum())
    }

    pub fn manual_offset(&self) -> f64 {
        self.manual_offset
    }

    pub fn current_map(&self) -> Option<&Arc<dyn BeatMap>> {
        self.current_map.as_ref()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn on_beat(&mut self) -> Receiver<BeatTiming> {
        self.events.on_beat()
    }

    pub fn on_initialize(&mut self) -> Receiver<Arc<dyn BeatMap>> {
        self.events.on_initialize()
    }

    pub fn on_end_of_pass(&mut self) -> Receiver<()> {
        self.events.on_end_of_pass()
    }

    pub fn on_advanced(&mut self) -> Receiver<()> {
        self.events.on_advanced()
    }

    /// All events in emission order
    pub fn subscribe(&mut self) -> Receiver<BeatEvent> {
        self.events.subscribe()
    }
}

fn same_map(a: &Arc<dyn BeatMap>, b: &Arc<dyn BeatMap>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn report(stage: &str, segment: Arc<dyn AudioSegment>, result: Result<()>) {
    if let Err(e) = result {
        warn!("Segment '{}' {} failed: {}", segment.name(), stage, e);
    }
}

//! Engine events and their fan-out channels
//!
//! Every subscription is a `crossbeam` receiver. Emission sends a clone to
//! each live subscriber and forgets the ones whose receiver was dropped.
//! Replacing an [`EventHub`] drops all its senders, which disconnects every
//! receiver handed out before.

use crate::beat_map::BeatMap;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::sync::Arc;

/// Position reported with each beat event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatTiming {
    pub tick: u32,
    pub measure_tick_count: u32,
}

impl BeatTiming {
    pub fn new(tick: u32, measure_tick_count: u32) -> Self {
        Self {
            tick,
            measure_tick_count,
        }
    }

    /// True on the first tick of a measure
    pub fn is_measure_start(&self) -> bool {
        self.tick % self.measure_tick_count == 0
    }

    pub fn measure(&self) -> u32 {
        self.tick / self.measure_tick_count
    }

    pub fn tick_in_measure(&self) -> u32 {
        self.tick % self.measure_tick_count
    }
}

/// Everything the engine emits, in emission order
#[derive(Clone)]
pub enum BeatEvent {
    Initialized(Arc<dyn BeatMap>),
    Beat(BeatTiming),
    EndOfPass,
    Advanced,
}

impl fmt::Debug for BeatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeatEvent::Initialized(map) => f.debug_tuple("Initialized").field(&map.name()).finish(),
            BeatEvent::Beat(timing) => f.debug_tuple("Beat").field(timing).finish(),
            BeatEvent::EndOfPass => write!(f, "EndOfPass"),
            BeatEvent::Advanced => write!(f, "Advanced"),
        }
    }
}

/// Publish side of one event kind
pub struct Channel<T> {
    subscribers: Vec<Sender<T>>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone> Channel<T> {
    pub fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, value: T) {
        self.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// The engine's channels: one per event kind plus the combined stream
#[derive(Default)]
pub struct EventHub {
    beat: Channel<BeatTiming>,
    initialized: Channel<Arc<dyn BeatMap>>,
    end_of_pass: Channel<()>,
    advanced: Channel<()>,
    all: Channel<BeatEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_beat(&mut self) -> Receiver<BeatTiming> {
        self.beat.subscribe()
    }

    pub fn on_initialize(&mut self) -> Receiver<Arc<dyn BeatMap>> {
        self.initialized.subscribe()
    }

    pub fn on_end_of_pass(&mut self) -> Receiver<()> {
        self.end_of_pass.subscribe()
    }

    pub fn on_advanced(&mut self) -> Receiver<()> {
        self.advanced.subscribe()
    }

    pub fn subscribe(&mut self) -> Receiver<BeatEvent> {
        self.all.subscribe()
    }

    pub fn emit_beat(&mut self, timing: BeatTiming) {
        self.beat.emit(timing);
        self.all.emit(BeatEvent::Beat(timing));
    }

    pub fn emit_initialized(&mut self, map: Arc<dyn BeatMap>) {
        self.initialized.emit(Arc::clone(&map));
        self.all.emit(BeatEvent::Initialized(map));
    }

    pub fn emit_end_of_pass(&mut self) {
        self.end_of_pass.emit(());
        self.all.emit(BeatEvent::EndOfPass);
    }

    pub fn emit_advanced(&mut self) {
        self.advanced.emit(());
        self.all.emit(BeatEvent::Advanced);
    }
}

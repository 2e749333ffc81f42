// driver.rs

use crate::clock::PlaybackClock;
use crate::engine::BeatEngine;
use crate::events::BeatEvent;
use crossbeam::channel::Receiver;
use log::{debug, info};
use std::time::Instant;

/// Counters collected over one [`FrameDriver::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub frames: u64,
    pub beats: u64,
    pub passes: u32,
}

/// Calls `advance` once per frame pulse and hands every emitted event to an observer
pub struct FrameDriver<C: PlaybackClock> {
    engine: BeatEngine<C>,
    events: Receiver<BeatEvent>,
}

impl<C: PlaybackClock> FrameDriver<C> {
    pub fn new(mut engine: BeatEngine<C>) -> Self {
        let events = engine.subscribe();
        FrameDriver { engine, events }
    }

    pub fn engine(&self) -> &BeatEngine<C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut BeatEngine<C> {
        &mut self.engine
    }

    /// Reset the engine and subscribe to its fresh event channels
    pub fn reset(&mut self) {
        self.engine.reset();
        self.events = self.engine.subscribe();
    }

    pub fn into_engine(self) -> BeatEngine<C> {
        self.engine
    }

    /// Run until `passes` end-of-pass events were seen, a non-looping map
    /// finishes, or the pulse channel disconnects.
    pub fn run<F>(&mut self, frames: &Receiver<Instant>, passes: Option<u32>, mut observer: F) -> DriverReport
    where
        F: FnMut(&BeatEngine<C>, &BeatEvent),
    {
        info!("Frame driver started");
        let mut report = DriverReport::default();

        for _pulse in frames.iter() {
            let now = self.engine.clock().now();
            self.engine.advance(now);
            report.frames += 1;

            for event in self.events.try_iter() {
                match event {
                    BeatEvent::Beat(_) => report.beats += 1,
                    BeatEvent::EndOfPass => report.passes += 1,
                    _ => {}
                }
                observer(&self.engine, &event);
            }

            if passes.is_some_and(|target| report.passes >= target) {
                debug!("Reached {} passes", report.passes);
                break;
            }
            if self.engine.is_finished() {
                debug!("Map finished playing");
                break;
            }
        }

        info!(
            "Frame driver stopped after {} frames, {} beats, {} passes",
            report.frames, report.beats, report.passes
        );
        report
    }
}

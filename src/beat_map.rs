//! Beat maps: the tick grid of a piece of music
//!
//! The engine consumes any [`BeatMap`]. [`GridBeatMap`] is the bundled
//! implementation: a grid of equally sized measures split into an intro and a
//! loop body, with optional tempo changes keyed by tick.

use crate::error::{Result, SyncError};
use crate::segment::{AudioSegment, SegmentHandle};
use config::FileFormat;
use log::debug;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Largest tick grid a definition may describe
pub const MAX_TICK_SUM: u32 = 1 << 20;

/// Read-only description of a piece's tick grid
pub trait BeatMap: Send + Sync {
    fn name(&self) -> &str;

    /// Ticks per measure
    fn measure_tick_count(&self) -> u32;

    /// Beats per measure
    fn beat_count(&self) -> u32;

    /// Total ticks, intro plus loop body
    fn tick_sum(&self) -> u32;

    /// Tick where the loop body begins
    fn intro_tick_sum(&self) -> u32;

    fn is_loop(&self) -> bool;

    /// Seconds from piece start to the given tick. Non-decreasing in `tick`.
    fn tick_timing(&self, tick: u32) -> f64;

    /// Tempo in effect at `time` seconds from piece start
    fn bpm_at(&self, time: f64) -> f64;

    /// Seconds added to the clock reading before comparing against tick timings
    fn offset(&self) -> f64;

    fn volume(&self) -> f32;

    fn intro_segment(&self) -> Arc<dyn AudioSegment>;

    fn loop_segment(&self) -> Arc<dyn AudioSegment>;

    fn intro_length(&self) -> f64 {
        self.tick_timing(self.intro_tick_sum())
    }

    fn total_length(&self) -> f64 {
        self.tick_timing(self.tick_sum())
    }

    fn loop_length(&self) -> f64 {
        self.total_length() - self.intro_length()
    }
}

/// A tempo that takes effect from `tick` onwards
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TempoChange {
    pub tick: u32,
    pub bpm: f64,
}

/// Serializable description of a [`GridBeatMap`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapDefinition {
    pub name: String,
    pub bpm: f64,
    pub measure_tick_count: u32,
    pub beat_count: u32,
    pub intro_measures: u32,
    pub loop_measures: u32,
    pub is_loop: bool,
    pub offset: f64,
    pub volume: f32,
    pub tempo_changes: Vec<TempoChange>,
}

impl Default for MapDefinition {
    fn default() -> Self {
        Self {
            name: "untitled".to_string(),
            bpm: 120.0,
            measure_tick_count: 16,
            beat_count: 4,
            intro_measures: 0,
            loop_measures: 4,
            is_loop: true,
            offset: 0.0,
            volume: 1.0,
            tempo_changes: Vec::new(),
        }
    }
}

impl MapDefinition {
    /// Read a definition from a file; the format follows the file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading map definition from {}", path.display());
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_text(text: &str, format: FileFormat) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, format))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    fn validate(&self) -> Result<()> {
        if self.measure_tick_count == 0 {
            return Err(SyncError::InvalidMap(
                "measure_tick_count must be positive".to_string(),
            ));
        }
        if self.beat_count == 0 || self.measure_tick_count % self.beat_count != 0 {
            return Err(SyncError::InvalidMap(format!(
                "beat_count {} must divide measure_tick_count {}",
                self.beat_count, self.measure_tick_count
            )));
        }
        if self.loop_measures == 0 {
            return Err(SyncError::InvalidMap(
                "loop_measures must be positive".to_string(),
            ));
        }
        if !valid_bpm(self.bpm) {
            return Err(SyncError::InvalidMap(format!("bpm {} out of range", self.bpm)));
        }
        let (_, tick_sum) = self.tick_sums()?;
        for change in &self.tempo_changes {
            if change.tick >= tick_sum || !valid_bpm(change.bpm) {
                return Err(SyncError::InvalidMap(format!(
                    "tempo change {} bpm at tick {} out of range",
                    change.bpm, change.tick
                )));
            }
        }
        Ok(())
    }

    /// `(intro_tick_sum, tick_sum)`, bounded by [`MAX_TICK_SUM`]
    fn tick_sums(&self) -> Result<(u32, u32)> {
        let too_long = || {
            SyncError::InvalidMap(format!(
                "{} intro + {} loop measures of {} ticks exceed {} ticks",
                self.intro_measures, self.loop_measures, self.measure_tick_count, MAX_TICK_SUM
            ))
        };
        let intro = self
            .intro_measures
            .checked_mul(self.measure_tick_count)
            .ok_or_else(too_long)?;
        let tick_sum = self
            .intro_measures
            .checked_add(self.loop_measures)
            .and_then(|measures| measures.checked_mul(self.measure_tick_count))
            .filter(|&sum| sum <= MAX_TICK_SUM)
            .ok_or_else(too_long)?;
        Ok((intro, tick_sum))
    }
}

fn valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

/// Grid of equally sized measures with precomputed tick timings
pub struct GridBeatMap {
    name: String,
    measure_tick_count: u32,
    beat_count: u32,
    intro_tick_sum: u32,
    tick_sum: u32,
    is_loop: bool,
    offset: f64,
    volume: f32,
    // timings[t] for t in 0..=tick_sum
    timings: Vec<f64>,
    // tempo in effect during tick t, for t in 0..tick_sum
    tempo: Vec<f64>,
    intro: Arc<dyn AudioSegment>,
    body: Arc<dyn AudioSegment>,
}

impl GridBeatMap {
    /// Build a map with in-memory segment handles named after the map
    pub fn new(definition: MapDefinition) -> Result<Self> {
        let intro = Arc::new(SegmentHandle::new(format!("{}/intro", definition.name)));
        let body = Arc::new(SegmentHandle::new(format!("{}/loop", definition.name)));
        Self::with_segments(definition, intro, body)
    }

    pub fn with_segments(
        definition: MapDefinition,
        intro: Arc<dyn AudioSegment>,
        body: Arc<dyn AudioSegment>,
    ) -> Result<Self> {
        definition.validate()?;

        let measure_tick_count = definition.measure_tick_count;
        let ticks_per_beat = f64::from(measure_tick_count / definition.beat_count);
        let (intro_tick_sum, tick_sum) = definition.tick_sums()?;

        let mut changes = definition.tempo_changes.clone();
        changes.sort_by_key(|c| c.tick);

        let mut tempo = Vec::with_capacity(tick_sum as usize);
        let mut timings = Vec::with_capacity(tick_sum as usize + 1);
        let mut bpm = definition.bpm;
        let mut next_change = changes.iter().peekable();
        let mut elapsed = 0.0;
        timings.push(elapsed);
        for tick in 0..tick_sum {
            while let Some(change) = next_change.next_if(|c| c.tick <= tick) {
                bpm = change.bpm;
            }
            tempo.push(bpm);
            elapsed += 60.0 / bpm / ticks_per_beat;
            timings.push(elapsed);
        }

        debug!(
            "Built grid map '{}': {} ticks ({} intro), {:.3}s total",
            definition.name, tick_sum, intro_tick_sum, elapsed
        );

        Ok(Self {
            name: definition.name,
            measure_tick_count,
            beat_count: definition.beat_count,
            intro_tick_sum,
            tick_sum,
            is_loop: definition.is_loop,
            offset: definition.offset,
            volume: definition.volume,
            timings,
            tempo,
            intro,
            body,
        })
    }

    fn seconds_per_tick(&self, bpm: f64) -> f64 {
        60.0 / bpm / f64::from(self.measure_tick_count / self.beat_count)
    }
}

impl fmt::Debug for GridBeatMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridBeatMap")
            .field("name", &self.name)
            .field("measure_tick_count", &self.measure_tick_count)
            .field("beat_count", &self.beat_count)
            .field("intro_tick_sum", &self.intro_tick_sum)
            .field("tick_sum", &self.tick_sum)
            .field("is_loop", &self.is_loop)
            .finish_non_exhaustive()
    }
}

impl BeatMap for GridBeatMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn measure_tick_count(&self) -> u32 {
        self.measure_tick_count
    }

    fn beat_count(&self) -> u32 {
        self.beat_count
    }

    fn tick_sum(&self) -> u32 {
        self.tick_sum
    }

    fn intro_tick_sum(&self) -> u32 {
        self.intro_tick_sum
    }

    fn is_loop(&self) -> bool {
        self.is_loop
    }

    fn tick_timing(&self, tick: u32) -> f64 {
        if let Some(&timing) = self.timings.get(tick as usize) {
            return timing;
        }
        // Past the end: extend the grid at the final tempo
        let last_bpm = self.tempo.last().copied().unwrap_or(120.0);
        let beyond = f64::from(tick - self.tick_sum);
        self.timings[self.tick_sum as usize] + beyond * self.seconds_per_tick(last_bpm)
    }

    fn bpm_at(&self, time: f64) -> f64 {
        let reached = self.timings[..self.tick_sum as usize].partition_point(|&t| t <= time);
        self.tempo[reached.saturating_sub(1)]
    }

    fn offset(&self) -> f64 {
        self.offset
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn intro_segment(&self) -> Arc<dyn AudioSegment> {
        Arc::clone(&self.intro)
    }

    fn loop_segment(&self) -> Arc<dyn AudioSegment> {
        Arc::clone(&self.body)
    }
}

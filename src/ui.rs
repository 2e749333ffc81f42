//! Terminal display for the demo binary
//!
//! A progress bar that fills once per measure and a spinner that reports the
//! current pass.

use crate::beat_map::BeatMap;
use crate::events::BeatTiming;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub fn create_measure_progress(measure_tick_count: u32) -> ProgressBar {
    let pb = ProgressBar::new(u64::from(measure_tick_count));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("⣀⣤⣦⣶⣷⣿ "),
    );
    pb.set_prefix("Measure");
    pb
}

pub fn create_pass_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix("Pass");
    pb
}

pub struct BeatDisplay {
    _bars: MultiProgress,
    measure: ProgressBar,
    pass: ProgressBar,
    beat_tick: u32,
}

impl BeatDisplay {
    pub fn new(map: &dyn BeatMap) -> Self {
        let bars = MultiProgress::new();
        let measure = bars.add(create_measure_progress(map.measure_tick_count()));
        let pass = bars.add(create_pass_spinner());
        pass.set_message(format!("1 - {}", map.name()));
        Self {
            _bars: bars,
            measure,
            pass,
            beat_tick: map.measure_tick_count() / map.beat_count(),
        }
    }

    pub fn beat(&self, timing: &BeatTiming) {
        self.measure.set_position(u64::from(timing.tick_in_measure() + 1));
        if timing.tick_in_measure() % self.beat_tick == 0 {
            let beat = timing.tick_in_measure() / self.beat_tick + 1;
            self.measure
                .set_message(format!("bar {} beat {}", timing.measure() + 1, beat));
        }
        self.pass.tick();
    }

    pub fn end_of_pass(&self, completed: u32) {
        self.pass.set_message(format!("{} complete", completed));
    }

    /// Print a line above the bars without tearing them
    pub fn println(&self, line: impl AsRef<str>) {
        self.measure.println(line);
    }

    pub fn finish(&self) {
        self.measure.finish();
        self.pass.finish_with_message("done");
    }
}

pub mod beat_map;
pub mod cancel;
pub mod cli;
pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod segment;
pub mod ui;

pub use beat_map::{BeatMap, GridBeatMap, MapDefinition, TempoChange};
pub use cancel::CancelToken;
pub use cli::{validate_subdivision, Args};
pub use clock::{ManualClock, PlaybackClock, ScheduledPlay, SystemClock};
pub use crate::config::EngineConfig;
pub use driver::{DriverReport, FrameDriver};
pub use engine::{BeatEngine, NearTick};
pub use error::{Result, SyncError};
pub use events::{BeatEvent, BeatTiming};
pub use segment::{AudioSegment, SegmentHandle};

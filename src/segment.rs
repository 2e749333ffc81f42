//! Audio segments referenced by a beat map
//!
//! A map owns two segments: the intro, played once, and the loop body. The
//! engine only asks segments to load or unload their data; decoding and
//! mixing belong to whatever backs the [`PlaybackClock`](crate::clock::PlaybackClock).

use crate::cancel::CancelToken;
use crate::error::{Result, SyncError};
use futures_lite::future::Boxed;
use log::debug;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// An audio resource whose data can be loaded and released asynchronously
pub trait AudioSegment: Send + Sync {
    fn name(&self) -> &str;

    /// Bring the segment's audio data into memory
    fn load(&self, cancel: CancelToken) -> Boxed<Result<()>>;

    /// Release the segment's audio data
    fn unload(&self, cancel: CancelToken) -> Boxed<Result<()>>;
}

/// Segment handle without a backing decoder; tracks whether it is loaded
#[derive(Debug, Clone)]
pub struct SegmentHandle {
    name: String,
    loaded: Arc<AtomicBool>,
}

impl SegmentHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loaded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }
}

impl AudioSegment for SegmentHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, cancel: CancelToken) -> Boxed<Result<()>> {
        let loaded = Arc::clone(&self.loaded);
        let name = self.name.clone();
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            loaded.store(true, Ordering::SeqCst);
            debug!("Segment '{}' loaded", name);
            Ok(())
        })
    }

    fn unload(&self, cancel: CancelToken) -> Boxed<Result<()>> {
        let loaded = Arc::clone(&self.loaded);
        let name = self.name.clone();
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            loaded.store(false, Ordering::SeqCst);
            debug!("Segment '{}' unloaded", name);
            Ok(())
        })
    }
}

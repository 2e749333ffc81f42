use beatsyncrs::{
    AudioSegment, BeatEngine, BeatEvent, BeatMap, CancelToken, EngineConfig, GridBeatMap,
    ManualClock, MapDefinition, PlaybackClock, SegmentHandle, SyncError,
};
use crossbeam::channel::TryRecvError;
use futures_lite::future::{self, block_on, Boxed};
use std::sync::Arc;

// 16 ticks per measure at 60 bpm: 0.25s per tick
fn sixty_bpm(name: &str, intro_measures: u32, loop_measures: u32) -> MapDefinition {
    MapDefinition {
        name: name.to_string(),
        bpm: 60.0,
        intro_measures,
        loop_measures,
        volume: 0.8,
        ..MapDefinition::default()
    }
}

fn grid_map(name: &str) -> Arc<dyn BeatMap> {
    Arc::new(GridBeatMap::new(sixty_bpm(name, 1, 2)).unwrap())
}

fn engine_at(seconds: f64) -> (BeatEngine<ManualClock>, ManualClock) {
    let clock = ManualClock::starting_at(seconds);
    (BeatEngine::with_defaults(clock.clone()), clock)
}

fn initialize(engine: &mut BeatEngine<ManualClock>, map: &Arc<dyn BeatMap>, force: bool) {
    block_on(engine.initialize(Arc::clone(map), force, &CancelToken::new()));
}

struct FailingSegment;

impl AudioSegment for FailingSegment {
    fn name(&self) -> &str {
        "broken"
    }

    fn load(&self, _cancel: CancelToken) -> Boxed<beatsyncrs::Result<()>> {
        Box::pin(async { Err(SyncError::Load("decoder crashed".to_string())) })
    }

    fn unload(&self, _cancel: CancelToken) -> Boxed<beatsyncrs::Result<()>> {
        Box::pin(async { Err(SyncError::Unload("still in use".to_string())) })
    }
}

/// Segment whose loader never finishes and ignores its token
struct StalledSegment;

impl AudioSegment for StalledSegment {
    fn name(&self) -> &str {
        "stalled"
    }

    fn load(&self, _cancel: CancelToken) -> Boxed<beatsyncrs::Result<()>> {
        Box::pin(future::pending())
    }

    fn unload(&self, _cancel: CancelToken) -> Boxed<beatsyncrs::Result<()>> {
        Box::pin(future::pending())
    }
}

#[test]
fn test_idle_engine_defaults() {
    let (mut engine, _clock) = engine_at(3.0);
    assert_eq!(engine.current_bpm(), 120.0);
    assert_eq!(engine.get_beat_timing(0), f64::INFINITY);
    assert_eq!(engine.measure_tick_count(), None);
    assert_eq!(engine.beat_tick(), None);
    assert!(engine.nearest_tick(4).is_none());
    assert!(engine.nearest_tick_raw().is_none());
    assert_eq!(engine.tick(), 0);

    // Idle advance only reports that a frame went by
    let events = engine.subscribe();
    engine.advance(10.0);
    let received: Vec<BeatEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert!(matches!(received[0], BeatEvent::Advanced));
}

#[test]
fn test_initialize_anchors_and_schedules_playback() {
    let (mut engine, clock) = engine_at(10.0);
    let map = grid_map("stage");
    initialize(&mut engine, &map, false);

    assert_eq!(engine.tick(), 0);
    assert!(!engine.is_awaiting_loop_wrap());
    assert_eq!(engine.start_time(), 10.5);
    assert_eq!(engine.loop_start_time(), 10.5);
    assert_eq!(engine.measure_tick_count(), Some(16));
    assert_eq!(engine.beat_count(), Some(4));
    assert_eq!(engine.beat_tick(), Some(4));
    assert_eq!(engine.get_beat_timing(4), 1.0);

    let scheduled = clock.scheduled();
    assert_eq!(scheduled.len(), 2);
    assert_eq!(scheduled[0].segment.name(), "stage/intro");
    assert_eq!(scheduled[0].at, 10.5);
    assert!(!scheduled[0].looping);
    assert_eq!(scheduled[1].segment.name(), "stage/loop");
    assert_eq!(scheduled[1].at, 14.5);
    assert!(scheduled[1].looping);
    assert_eq!(scheduled[1].volume, 0.8);
    // Nothing was playing yet, so nothing was stopped
    assert_eq!(clock.stop_count(), 0);
}

#[test]
fn test_custom_start_offset() {
    let clock = ManualClock::starting_at(2.0);
    let config = EngineConfig {
        start_offset: 0.25,
        ..EngineConfig::default()
    };
    let mut engine = BeatEngine::new(clock, &config);
    initialize(&mut engine, &grid_map("stage"), false);
    assert_eq!(engine.start_time(), 2.25);
}

#[test]
fn test_initialize_loads_segments() {
    let intro = Arc::new(SegmentHandle::new("intro"));
    let body = Arc::new(SegmentHandle::new("body"));
    let map: Arc<dyn BeatMap> = Arc::new(
        GridBeatMap::with_segments(sixty_bpm("stage", 1, 2), intro.clone(), body.clone()).unwrap(),
    );
    let (mut engine, _clock) = engine_at(0.0);
    initialize(&mut engine, &map, false);

    assert!(intro.is_loaded());
    assert!(body.is_loaded());
}

#[test]
fn test_initialized_event_precedes_beats() {
    let (mut engine, _clock) = engine_at(10.0);
    let events = engine.subscribe();
    let initialized = engine.on_initialize();
    let map = grid_map("stage");
    initialize(&mut engine, &map, false);

    // Music time 0.75s: ticks 0..=3 are due
    engine.advance(11.25);

    let received: Vec<BeatEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 6);
    assert!(matches!(&received[0], BeatEvent::Initialized(m) if m.name() == "stage"));
    for (i, event) in received[1..5].iter().enumerate() {
        assert!(matches!(event, BeatEvent::Beat(t) if t.tick == i as u32 && t.measure_tick_count == 16));
    }
    assert!(matches!(received[5], BeatEvent::Advanced));

    assert_eq!(initialized.try_iter().count(), 1);
    assert_eq!(engine.tick(), 4);
}

#[test]
fn test_initialize_same_map_is_noop() {
    let (mut engine, clock) = engine_at(1.0);
    let initialized = engine.on_initialize();
    let map = grid_map("stage");
    initialize(&mut engine, &map, false);
    engine.advance(2.0);
    let tick = engine.tick();

    clock.set(5.0);
    initialize(&mut engine, &map, false);

    assert_eq!(initialized.try_iter().count(), 1);
    assert_eq!(engine.tick(), tick);
    assert_eq!(engine.start_time(), 1.5);
    assert_eq!(clock.scheduled().len(), 2);
}

#[test]
fn test_forced_initialize_restarts_same_map() {
    let (mut engine, clock) = engine_at(1.0);
    let initialized = engine.on_initialize();
    let map = grid_map("stage");
    initialize(&mut engine, &map, false);
    engine.advance(2.0);
    assert!(engine.tick() > 0);

    clock.set(5.0);
    initialize(&mut engine, &map, true);

    assert_eq!(initialized.try_iter().count(), 2);
    assert_eq!(engine.tick(), 0);
    assert_eq!(engine.start_time(), 5.5);
    assert_eq!(clock.scheduled().len(), 4);
    assert_eq!(clock.stop_count(), 1);
}

#[test]
fn test_switching_maps_unloads_previous_segments() {
    let old_intro = Arc::new(SegmentHandle::new("old-intro"));
    let old_body = Arc::new(SegmentHandle::new("old-body"));
    let old: Arc<dyn BeatMap> = Arc::new(
        GridBeatMap::with_segments(sixty_bpm("old", 1, 1), old_intro.clone(), old_body.clone())
            .unwrap(),
    );
    let new = grid_map("new");

    let (mut engine, clock) = engine_at(0.0);
    initialize(&mut engine, &old, false);
    assert!(old_intro.is_loaded());

    initialize(&mut engine, &new, false);
    assert!(!old_intro.is_loaded());
    assert!(!old_body.is_loaded());
    assert_eq!(clock.stop_count(), 1);
    assert_eq!(engine.current_map().map(|m| m.name().to_string()), Some("new".to_string()));
}

#[test]
fn test_segment_failures_do_not_abort_initialize() {
    let broken: Arc<dyn BeatMap> = Arc::new(
        GridBeatMap::with_segments(
            sixty_bpm("broken", 0, 1),
            Arc::new(FailingSegment),
            Arc::new(FailingSegment),
        )
        .unwrap(),
    );
    let (mut engine, _clock) = engine_at(0.0);
    let initialized = engine.on_initialize();
    initialize(&mut engine, &broken, false);
    assert_eq!(engine.measure_tick_count(), Some(16));

    // Unloading the broken segments fails too; the switch still happens
    initialize(&mut engine, &grid_map("next"), false);
    assert_eq!(initialized.try_iter().count(), 2);
    assert_eq!(engine.current_map().map(|m| m.name().to_string()), Some("next".to_string()));
}

#[test]
fn test_cancelled_initialize_still_switches_maps() {
    let intro = Arc::new(SegmentHandle::new("intro"));
    let body = Arc::new(SegmentHandle::new("body"));
    let map: Arc<dyn BeatMap> = Arc::new(
        GridBeatMap::with_segments(sixty_bpm("stage", 0, 1), intro.clone(), body.clone()).unwrap(),
    );
    let (mut engine, _clock) = engine_at(0.0);
    let cancel = CancelToken::new();
    cancel.cancel();

    block_on(engine.initialize(Arc::clone(&map), false, &cancel));

    assert!(!intro.is_loaded());
    assert_eq!(engine.tick(), 0);
    assert_eq!(engine.start_time(), 0.5);
    assert!(engine.current_map().is_some());
}

#[test]
fn test_cancel_aborts_wait_on_stalled_segments() {
    let stalled: Arc<dyn BeatMap> = Arc::new(
        GridBeatMap::with_segments(
            sixty_bpm("stalled", 0, 1),
            Arc::new(StalledSegment),
            Arc::new(StalledSegment),
        )
        .unwrap(),
    );
    let (mut engine, clock) = engine_at(0.0);
    let cancel = CancelToken::new();

    {
        let mut init = Box::pin(engine.initialize(Arc::clone(&stalled), false, &cancel));
        assert!(block_on(future::poll_once(&mut init)).is_none());
        assert!(block_on(future::poll_once(&mut init)).is_none());

        cancel.cancel();
        assert!(block_on(future::poll_once(&mut init)).is_some());
    }

    assert_eq!(engine.current_map().map(|m| m.name().to_string()), Some("stalled".to_string()));
    assert_eq!(engine.start_time(), 0.5);
    assert_eq!(clock.scheduled().len(), 2);
}

#[test]
fn test_reset_then_switch_unloads_cleared_map() {
    let intro = Arc::new(SegmentHandle::new("intro"));
    let body = Arc::new(SegmentHandle::new("body"));
    let cleared: Arc<dyn BeatMap> = Arc::new(
        GridBeatMap::with_segments(sixty_bpm("cleared", 1, 1), intro.clone(), body.clone())
            .unwrap(),
    );
    let (mut engine, clock) = engine_at(0.0);
    initialize(&mut engine, &cleared, false);
    engine.reset();
    assert!(intro.is_loaded());
    assert!(body.is_loaded());

    initialize(&mut engine, &grid_map("next"), false);
    assert!(!intro.is_loaded());
    assert!(!body.is_loaded());
    // Playback was already stopped by the reset
    assert_eq!(clock.stop_count(), 1);
}

#[test]
fn test_reset_then_same_map_keeps_segments_loaded() {
    let intro = Arc::new(SegmentHandle::new("intro"));
    let body = Arc::new(SegmentHandle::new("body"));
    let map: Arc<dyn BeatMap> = Arc::new(
        GridBeatMap::with_segments(sixty_bpm("stage", 1, 1), intro.clone(), body.clone()).unwrap(),
    );
    let (mut engine, _clock) = engine_at(0.0);
    initialize(&mut engine, &map, false);
    engine.reset();

    initialize(&mut engine, &map, false);
    assert!(intro.is_loaded());
    assert!(body.is_loaded());
}

#[test]
fn test_reset_restores_defaults_and_drops_subscribers() {
    let (mut engine, clock) = engine_at(0.0);
    let beats = engine.on_beat();
    let passes = engine.on_end_of_pass();
    let advanced = engine.on_advanced();
    initialize(&mut engine, &grid_map("stage"), false);
    engine.advance(1.5);
    assert!(engine.tick() > 0);

    clock.set(7.0);
    engine.reset();

    assert_eq!(engine.current_bpm(), 120.0);
    assert_eq!(engine.get_beat_timing(0), f64::INFINITY);
    assert_eq!(engine.get_beat_timing(12), f64::INFINITY);
    assert_eq!(engine.tick(), 0);
    assert!(!engine.is_awaiting_loop_wrap());
    assert!(engine.current_map().is_none());
    assert_eq!(engine.start_time(), 7.0);
    assert_eq!(engine.loop_start_time(), 7.0);
    assert_eq!(clock.stop_count(), 1);

    // Events emitted before the reset are still readable, then the channel is closed
    assert!(beats.try_iter().count() > 0);
    assert_eq!(beats.try_recv(), Err(TryRecvError::Disconnected));
    assert_eq!(passes.try_recv(), Err(TryRecvError::Disconnected));
    advanced.try_iter().for_each(drop);
    assert_eq!(advanced.try_recv(), Err(TryRecvError::Disconnected));

    // Fresh subscriptions work after the reset
    let fresh = engine.on_advanced();
    engine.advance(8.0);
    assert_eq!(fresh.try_recv(), Ok(()));
}

#[test]
fn test_reset_then_reinitialize() {
    let (mut engine, clock) = engine_at(0.0);
    let map = grid_map("stage");
    initialize(&mut engine, &map, false);
    engine.reset();

    clock.set(3.0);
    let initialized = engine.on_initialize();
    initialize(&mut engine, &map, false);
    assert_eq!(initialized.try_iter().count(), 1);
    assert_eq!(engine.start_time(), 3.5);
}

#[test]
fn test_offsets_shift_music_time() {
    let mut definition = sixty_bpm("stage", 0, 1);
    definition.offset = 0.125;
    let map: Arc<dyn BeatMap> = Arc::new(GridBeatMap::new(definition).unwrap());
    let (mut engine, clock) = engine_at(0.0);
    initialize(&mut engine, &map, false);

    clock.set(1.5);
    assert_eq!(engine.music_time(), 1.125);

    engine.change_offset(-0.25);
    assert_eq!(engine.manual_offset(), -0.25);
    assert_eq!(engine.music_time(), 0.875);
    assert_eq!(engine.music_time_no_repeat(), 0.875);

    // Map offset makes tick 0 due a little early
    let beats = engine.on_beat();
    engine.advance(0.375);
    assert_eq!(beats.try_iter().count(), 0);
    engine.change_offset(0.0);
    engine.advance(0.375);
    assert_eq!(beats.try_iter().count(), 1);
}

#[test]
fn test_beat_time_uses_sampled_tempo() {
    let (mut engine, clock) = engine_at(0.0);
    initialize(&mut engine, &grid_map("stage"), false);
    engine.advance(0.5);
    assert_eq!(engine.current_bpm(), 60.0);
    assert_eq!(engine.current_beat_length(), 1.0);

    clock.set(2.5);
    assert_eq!(engine.music_beat_time(), 2.0);
    assert_eq!(engine.music_beat_time_no_repeat(), 2.0);
}

#[test]
fn test_idle_beat_time_uses_default_tempo() {
    let (engine, clock) = engine_at(0.0);
    clock.set(1.0);
    // 120 bpm: half a second per beat
    assert_eq!(engine.music_beat_time(), 2.0);
    assert_eq!(engine.clock().now(), 1.0);
}

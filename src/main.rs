use beatsyncrs::{
    logging,
    ui::BeatDisplay,
    validate_subdivision, Args, BeatEngine, BeatEvent, BeatMap, CancelToken, EngineConfig,
    FrameDriver, GridBeatMap, MapDefinition, SyncError, SystemClock,
};
use clap::Parser;
use futures_lite::future::block_on;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let args = Args::parse();
    initialize_logging(&args);

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn initialize_logging(args: &Args) {
    let result = if args.verbose > 0 {
        logging::init_stderr_logger(args.verbose - 1)
    } else {
        logging::init_logger()
    };
    if let Err(e) = result {
        eprintln!("Logging disabled: {}", e);
    }
    log::info!("Application starting");
}

fn demo_definition() -> MapDefinition {
    MapDefinition {
        name: "demo".to_string(),
        bpm: 128.0,
        intro_measures: 1,
        loop_measures: 2,
        ..MapDefinition::default()
    }
}

fn load_map(args: &Args) -> beatsyncrs::Result<Arc<dyn BeatMap>> {
    let definition = match &args.map {
        Some(path) => MapDefinition::load(path)?,
        None => demo_definition(),
    };
    let map = GridBeatMap::new(definition)?;
    if let Some(subdivision) = args.snap {
        validate_subdivision(subdivision, map.measure_tick_count()).map_err(SyncError::Config)?;
    }
    Ok(Arc::new(map))
}

fn run(args: Args) -> beatsyncrs::Result<()> {
    let config = EngineConfig::load(args.config.as_deref())?;
    let map = load_map(&args)?;

    let mut engine = BeatEngine::new(SystemClock::new(), &config);
    if let Some(offset) = args.offset {
        engine.change_offset(offset);
    }
    block_on(engine.initialize(Arc::clone(&map), false, &CancelToken::new()));

    let display = BeatDisplay::new(map.as_ref());
    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(config.frame_rate));
    let frames = crossbeam::channel::tick(frame_interval);

    let mut driver = FrameDriver::new(engine);
    let mut completed = 0;
    let report = driver.run(&frames, Some(args.passes), |engine, event| match event {
        BeatEvent::Beat(timing) => {
            display.beat(timing);
            if let (Some(subdivision), true) = (args.snap, timing.is_measure_start()) {
                if let Some(near) = engine.nearest_tick(subdivision) {
                    display.println(format!(
                        "measure {:>3}: nearest 1/{} tick {} ({:+.4}s)",
                        timing.measure() + 1,
                        subdivision,
                        near.tick,
                        near.delta
                    ));
                }
            }
        }
        BeatEvent::EndOfPass => {
            completed += 1;
            display.end_of_pass(completed);
        }
        _ => {}
    });
    display.finish();

    println!(
        "Played {} beats over {} passes in {} frames",
        report.beats, report.passes, report.frames
    );
    Ok(())
}

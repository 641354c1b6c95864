//! animproc - animation process
//!
//! Usage: `animproc [config.json]`

use std::path::PathBuf;

use tokio::time::{interval, MissedTickBehavior};

use animproc_core::{ClockTime, ANIM_TIME_STEP};
use animproc_runtime::{init_comms, init_tracing, AnimProcess, AnimProcessConfig, Services, TickOutcome};
use animproc_stream::InMemoryLibrary;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AnimProcessConfig::load(config_path.as_deref())?;
    init_tracing(&config.log)?;

    let mut library = InMemoryLibrary::new();
    if let Some(dir) = &config.animation_dir {
        let loaded = library.load_dir(dir)?;
        tracing::info!(dir = %dir.display(), loaded, "canned animations loaded");
    }

    let comms = init_comms(&config.transport)?;
    let mut process = AnimProcess::new(&config, comms, Box::new(library), Services::default())?;
    tracing::info!(
        tick = %humantime::format_duration(ANIM_TIME_STEP),
        robot_timeout = %humantime::format_duration(config.router.robot_silence_timeout),
        "animation process running"
    );

    let start = tokio::time::Instant::now();
    let mut ticker = interval(ANIM_TIME_STEP);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let now = ClockTime::from_nanos(start.elapsed().as_nanos() as u64);
        if process.update(now) == TickOutcome::ShutdownRequested {
            break;
        }
    }

    let stats = process.stats();
    tracing::info!(
        ticks = stats.ticks,
        from_engine = stats.frames_from_engine,
        from_robot = stats.frames_from_robot,
        dropped = stats.dropped_frames,
        "animation process exiting"
    );
    Ok(())
}

//! Follower demo against the simulated rig
//!
//! Runs the full application loop with the mock hardware: a stationary
//! calibration dwell, then a scripted beacon placed ahead and to one side of
//! the robot. The simulation is paced near real time so the status lines are
//! readable; Ctrl-C stops the run.

use anugami_core::app::{FollowerApp, Peripherals};
use anugami_core::config::FollowerConfig;
use anugami_core::devices::mock::{MockRig, RigSettings};
use anugami_core::error::Result;
use anugami_core::hal::Clock;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `anugami-core <path>` (positional)
/// - `anugami-core --config <path>` (flag-based)
/// - `anugami-core -c <path>` (short flag)
///
/// Defaults to `follower.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "follower.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        FollowerConfig::from_file(&config_path)?
    } else {
        FollowerConfig::default()
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("anugami-core starting");
    if config_found {
        log::info!("Using config: {}", config_path);
    } else {
        log::info!("No config at {}, using defaults", config_path);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;

    let mut rig = MockRig::new(RigSettings::default());
    let peripherals = Peripherals {
        clock: rig.clock(),
        emitter: rig.emitter_line(),
        timing_lines: rig.timing_lines(),
        array_elements: rig.array_elements(),
        motors: rig.motors(),
        left_ticks: rig.left_counter(),
        right_ticks: rig.right_counter(),
    };
    let mut app = FollowerApp::new(&config, peripherals)?;
    app.start();

    let world = rig.world();
    let clock = rig.clock();
    let beacon_at_ms = config.follow.calibration_dwell_ms + 500;
    let mut beacon_placed = false;

    log::info!("Press Ctrl-C to stop");

    // 5ms of simulated time per 1ms of wall time
    while !shutdown.load(Ordering::Relaxed) && !app.finished() {
        rig.advance(5);
        app.step();

        if !beacon_placed && clock.millis() >= beacon_at_ms {
            world.place_beacon(500.0, 25.0);
            beacon_placed = true;
            log::info!("Beacon placed: 500mm ahead, 25mm to the right");
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    log::info!("anugami-core stopped");
    Ok(())
}

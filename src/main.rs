use anyhow::{bail, Result};
use clap::Parser;
use colored::*;
use tracing::{debug, info, warn};

use rusty_gaze::args::{Args, Command};
use rusty_gaze::calibration::CalibrationEvent;
use rusty_gaze::config::AppConfig;
use rusty_gaze::record::{self, RunRecord};
use rusty_gaze::report::AccuracyReport;
use rusty_gaze::session::{GazeSession, SessionMode, SessionUpdate};
use rusty_gaze::simulation::{self, SyntheticSubject};

/// Upper bound on simulated calibration time before giving up.
const MAX_CALIBRATION_MS: f64 = 10.0 * 60.0 * 1000.0;
const MAX_ATTEMPTS: usize = 3;

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(method) = args.method {
        config.calibration.regression_method = method;
    }
    if let Some(method) = args.smoothing {
        config.smoothing.method = method;
    }
    if let Some(speed) = args.speed {
        config.calibration.speed = speed;
    }
}

fn log_updates(updates: &[SessionUpdate]) {
    for update in updates {
        match update {
            SessionUpdate::Calibration(CalibrationEvent::PointStarted { phase, index, target }) => {
                debug!("{} point {} -> ({:.0}, {:.0})", phase, index, target.x, target.y);
            }
            SessionUpdate::Calibration(CalibrationEvent::PhaseCompleted { phase, training_samples }) => {
                println!("{}", format!("{} done ({} samples)", phase, training_samples).cyan());
            }
            _ => {}
        }
    }
}

fn run_simulation(session: &mut GazeSession, config: &AppConfig, track_secs: f64, seed: Option<u64>) -> Result<()> {
    let viewport = config.screen.viewport();
    let dt = config.screen.frame_interval_ms();
    let mut profile = config.simulation;
    if let Some(seed) = seed {
        profile.seed = seed;
    }
    let mut subject = SyntheticSubject::new(profile, viewport);
    info!("Simulating subject (seed {}, noise {})", profile.seed, profile.noise);

    let mut t = 0.0;
    for attempt in 1..=MAX_ATTEMPTS {
        log_updates(&session.start_calibration(t));
        let deadline = t + MAX_CALIBRATION_MS;
        while session.mode() == SessionMode::Calibrating && t < deadline {
            if let Some(target) = session.controller().current_target() {
                subject.look_at(target);
            }
            let frame = subject.frame(t);
            log_updates(&session.process(&frame));
            t += dt;
        }
        match session.mode() {
            SessionMode::Tracking => break,
            SessionMode::Calibrating => bail!("calibration did not finish within {:.0}s", MAX_CALIBRATION_MS / 1000.0),
            SessionMode::NeedsCalibration => {
                warn!("Calibration attempt {} of {} aborted", attempt, MAX_ATTEMPTS);
            }
        }
    }
    if session.mode() != SessionMode::Tracking {
        bail!("calibration failed after {} attempts", MAX_ATTEMPTS);
    }

    let start = t;
    let mut total_raw = 0.0;
    let mut total_smoothed = 0.0;
    let mut count = 0usize;
    while t - start < track_secs * 1000.0 {
        let truth = simulation::orbit(&viewport, (t - start) / 1000.0);
        subject.look_at(truth);
        let frame = subject.frame(t);
        for update in session.process(&frame) {
            if let SessionUpdate::Gaze(out) = update {
                total_raw += out.raw.distance(&truth);
                total_smoothed += out.smoothed.distance(&truth);
                count += 1;
            }
        }
        t += dt;
    }

    if count > 0 {
        println!(
            "Tracking: {} points, mean raw error {:.1}px, smoothed {:.1}px ({})",
            count,
            total_raw / count as f64,
            total_smoothed / count as f64,
            session.filter_config().method.as_str()
        );
    }
    Ok(())
}

fn run_replay(session: &mut GazeSession, path: &std::path::Path) -> Result<()> {
    let frames = record::read_frames(path)?;
    let Some(first) = frames.first() else {
        bail!("{} contains no frames", path.display());
    };
    log_updates(&session.start_calibration(first.timestamp_ms));

    let mut gaze_points = 0usize;
    for frame in &frames {
        let updates = session.process(frame);
        log_updates(&updates);
        gaze_points += updates.iter().filter(|u| matches!(u, SessionUpdate::Gaze(_))).count();
    }
    info!("Replayed {} frames, {} gaze points", frames.len(), gaze_points);

    if session.mode() == SessionMode::Calibrating {
        warn!("Recording ended before calibration completed");
    }
    Ok(())
}

fn print_report(report: &AccuracyReport) {
    let verdict = if report.good { "GOOD".green().bold() } else { "POOR".red().bold() };
    println!("--------------------------------------------------");
    println!(
        "Validation: mean {:.1}px, std {:.1}px, max {:.1}px  {}",
        report.mean_error_px, report.std_dev_px, report.max_error_px, verdict
    );
    for bin in &report.histogram {
        println!("  {:>10} | {}", bin.range, "#".repeat(bin.count));
    }
    println!("--------------------------------------------------");
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "rusty_gaze=info".into()),
        )
        .init();

    let mut config = AppConfig::load_from(&args.config)?;
    apply_overrides(&mut config, &args);

    let run_id = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    info!("rusty_gaze v{} run {}", env!("CARGO_PKG_VERSION"), run_id);

    let mut session = GazeSession::new(config.calibration, config.smoothing, config.screen.viewport());

    match &args.command {
        Command::Simulate { track_secs, seed } => run_simulation(&mut session, &config, *track_secs, *seed)?,
        Command::Replay { frames } => run_replay(&mut session, frames)?,
    }

    if let Some(report) = session.last_report() {
        print_report(report);
    }

    let record = RunRecord {
        run_id,
        settings: *session.controller().settings(),
        viewport: config.screen.viewport(),
        report: session.last_report().cloned(),
        samples: if args.dump_samples { session.controller().training_samples().to_vec() } else { Vec::new() },
    };
    let path = record.save_in(&args.out_dir)?;
    println!("{}", format!("Saved {}", path.display()).green());

    Ok(())
}

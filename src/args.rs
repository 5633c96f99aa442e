use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::calibration::CalibrationSpeed;
use crate::regression::RegressionMethod;
use crate::smoothing::SmoothingMethod;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Regression method for validation and tracking
    #[arg(long, value_enum, ignore_case = true)]
    pub method: Option<RegressionMethod>,

    /// Smoothing filter
    #[arg(long, value_enum, ignore_case = true)]
    pub smoothing: Option<SmoothingMethod>,

    /// Calibration speed
    #[arg(long, value_enum, ignore_case = true)]
    pub speed: Option<CalibrationSpeed>,

    /// Directory for the accuracy report and sample dumps
    #[arg(short, long, default_value = "calibration_data")]
    pub out_dir: PathBuf,

    /// Also write the training samples (input for analyze_calibration)
    #[arg(long, default_value_t = false)]
    pub dump_samples: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Calibrate and track against a seeded synthetic subject
    Simulate {
        /// Seconds of tracking after calibration
        #[arg(long, default_value_t = 5.0)]
        track_secs: f64,

        /// Overrides the configured subject seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Feed a recorded JSON-lines frame file through the pipeline
    Replay {
        frames: PathBuf,
    },
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::calibration::CalibrationSettings;
use crate::report::AccuracyReport;
use crate::session::FrameInput;
use crate::types::{TrainingSample, Viewport};

/// Everything a finished calibration run leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub settings: CalibrationSettings,
    pub viewport: Viewport,
    pub report: Option<AccuracyReport>,
    #[serde(default)]
    pub samples: Vec<TrainingSample>,
}

impl RunRecord {
    pub fn file_name(&self) -> String {
        format!("run_{}.json", self.run_id)
    }

    /// Writes `run_<id>.json` into `data_dir`, creating it if needed.
    pub fn save_in(&self, data_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = data_dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let path = dir.join(self.file_name());
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        info!("Saved run record to {}", path.display());
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let record = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(record)
    }
}

/// Reads one [`FrameInput`] per line. Blank lines are skipped.
pub fn read_frames(path: impl AsRef<Path>) -> Result<Vec<FrameInput>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut frames = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: FrameInput = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad frame", path.display(), lineno + 1))?;
        frames.push(frame);
    }
    debug!("Read {} frames from {}", frames.len(), path.display());
    Ok(frames)
}

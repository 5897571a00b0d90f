//! Data, frame and screenshot output sinks driven by periodic tasks.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::robot::RobotState;

/// Name of the `counter`-th frame file: `prefix_0001.ext`.
///
/// Counters are zero-padded to four digits and grow wider past 9999.
pub fn frame_file_name(prefix: &str, counter: u64, ext: &str) -> String {
    format!("{prefix}_{counter:04}.{ext}")
}

/// One row of the data log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample<'a> {
    /// Simulation time.
    pub time: f64,
    /// Active phase.
    pub phase: &'a str,
    /// Forward chassis position.
    pub chassis_x: f64,
    /// Vertical chassis position.
    pub chassis_z: f64,
    /// Commanded forward speed.
    pub forward_speed: f64,
    /// Whether terrain exists under the robot.
    pub terrain: bool,
}

impl<'a> From<&'a RobotState> for Sample<'a> {
    fn from(state: &'a RobotState) -> Self {
        Self {
            time: state.time,
            phase: &state.phase,
            chassis_x: state.chassis_x,
            chassis_z: state.chassis_z,
            forward_speed: state.forward_speed,
            terrain: state.terrain_z.is_some(),
        }
    }
}

/// Appends samples as JSON lines to `data.jsonl`.
#[derive(Debug)]
pub struct DataLog {
    writer: BufWriter<File>,
    rows: u64,
}

impl DataLog {
    /// Create (or truncate) `dir/data.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be created.
    pub fn create(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file = File::create(dir.join("data.jsonl"))?;
        Ok(Self {
            writer: BufWriter::new(file),
            rows: 0,
        })
    }

    /// Append one sample.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if serialization or writing fails.
    pub fn record(&mut self, sample: &Sample<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, sample)?;
        self.writer.write_all(b"\n")?;
        self.rows = self.rows.saturating_add(1);
        Ok(())
    }

    /// Rows written so far.
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush buffered rows to disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if flushing fails.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Writes one numbered snapshot file per captured frame.
#[derive(Debug)]
pub struct FrameCapture {
    dir: PathBuf,
    prefix: String,
    ext: String,
    frames: u64,
}

impl FrameCapture {
    /// Capture frames into `dir` as `prefix_NNNN.ext`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn create(dir: PathBuf, prefix: &str, ext: &str) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.to_owned(),
            ext: ext.to_owned(),
            frames: 0,
        })
    }

    /// Write the next frame and return its path.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the frame cannot be written.
    pub fn capture(&mut self, sample: &Sample<'_>) -> io::Result<PathBuf> {
        let counter = self.frames.saturating_add(1);
        let path = self
            .dir
            .join(frame_file_name(&self.prefix, counter, &self.ext));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, sample)?;
        writer.flush()?;
        self.frames = counter;
        debug!(frame = counter, path = %path.display(), "Frame captured");
        Ok(path)
    }

    /// Frames written so far.
    pub const fn frames(&self) -> u64 {
        self.frames
    }
}

/// Screenshot sink for headless runs.
///
/// There is no window to grab pixels from, so each capture only claims the
/// next `img_NNNN.jpg` name under its directory and logs it.
#[derive(Debug)]
pub struct ScreenshotLog {
    dir: PathBuf,
    shots: u64,
}

impl ScreenshotLog {
    /// Claim screenshot names under `dir`.
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir, shots: 0 }
    }

    /// Claim the next screenshot name and return its path.
    pub fn capture(&mut self, time: f64) -> PathBuf {
        let counter = self.shots.saturating_add(1);
        let path = self.dir.join(frame_file_name("img", counter, "jpg"));
        self.shots = counter;
        debug!(shot = counter, time, path = %path.display(), "Screenshot skipped (headless)");
        path
    }

    /// Screenshots claimed so far.
    pub const fn shots(&self) -> u64 {
        self.shots
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cadence-demo-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn frame_names_are_zero_padded() {
        assert_eq!(frame_file_name("img", 1, "jpg"), "img_0001.jpg");
        assert_eq!(frame_file_name("data", 42, "dat"), "data_0042.dat");
        assert_eq!(frame_file_name("data", 12_345, "dat"), "data_12345.dat");
    }

    #[test]
    fn data_log_writes_json_lines() {
        let dir = scratch_dir("data");
        let mut log = DataLog::create(&dir).unwrap();
        let state = RobotState::posed("pose");
        log.record(&Sample::from(&state)).unwrap();
        log.record(&Sample::from(&state)).unwrap();
        log.flush().unwrap();

        let text = fs::read_to_string(dir.join("data.jsonl")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let row: serde_json::Value = serde_json::from_str(lines.first().unwrap()).unwrap();
        assert_eq!(row["phase"], "pose");
        assert_eq!(row["terrain"], false);
        assert_eq!(log.rows(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn frames_are_numbered_from_one() {
        let dir = scratch_dir("frames");
        let mut capture = FrameCapture::create(dir.clone(), "data", "dat").unwrap();
        let state = RobotState::posed("settle");
        let first = capture.capture(&Sample::from(&state)).unwrap();
        let second = capture.capture(&Sample::from(&state)).unwrap();
        assert_eq!(first, dir.join("data_0001.dat"));
        assert_eq!(second, dir.join("data_0002.dat"));
        assert!(second.exists());
        assert_eq!(capture.frames(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn screenshots_claim_numbered_names_without_writing() {
        let dir = scratch_dir("img");
        let mut shots = ScreenshotLog::new(dir.clone());
        assert_eq!(shots.capture(0.0), dir.join("img_0001.jpg"));
        assert_eq!(shots.capture(0.5), dir.join("img_0002.jpg"));
        assert_eq!(shots.shots(), 2);
        assert!(!dir.exists());
    }
}

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clipforge::{CancelToken, MediaBackend, Settings, ToolError};
use tempfile::TempDir;

/// Backend that writes `<start>-<end>` text files instead of video, with
/// scripted failures.
pub struct ScriptedBackend {
    pub duration: Option<f64>,
    pub decoded: Option<f64>,
    pub remux_fails: bool,
    pub reencode_fails: bool,
    pub segment_fails: bool,
    pub copy_fails: bool,
    /// Part starts (seconds) whose range encode fails.
    pub encode_fails_at: Vec<f64>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            decoded: None,
            remux_fails: false,
            reencode_fails: false,
            segment_fails: false,
            copy_fails: false,
            encode_fails_at: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn known_duration(&self) -> f64 {
        self.duration.or(self.decoded).unwrap_or(0.0)
    }
}

fn scripted_failure() -> ToolError {
    ToolError::Failed {
        tool: "ffmpeg".to_string(),
        code: 1,
        stderr: "Invalid data found when processing input".to_string(),
    }
}

fn write(path: &Path, text: &str) -> Result<(), ToolError> {
    std::fs::write(path, text).map_err(|source| ToolError::Io {
        tool: "ffmpeg".to_string(),
        source,
    })
}

fn check(cancel: &CancelToken) -> Result<(), ToolError> {
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled {
            tool: "ffmpeg".to_string(),
        });
    }
    Ok(())
}

impl MediaBackend for ScriptedBackend {
    fn probe_duration(&self, _path: &Path) -> Option<f64> {
        self.record("probe");
        self.duration
    }

    fn decode_duration(&self, _path: &Path, _cancel: &CancelToken) -> Option<f64> {
        self.record("decode");
        self.decoded
    }

    fn remux(&self, input: &Path, output: &Path, cancel: &CancelToken) -> Result<(), ToolError> {
        self.record("remux");
        check(cancel)?;
        assert!(input.is_file(), "remux input missing: {}", input.display());
        if self.remux_fails {
            write(output, "half a file")?;
            return Err(scripted_failure());
        }
        write(output, "remuxed")
    }

    fn reencode(
        &self,
        _input: &Path,
        output: &Path,
        cancel: &CancelToken,
        on_tick: &mut dyn FnMut(u64),
    ) -> Result<(), ToolError> {
        self.record("reencode");
        check(cancel)?;
        let total_us = (self.known_duration() * 1_000_000.0) as u64;
        for step in 1..=4 {
            on_tick(total_us / 4 * step);
        }
        if self.reencode_fails {
            write(output, "half a file")?;
            return Err(scripted_failure());
        }
        write(output, "reencoded")
    }

    fn segment(
        &self,
        input: &Path,
        pattern: &Path,
        segment_seconds: f64,
        cancel: &CancelToken,
        on_tick: &mut dyn FnMut(u64),
    ) -> Result<(), ToolError> {
        self.record("segment");
        check(cancel)?;
        assert!(input.is_file(), "segment input missing: {}", input.display());
        let total = self.known_duration();
        let pattern = pattern.to_string_lossy().to_string();
        let mut start = 0.0;
        let mut n = 1;
        while start < total {
            let end = (start + segment_seconds).min(total);
            let path = pattern.replace("%03d", &format!("{:03}", n));
            write(Path::new(&path), &format!("{:.3}-{:.3}", start, end))?;
            on_tick((end * 1_000_000.0) as u64);
            if self.segment_fails && n == 2 {
                return Err(scripted_failure());
            }
            start = end;
            n += 1;
        }
        Ok(())
    }

    fn extract_copy(
        &self,
        _input: &Path,
        output: &Path,
        start: f64,
        length: f64,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), ToolError> {
        self.record("copy");
        check(cancel)?;
        if self.copy_fails {
            write(output, "half a file")?;
            return Err(ToolError::TimedOut {
                tool: "ffmpeg".to_string(),
                after: timeout,
            });
        }
        write(output, &format!("{:.3}-{:.3}", start, start + length))
    }

    fn encode_range(
        &self,
        _input: &Path,
        output: &Path,
        start: f64,
        length: f64,
        cancel: &CancelToken,
    ) -> Result<(), ToolError> {
        self.record("encode");
        check(cancel)?;
        if self.encode_fails_at.iter().any(|s| (s - start).abs() < 1e-6) {
            write(output, "half a file")?;
            return Err(scripted_failure());
        }
        write(output, &format!("{:.3}-{:.3}", start, start + length))
    }
}

/// Source, temp and output folders for one run.
pub struct Sandbox {
    pub sources: TempDir,
    pub temp: TempDir,
    pub out: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            sources: TempDir::new().unwrap(),
            temp: TempDir::new().unwrap(),
            out: TempDir::new().unwrap(),
        }
    }

    pub fn source(&self, name: &str) -> PathBuf {
        let path = self.sources.path().join(name);
        std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42").unwrap();
        path
    }

    pub fn settings(&self) -> Settings {
        Settings {
            temp_dir: self.temp.path().to_path_buf(),
            output_root: self.out.path().to_path_buf(),
            ..Settings::default()
        }
    }

    pub fn temp_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.temp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    pub fn source_entries(&self) -> usize {
        std::fs::read_dir(self.sources.path()).unwrap().count()
    }
}

/// Parse the `<start>-<end>` text written by [`ScriptedBackend`].
pub fn written_range(path: &Path) -> (f64, f64) {
    let text = std::fs::read_to_string(path).unwrap();
    let (start, end) = text.split_once('-').unwrap();
    (start.parse().unwrap(), end.parse().unwrap())
}

//! Scripted backend for unit tests. Writes small placeholder files instead
//! of running a tool.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use super::MediaBackend;
use crate::cancel::CancelToken;
use crate::error::ToolError;

pub(crate) struct FakeBackend {
    pub probe: Option<f64>,
    pub decode: Option<f64>,
    pub remux_ok: bool,
    pub reencode_ok: bool,
    pub segment_ok: bool,
    pub copy_ok: bool,
    /// Starts (seconds) at which both copy and range encode fail.
    pub failing_starts: Vec<f64>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            probe: Some(10.0),
            decode: None,
            remux_ok: true,
            reencode_ok: true,
            segment_ok: true,
            copy_ok: true,
            failing_starts: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn fails_at(&self, start: f64) -> bool {
        self.failing_starts.iter().any(|s| (s - start).abs() < 1e-6)
    }
}

fn failed(code: i32) -> ToolError {
    ToolError::Failed {
        tool: "fake".to_string(),
        code,
        stderr: "scripted failure".to_string(),
    }
}

fn write(path: &Path, contents: String) -> Result<(), ToolError> {
    std::fs::write(path, contents).map_err(|source| ToolError::Io {
        tool: "fake".to_string(),
        source,
    })
}

fn cancelled(cancel: &CancelToken) -> Result<(), ToolError> {
    if cancel.is_cancelled() {
        Err(ToolError::Cancelled {
            tool: "fake".to_string(),
        })
    } else {
        Ok(())
    }
}

impl MediaBackend for FakeBackend {
    fn probe_duration(&self, _path: &Path) -> Option<f64> {
        self.record("probe");
        self.probe
    }

    fn decode_duration(&self, _path: &Path, _cancel: &CancelToken) -> Option<f64> {
        self.record("decode");
        self.decode
    }

    fn remux(&self, _input: &Path, output: &Path, cancel: &CancelToken) -> Result<(), ToolError> {
        self.record("remux");
        cancelled(cancel)?;
        if self.remux_ok {
            write(output, "remuxed".into())
        } else {
            write(output, "partial".into())?;
            Err(failed(1))
        }
    }

    fn reencode(
        &self,
        _input: &Path,
        output: &Path,
        cancel: &CancelToken,
        on_tick: &mut dyn FnMut(u64),
    ) -> Result<(), ToolError> {
        self.record("reencode");
        cancelled(cancel)?;
        for us in [1_000_000, 4_000_000, 3_000_000, 9_000_000] {
            on_tick(us);
        }
        if self.reencode_ok {
            write(output, "reencoded".into())
        } else {
            write(output, "partial".into())?;
            Err(failed(1))
        }
    }

    fn segment(
        &self,
        _input: &Path,
        pattern: &Path,
        segment_seconds: f64,
        cancel: &CancelToken,
        on_tick: &mut dyn FnMut(u64),
    ) -> Result<(), ToolError> {
        self.record("segment");
        cancelled(cancel)?;
        let total = self.probe.or(self.decode).unwrap_or(0.0);
        let count = (total / segment_seconds).ceil() as usize;
        let pattern = pattern.to_string_lossy().to_string();
        for n in 1..=count {
            let start = (n - 1) as f64 * segment_seconds;
            let end = (start + segment_seconds).min(total);
            write(
                Path::new(&pattern.replace("%03d", &format!("{:03}", n))),
                format!("{:.3}-{:.3}", start, end),
            )?;
            on_tick((end * 1_000_000.0) as u64);
            if !self.segment_ok {
                return Err(failed(1));
            }
        }
        Ok(())
    }

    fn extract_copy(
        &self,
        _input: &Path,
        output: &Path,
        start: f64,
        length: f64,
        _timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), ToolError> {
        self.record("copy");
        cancelled(cancel)?;
        if !self.copy_ok || self.fails_at(start) {
            write(output, "partial".into())?;
            return Err(failed(1));
        }
        write(output, format!("{:.3}-{:.3}", start, start + length))
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
        cancelled(cancel)?;
        if self.fails_at(start) {
            write(output, "partial".into())?;
            return Err(failed(1));
        }
        write(output, format!("{:.3}-{:.3}", start, start + length))
    }
}

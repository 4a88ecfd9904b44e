//! Everything that talks to the external media tool.
//!
//! The pipeline only sees [`MediaBackend`]; [`ffmpeg::FfmpegBackend`] is the
//! production implementation.

#[cfg(test)]
pub(crate) mod fake;
pub mod ffmpeg;
pub mod normalize;
pub mod probe;
pub mod validator;

use std::path::Path;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::ToolError;

/// One method per external tool invocation used by the pipeline.
///
/// Progress-reporting operations call `on_tick` with the cumulative output
/// time in microseconds, as reported by the tool.
pub trait MediaBackend: Send + Sync {
    /// Container-level duration in seconds, `None` when unknown.
    fn probe_duration(&self, path: &Path) -> Option<f64>;

    /// Duration obtained by decoding the whole file, `None` when unknown.
    fn decode_duration(&self, path: &Path, cancel: &CancelToken) -> Option<f64>;

    /// Stream-copy every stream into the container implied by `output`.
    fn remux(&self, input: &Path, output: &Path, cancel: &CancelToken) -> Result<(), ToolError>;

    /// Full decode and re-encode with the configured encode profile.
    fn reencode(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
        on_tick: &mut dyn FnMut(u64),
    ) -> Result<(), ToolError>;

    /// Single-pass stream-copy segmentation into files named by `pattern`
    /// (a printf-style `%03d` pattern, numbered from 1).
    fn segment(
        &self,
        input: &Path,
        pattern: &Path,
        segment_seconds: f64,
        cancel: &CancelToken,
        on_tick: &mut dyn FnMut(u64),
    ) -> Result<(), ToolError>;

    /// Stream-copy `[start, start + length)` into `output`, killed after `timeout`.
    fn extract_copy(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        length: f64,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), ToolError>;

    /// Decode `[start, start + length)` and re-encode it with the encode profile.
    fn encode_range(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        length: f64,
        cancel: &CancelToken,
    ) -> Result<(), ToolError>;
}

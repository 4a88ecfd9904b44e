//! Duration probing.
//!
//! A probe is cheap and idempotent, so it is never retried. When the
//! container does not report a duration, the whole file is decoded once as a
//! last resort.

use std::path::Path;

use super::MediaBackend;
use crate::cancel::CancelToken;

/// Parse the single value printed by
/// `ffprobe -show_entries format=duration -of default=noprint_wrappers=1:nokey=1`.
///
/// `N/A`, empty output, non-finite and non-positive values all mean "unknown".
pub fn parse_duration_output(output: &str) -> Option<f64> {
    let first = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let seconds: f64 = first.parse().ok()?;
    (seconds.is_finite() && seconds > 0.0).then_some(seconds)
}

/// Container duration, `None` when the tool cannot tell.
pub fn probe_duration(backend: &dyn MediaBackend, path: &Path) -> Option<f64> {
    let duration = backend.probe_duration(path);
    tracing::debug!(path = %path.display(), ?duration, "probed duration");
    duration
}

/// Probe first, then fall back to a full decode of the file.
pub fn resolve_duration(
    backend: &dyn MediaBackend,
    path: &Path,
    cancel: &CancelToken,
) -> Option<f64> {
    if let Some(seconds) = probe_duration(backend, path) {
        return Some(seconds);
    }
    if cancel.is_cancelled() {
        return None;
    }

    tracing::info!(path = %path.display(), "probe gave no duration, decoding whole file");
    backend
        .decode_duration(path, cancel)
        .filter(|s| s.is_finite() && *s > 0.0)
}

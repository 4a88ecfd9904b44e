//! Bring a source into the target container.
//!
//! Escalation order: already in the container (nothing to do), stream-copy
//! remux, full re-encode, and finally giving up and handing back the input.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::probe::probe_duration;
use super::MediaBackend;
use crate::error::SplitError;
use crate::split::naming::extension_of;
use crate::split::progress::{percent_of, PhaseProgress};
use crate::split::temp::{unique_temp_path, TempArtifacts};
use crate::split::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NormalizeOutcome {
    /// The source already used the target container.
    Unchanged,
    Remuxed,
    Reencoded,
    /// Both conversions failed; the original format is used as-is.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub path: PathBuf,
    pub outcome: NormalizeOutcome,
}

pub struct FormatNormalizer<'a> {
    backend: &'a dyn MediaBackend,
    temp_dir: &'a Path,
}

impl<'a> FormatNormalizer<'a> {
    pub fn new(backend: &'a dyn MediaBackend, temp_dir: &'a Path) -> Self {
        Self { backend, temp_dir }
    }

    /// Return a path to `path` in the `target_ext` container.
    ///
    /// Intermediate files are tracked in `temps`; the caller owns them. The
    /// only error is cancellation: a failed conversion degrades to
    /// [`NormalizeOutcome::Skipped`] and is reported as a warning event.
    pub fn ensure_container(
        &self,
        path: &Path,
        target_ext: &str,
        temps: &mut TempArtifacts,
        ctx: &RunContext,
    ) -> Result<Normalized, SplitError> {
        let target_ext = target_ext.trim_start_matches('.').to_ascii_lowercase();
        if extension_of(path).as_deref() == Some(target_ext.as_str()) {
            return Ok(Normalized {
                path: path.to_path_buf(),
                outcome: NormalizeOutcome::Unchanged,
            });
        }

        ctx.cancel.check()?;
        ctx.events
            .status(format!("Converting to {} (if needed)...", target_ext.to_uppercase()));

        let remux_out = unique_temp_path(self.temp_dir, "cf_remux", Some(&target_ext));
        temps.track(&remux_out);
        let remux_err = match self.backend.remux(path, &remux_out, &ctx.cancel) {
            Ok(()) => {
                tracing::info!(output = %remux_out.display(), "remuxed without re-encoding");
                return Ok(Normalized {
                    path: remux_out,
                    outcome: NormalizeOutcome::Remuxed,
                });
            }
            Err(e) if e.is_cancelled() => {
                temps.remove(&remux_out);
                return Err(SplitError::Cancelled);
            }
            Err(e) => {
                tracing::warn!("remux failed, re-encoding instead: {}", e);
                temps.remove(&remux_out);
                e
            }
        };

        ctx.cancel.check()?;
        ctx.events
            .status(format!("Re-encoding to {}...", target_ext.to_uppercase()));

        let encode_out = unique_temp_path(self.temp_dir, "cf_encode", Some(&target_ext));
        temps.track(&encode_out);
        let total = probe_duration(self.backend, path);
        let mut phase = PhaseProgress::start();
        let events = &ctx.events;
        let mut on_tick = |us: u64| {
            if let Some(total) = total {
                events.progress(phase.percent(percent_of(us, total)));
            }
        };

        let encode_err = match self.backend.reencode(path, &encode_out, &ctx.cancel, &mut on_tick) {
            Ok(()) => {
                tracing::info!(output = %encode_out.display(), "re-encoded source");
                return Ok(Normalized {
                    path: encode_out,
                    outcome: NormalizeOutcome::Reencoded,
                });
            }
            Err(e) if e.is_cancelled() => {
                temps.remove(&encode_out);
                return Err(SplitError::Cancelled);
            }
            Err(e) => {
                temps.remove(&encode_out);
                e
            }
        };

        let failure = SplitError::NormalizationFailed {
            target: target_ext,
            reason: format!("remux: {}; re-encode: {}", remux_err, encode_err),
        };
        tracing::warn!("{}; continuing with the original format", failure);
        ctx.events.warning(format!(
            "{}. Continuing with the original format; parts will be re-encoded.",
            failure
        ));

        Ok(Normalized {
            path: path.to_path_buf(),
            outcome: NormalizeOutcome::Skipped,
        })
    }
}

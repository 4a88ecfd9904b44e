//! Output naming and layout:
//! `<outputRoot>/Outputs/<base>/<base>_part_NNN.<ext>`.

use std::path::{Path, PathBuf};

/// Name used when sanitizing leaves nothing.
pub const PLACEHOLDER_NAME: &str = "output";

pub const OUTPUTS_DIR: &str = "Outputs";

/// Default cap on the sanitized base name length, in characters.
pub const DEFAULT_MAX_BASE_LEN: usize = 30;

const ILLEGAL_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Make `name` safe as a file name on common filesystems.
///
/// Illegal characters and whitespace runs become `_`, remaining punctuation
/// is dropped, `_` runs collapse, and the result is cut to `max_len` chars.
pub fn sanitize_basename(name: &str, max_len: usize) -> String {
    let mut safe = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                safe.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if ILLEGAL_CHARS.contains(&c) {
            safe.push('_');
        } else if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
            safe.push(c);
        }
    }

    let mut collapsed = String::with_capacity(safe.len());
    for c in safe.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    let truncated: String = collapsed
        .trim_matches('_')
        .chars()
        .take(max_len.max(1))
        .collect();
    let truncated = truncated.trim_end_matches('_');

    // A bare "." or ".." would name a directory, not a file
    if truncated.is_empty() || truncated.chars().all(|c| c == '.') {
        PLACEHOLDER_NAME.to_string()
    } else {
        truncated.to_string()
    }
}

/// Base name for a run: the explicit name when given, else the source stem.
pub fn base_name_for(source: &Path, explicit: Option<&str>, max_len: usize) -> String {
    let raw = explicit
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            source
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });
    sanitize_basename(&raw, max_len)
}

/// `<outputRoot>/Outputs/<base>`
pub fn output_dir(output_root: &Path, base: &str) -> PathBuf {
    output_root.join(OUTPUTS_DIR).join(base)
}

pub fn part_file_name(base: &str, number: usize, ext: &str) -> String {
    format!("{}_part_{:03}.{}", base, number, ext)
}

pub fn part_path(dir: &Path, base: &str, number: usize, ext: &str) -> PathBuf {
    dir.join(part_file_name(base, number, ext))
}

/// printf-style pattern handed to the tool's segment muxer.
pub fn segment_pattern(dir: &Path, base: &str, ext: &str) -> PathBuf {
    // The base is sanitized, so it cannot contain a stray '%'
    dir.join(format!("{}_part_%03d.{}", base, ext))
}

/// Lowercased extension of `path` without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

/// Existing part files numbered consecutively from 1.
pub fn collect_parts(dir: &Path, base: &str, ext: &str) -> Vec<PathBuf> {
    (1..)
        .map(|n| part_path(dir, base, n, ext))
        .take_while(|p| p.is_file())
        .collect()
}

use std::path::Path;

use crate::error::SplitError;

/// Validate a source video before any processing touches it.
/// Only checks what can be known without the media tool.
pub fn validate_source(path: &Path) -> Result<(), SplitError> {
    if path.as_os_str().is_empty() {
        return Err(SplitError::InvalidInput(
            "Please choose an input video file.".to_string(),
        ));
    }

    // Check file exists
    let meta = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SplitError::InvalidInput(format!(
                "The selected video file does not exist: {}",
                path.display()
            ))
        } else {
            SplitError::InvalidInput(format!("Cannot read file {}: {}", path.display(), e))
        }
    })?;

    if !meta.is_file() {
        return Err(SplitError::InvalidInput(format!(
            "Not a regular file: {}",
            path.display()
        )));
    }

    // Check file size > 0
    if meta.len() == 0 {
        return Err(SplitError::InvalidInput(format!(
            "File is empty: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Segment length must be a positive, finite number of seconds.
pub fn validate_segment_seconds(segment_seconds: f64) -> Result<(), SplitError> {
    if segment_seconds.is_finite() && segment_seconds > 0.0 {
        Ok(())
    } else {
        Err(SplitError::InvalidInput(format!(
            "Segment length must be positive, got {}",
            segment_seconds
        )))
    }
}

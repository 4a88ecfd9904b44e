use std::fmt;

use serde::Serialize;

use crate::error::SplitError;

/// Relative tolerance used when deciding whether `total / length` is whole.
const WHOLE_TOLERANCE: f64 = 1e-9;

/// Sources longer than this get a warning in the analysis summary.
pub const LONG_VIDEO_SECONDS: f64 = 2.0 * 60.0 * 60.0;

/// One planned part, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedSegment {
    pub number: usize,
    pub start: f64,
    pub end: f64,
}

impl PlannedSegment {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentPlan {
    total_seconds: f64,
    segment_seconds: f64,
    count: usize,
}

impl SegmentPlan {
    /// Plan `ceil(total / segment)` parts. Pure.
    pub fn new(total_seconds: f64, segment_seconds: f64) -> Result<Self, SplitError> {
        if !(total_seconds.is_finite() && total_seconds > 0.0) {
            return Err(SplitError::InvalidDuration(format!(
                "total duration must be positive, got {}",
                total_seconds
            )));
        }
        if !(segment_seconds.is_finite() && segment_seconds > 0.0) {
            return Err(SplitError::InvalidDuration(format!(
                "segment length must be positive, got {}",
                segment_seconds
            )));
        }

        let ratio = total_seconds / segment_seconds;
        let nearest = ratio.round();
        let whole = (ratio - nearest).abs() <= WHOLE_TOLERANCE * nearest.max(1.0);
        let count = if whole { nearest } else { ratio.ceil() };

        Ok(Self {
            total_seconds,
            segment_seconds,
            count: (count as usize).max(1),
        })
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    pub fn segment_seconds(&self) -> f64 {
        self.segment_seconds
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `total - length * (count - 1)`, always in `(0, length]`.
    pub fn last_segment_seconds(&self) -> f64 {
        self.segment(self.count - 1).length()
    }

    /// Boundaries of part `index` (zero-based). The last part ends at the total.
    pub fn segment(&self, index: usize) -> PlannedSegment {
        let start = index as f64 * self.segment_seconds;
        let end = if index + 1 >= self.count {
            self.total_seconds
        } else {
            ((index + 1) as f64 * self.segment_seconds).min(self.total_seconds)
        };
        PlannedSegment {
            number: index + 1,
            start,
            end,
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = PlannedSegment> + '_ {
        (0..self.count).map(move |i| self.segment(i))
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            total_seconds: self.total_seconds,
            part_count: self.count,
            last_part_seconds: self.last_segment_seconds(),
            over_two_hours: self.total_seconds > LONG_VIDEO_SECONDS,
        }
    }
}

/// What the front end shows after analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_seconds: f64,
    pub part_count: usize,
    pub last_part_seconds: f64,
    pub over_two_hours: bool,
}

impl fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Length: {}s{}. Will produce {} part(s). Last part: {}s.",
            self.total_seconds as u64,
            if self.over_two_hours { " (over 2 hours)" } else { "" },
            self.part_count,
            self.last_part_seconds as u64,
        )
    }
}

//! Split a video into fixed-length parts by driving ffmpeg.
//!
//! [`Splitter`] runs the whole pipeline on the calling thread and publishes
//! [`SplitEvent`]s through the [`RunContext`] it is given. The media tool is
//! reached only through [`MediaBackend`].

pub mod cancel;
pub mod error;
pub mod settings;
pub mod split;
pub mod video;

pub use cancel::CancelToken;
pub use error::{SplitError, ToolError};
pub use settings::{EncodeProfile, Settings};
pub use split::executor::SegmentFailure;
pub use split::orchestrator::{SplitRequest, SplitResult, Splitter, Strategy};
pub use split::plan::{AnalysisSummary, SegmentPlan};
pub use split::progress::{EventSink, ProgressSample, RunState, SplitEvent};
pub use split::RunContext;
pub use video::ffmpeg::FfmpegBackend;
pub use video::normalize::NormalizeOutcome;
pub use video::MediaBackend;

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use clipforge::split::progress::{RunState, SplitEvent};
use indicatif::{ProgressBar, ProgressStyle};

/// Plain mode prints at most one progress line per interval.
const PLAIN_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    Auto,
    Rich,
    Plain,
    Json,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedProgressMode {
    Rich,
    Plain,
    Json,
    Quiet,
}

impl ProgressMode {
    pub fn resolve_for_stderr(self) -> ResolvedProgressMode {
        self.resolve(std::io::stderr().is_terminal())
    }

    fn resolve(self, stderr_is_tty: bool) -> ResolvedProgressMode {
        match self {
            ProgressMode::Auto => {
                if stderr_is_tty {
                    ResolvedProgressMode::Rich
                } else {
                    ResolvedProgressMode::Plain
                }
            }
            ProgressMode::Rich => ResolvedProgressMode::Rich,
            ProgressMode::Plain => ResolvedProgressMode::Plain,
            ProgressMode::Json => ResolvedProgressMode::Json,
            ProgressMode::Quiet => ResolvedProgressMode::Quiet,
        }
    }
}

/// The single consumer of a worker's events.
pub struct EventRenderer {
    mode: ResolvedProgressMode,
    bar: Option<ProgressBar>,
    status: String,
    last_plain: Option<Instant>,
    warnings: Vec<String>,
}

impl EventRenderer {
    pub fn new(mode: ResolvedProgressMode) -> Self {
        let bar = (mode == ResolvedProgressMode::Rich).then(rich_bar);
        Self {
            mode,
            bar,
            status: String::new(),
            last_plain: None,
            warnings: Vec::new(),
        }
    }

    pub fn handle(&mut self, event: &SplitEvent) {
        if self.mode == ResolvedProgressMode::Json {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{}", line);
            }
        }

        match event {
            SplitEvent::State { state } => self.on_state(*state),
            SplitEvent::Status { message } => {
                self.status = message.clone();
                match (&self.bar, self.mode) {
                    (Some(bar), _) => bar.set_message(message.clone()),
                    (None, ResolvedProgressMode::Plain) => eprintln!("{}", message),
                    _ => {}
                }
            }
            SplitEvent::Analysis(summary) => self.line(&summary.to_string()),
            SplitEvent::Progress(sample) => {
                if let Some(bar) = &self.bar {
                    bar.set_position((sample.percent_complete * 10.0).round() as u64);
                    bar.set_prefix(format!("{:>3.0}%", sample.percent_complete));
                    bar.set_message(format!(
                        "ETA {} | {}",
                        fmt_secs(sample.eta_seconds),
                        self.status
                    ));
                } else if self.mode == ResolvedProgressMode::Plain {
                    let due = self
                        .last_plain
                        .map_or(true, |at| at.elapsed() >= PLAIN_INTERVAL);
                    if due || sample.percent_complete >= 100.0 {
                        self.last_plain = Some(Instant::now());
                        eprintln!(
                            "[progress] {:.1}% elapsed {} eta {}",
                            sample.percent_complete,
                            fmt_secs(sample.elapsed_seconds),
                            fmt_secs(sample.eta_seconds)
                        );
                    }
                }
            }
            SplitEvent::SegmentFailed { part, reason } => {
                self.warn(format!("part {} failed: {}", part, reason))
            }
            SplitEvent::Warning { message } => self.warn(message.clone()),
        }
    }

    /// Note something the worker did not report, such as an interrupt.
    pub fn note(&self, message: &str) {
        self.line(message);
    }

    /// Clear the bar and hand back every warning seen.
    pub fn finish(self) -> Vec<String> {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        self.warnings
    }

    fn on_state(&mut self, state: RunState) {
        // Each phase reports its own percentage
        if let Some(bar) = &self.bar {
            if matches!(
                state,
                RunState::Normalizing | RunState::SegmentingFast | RunState::SegmentingFallback
            ) {
                bar.set_position(0);
                bar.set_prefix("");
            }
        }
        if self.mode == ResolvedProgressMode::Plain {
            eprintln!("[{}]", state);
        }
    }

    fn warn(&mut self, message: String) {
        self.line(&format!("[WARN] {}", message));
        self.warnings.push(message);
    }

    fn line(&self, message: &str) {
        match (&self.bar, self.mode) {
            (Some(bar), _) => bar.println(message),
            (None, ResolvedProgressMode::Plain) => eprintln!("{}", message),
            _ => {}
        }
    }
}

fn rich_bar() -> ProgressBar {
    let bar = ProgressBar::new(1000);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {prefix} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("=> "));
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// `1h02m03s`, `2m05s` or `12s`.
pub fn fmt_secs(seconds: f64) -> String {
    let total = if seconds.is_finite() { seconds.max(0.0).round() as u64 } else { 0 };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

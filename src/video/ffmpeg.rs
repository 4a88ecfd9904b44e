use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::Mutex as StdMutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use super::probe::parse_duration_output;
use super::MediaBackend;
use crate::cancel::CancelToken;
use crate::error::ToolError;
use crate::settings::{EncodeProfile, Settings};

/// Windows flag to prevent child processes from creating visible console windows.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// How often a waiting process is polled for exit, cancellation and timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Characters of stderr kept for error messages.
const STDERR_TAIL: usize = 1000;

/// Create a Command that won't spawn a visible console window on Windows.
pub fn hidden_command<S: AsRef<std::ffi::OsStr>>(program: S) -> Command {
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

// ---------------------------------------------------------------------------
// Global child-process tracker -- lets us kill in-flight ffmpeg on interrupt
// ---------------------------------------------------------------------------
static ACTIVE_PIDS: StdMutex<Vec<u32>> = StdMutex::new(Vec::new());

pub fn register_pid(pid: u32) {
    if let Ok(mut pids) = ACTIVE_PIDS.lock() {
        pids.push(pid);
    }
}

pub fn unregister_pid(pid: u32) {
    if let Ok(mut pids) = ACTIVE_PIDS.lock() {
        pids.retain(|&p| p != pid);
    }
}

/// Kill every tracked child process. Called when the user interrupts a run.
pub fn kill_all_children() {
    if let Ok(mut pids) = ACTIVE_PIDS.lock() {
        for pid in pids.drain(..) {
            tracing::debug!(pid, "killing tracked child process");
            let _ = kill_command(pid)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }
}

#[cfg(windows)]
fn kill_command(pid: u32) -> Command {
    // /F = force, /T = kill child tree
    let mut cmd = hidden_command("taskkill");
    cmd.args(["/F", "/T", "/PID", &pid.to_string()]);
    cmd
}

#[cfg(not(windows))]
fn kill_command(pid: u32) -> Command {
    let mut cmd = hidden_command("kill");
    cmd.args(["-KILL", &pid.to_string()]);
    cmd
}

/// Unregisters the PID when the child has been waited on or abandoned.
struct TrackedPid(u32);

impl TrackedPid {
    fn track(child: &Child) -> Self {
        let pid = child.id();
        register_pid(pid);
        TrackedPid(pid)
    }
}

impl Drop for TrackedPid {
    fn drop(&mut self) {
        unregister_pid(self.0);
    }
}

// ---------------------------------------------------------------------------
// Tool discovery
// ---------------------------------------------------------------------------

/// Common Windows install locations checked after PATH.
const COMMON_INSTALL_DIRS: &[&str] = &[
    r"C:\ffmpeg\bin",
    r"C:\Program Files\ffmpeg\bin",
    r"C:\tools\ffmpeg\bin",
];

/// Find a tool executable.
/// Checks: explicit setting, bundled alongside exe, PATH, common install locations
pub fn locate_tool(tool: &'static str, explicit: Option<&Path>) -> Result<PathBuf, ToolError> {
    if let Some(path) = explicit {
        return which::which(path).map_err(|e| {
            tracing::warn!(tool, path = %path.display(), "configured tool path unusable: {}", e);
            ToolError::NotFound { tool }
        });
    }

    let file_name = format!("{}{}", tool, std::env::consts::EXE_SUFFIX);

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let bundled = dir.join(&file_name);
            if bundled.is_file() {
                return Ok(bundled);
            }
        }
    }

    if let Ok(found) = which::which(tool) {
        return Ok(found);
    }

    COMMON_INSTALL_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(&file_name))
        .find(|p| p.is_file())
        .ok_or(ToolError::NotFound { tool })
}

fn tool_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string())
}

// ---------------------------------------------------------------------------
// Progress stream
// ---------------------------------------------------------------------------

/// One meaningful line of ffmpeg's `-progress` key=value output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLine {
    /// Cumulative output time in microseconds.
    OutTime(u64),
    /// `progress=continue`: end of one progress block.
    Continue,
    /// `progress=end`: the tool will report nothing further.
    End,
}

/// Parse a `-progress` line. `out_time_ms` is accepted as well as
/// `out_time_us`: ffmpeg reports both in microseconds.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    match key.trim() {
        "out_time_us" | "out_time_ms" => value
            .parse::<i64>()
            .ok()
            .map(|us| ProgressLine::OutTime(us.max(0) as u64)),
        "progress" if value == "end" => Some(ProgressLine::End),
        "progress" => Some(ProgressLine::Continue),
        _ => None,
    }
}

/// Collect stderr on a helper thread so a chatty tool can never fill the pipe.
fn drain_stderr(stderr: Option<ChildStderr>) -> Option<JoinHandle<String>> {
    let stderr = stderr?;
    Some(thread::spawn(move || {
        let mut all_stderr = String::new();
        for line in BufReader::new(stderr).lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            all_stderr.push_str(&line);
            all_stderr.push('\n');
        }
        all_stderr
    }))
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    let all = handle.and_then(|h| h.join().ok()).unwrap_or_default();
    let trimmed = all.trim();
    let skip = trimmed.chars().count().saturating_sub(STDERR_TAIL);
    trimmed.chars().skip(skip).collect()
}

fn spawn(cmd: &mut Command, tool: &str) -> Result<Child, ToolError> {
    tracing::debug!(command = ?cmd, "spawning {}", tool);
    cmd.stdin(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })
}

fn check_status(tool: &str, status: ExitStatus, stderr: String) -> Result<(), ToolError> {
    if status.success() {
        Ok(())
    } else {
        Err(ToolError::Failed {
            tool: tool.to_string(),
            code: status.code().unwrap_or(-1),
            stderr,
        })
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run a tool that writes `-progress pipe:1` lines, forwarding output times
/// to `on_tick` until the end marker. The read loop runs on the calling
/// (worker) thread.
pub fn run_with_progress(
    mut cmd: Command,
    cancel: &CancelToken,
    on_tick: &mut dyn FnMut(u64),
) -> Result<(), ToolError> {
    let tool = tool_name(Path::new(cmd.get_program()));
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled { tool });
    }

    let mut child = spawn(cmd.stdout(Stdio::piped()), &tool)?;
    let _tracked = TrackedPid::track(&child);
    let stderr_thread = drain_stderr(child.stderr.take());

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            if cancel.is_cancelled() {
                kill_and_reap(&mut child);
                let _ = join_stderr(stderr_thread);
                return Err(ToolError::Cancelled { tool });
            }
            match parse_progress_line(&line) {
                Some(ProgressLine::OutTime(us)) => on_tick(us),
                Some(ProgressLine::End) => break,
                _ => {}
            }
        }
    }

    let status = child.wait().map_err(|source| ToolError::Io {
        tool: tool.clone(),
        source,
    })?;
    let stderr = join_stderr(stderr_thread);
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled { tool });
    }
    check_status(&tool, status, stderr)
}

/// Run a tool to completion, killing it on cancellation or once `timeout`
/// (when given) has elapsed.
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<(), ToolError> {
    let tool = tool_name(Path::new(cmd.get_program()));
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled { tool });
    }

    let mut child = spawn(cmd.stdout(Stdio::null()), &tool)?;
    let _tracked = TrackedPid::track(&child);
    let stderr_thread = drain_stderr(child.stderr.take());
    let deadline = timeout.map(|t| Instant::now() + t);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                kill_and_reap(&mut child);
                return Err(ToolError::Io { tool, source });
            }
        }
        if cancel.is_cancelled() {
            kill_and_reap(&mut child);
            let _ = join_stderr(stderr_thread);
            return Err(ToolError::Cancelled { tool });
        }
        if let (Some(deadline), Some(after)) = (deadline, timeout) {
            if Instant::now() >= deadline {
                kill_and_reap(&mut child);
                let _ = join_stderr(stderr_thread);
                return Err(ToolError::TimedOut { tool, after });
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stderr = join_stderr(stderr_thread);
    check_status(&tool, status, stderr)
}

/// Spawn a command, track its PID, wait for output, then untrack.
/// This is the safe replacement for `cmd.output()` -- if the run is
/// interrupted mid-process, `kill_all_children()` will clean it up.
pub fn tracked_output(mut cmd: Command) -> Result<std::process::Output, ToolError> {
    let tool = tool_name(Path::new(cmd.get_program()));
    let child = spawn(cmd.stdout(Stdio::piped()), &tool)?;
    let _tracked = TrackedPid::track(&child);
    child
        .wait_with_output()
        .map_err(|source| ToolError::Io { tool, source })
}

/// First line of `<tool> -version`.
pub fn tool_version(program: &Path) -> Result<String, ToolError> {
    let mut cmd = hidden_command(program);
    cmd.arg("-version");
    let output = tracked_output(cmd)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: tool_name(program),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

fn ensure_written(output: &Path, program: &Path) -> Result<(), ToolError> {
    if output.is_file() {
        Ok(())
    } else {
        Err(ToolError::MissingOutput {
            tool: tool_name(program),
            path: output.to_path_buf(),
        })
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// [`MediaBackend`] that shells out to ffmpeg and ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    profile: EncodeProfile,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, profile: EncodeProfile) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            profile,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ToolError> {
        let ffmpeg = locate_tool("ffmpeg", settings.ffmpeg_path.as_deref())?;
        let ffprobe = locate_tool("ffprobe", settings.ffprobe_path.as_deref())?;
        tracing::debug!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "resolved tools");
        Ok(Self::new(ffmpeg, ffprobe, settings.encode.clone()))
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }

    /// ffmpeg with the flags every invocation shares.
    fn ffmpeg(&self) -> Command {
        let mut cmd = hidden_command(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-y"]);
        cmd
    }

    /// Video + audio encoder arguments from the profile.
    fn encode_args(&self) -> Vec<String> {
        let p = &self.profile;
        vec![
            "-c:v".into(),
            p.video_codec.clone(),
            "-preset".into(),
            p.preset.clone(),
            "-crf".into(),
            p.crf.to_string(),
            "-c:a".into(),
            p.audio_codec.clone(),
            "-b:a".into(),
            p.audio_bitrate.clone(),
        ]
    }

    /// Arguments for re-encoding `[start, start + length)`. `-ss` goes before
    /// `-i` so ffmpeg seeks the input instead of decoding up to `start`.
    fn range_encode_args(&self, input: &Path, output: &Path, start: f64, length: f64) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-loglevel", "error", "-ss", &format!("{:.3}", start), "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(input.into());
        args.push("-t".into());
        args.push(format!("{:.3}", length).into());
        args.extend(self.encode_args().into_iter().map(OsString::from));
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(output.into());
        args
    }
}

impl MediaBackend for FfmpegBackend {
    fn probe_duration(&self, path: &Path) -> Option<f64> {
        let mut cmd = hidden_command(&self.ffprobe);
        cmd.args([
            "-v", "error",
            "-show_entries", "format=duration",
            "-of", "default=noprint_wrappers=1:nokey=1",
        ]);
        cmd.arg(path);

        match tracked_output(cmd) {
            Ok(output) if output.status.success() => {
                parse_duration_output(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                tracing::debug!(
                    path = %path.display(),
                    "ffprobe failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "ffprobe did not run: {}", e);
                None
            }
        }
    }

    fn decode_duration(&self, path: &Path, cancel: &CancelToken) -> Option<f64> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-v", "error", "-i"]);
        cmd.arg(path);
        cmd.args(["-f", "null", "-progress", "pipe:1", "-"]);

        let mut longest_us = 0u64;
        match run_with_progress(cmd, cancel, &mut |us| longest_us = longest_us.max(us)) {
            Ok(()) if longest_us > 0 => Some(longest_us as f64 / 1_000_000.0),
            Ok(()) => None,
            Err(e) => {
                tracing::debug!(path = %path.display(), "full decode failed: {}", e);
                None
            }
        }
    }

    fn remux(&self, input: &Path, output: &Path, cancel: &CancelToken) -> Result<(), ToolError> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-loglevel", "error", "-i"]);
        cmd.arg(input);
        cmd.args([
            "-c", "copy",
            "-map", "0",
            "-bsf:a", "aac_adtstoasc",
            "-movflags", "+faststart",
        ]);
        cmd.arg(output);

        run_with_timeout(cmd, None, cancel)?;
        ensure_written(output, &self.ffmpeg)
    }

    fn reencode(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelToken,
        on_tick: &mut dyn FnMut(u64),
    ) -> Result<(), ToolError> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-loglevel", "error", "-i"]);
        cmd.arg(input);
        cmd.args(self.encode_args());
        cmd.args(["-movflags", "+faststart", "-progress", "pipe:1"]);
        cmd.arg(output);

        run_with_progress(cmd, cancel, on_tick)?;
        ensure_written(output, &self.ffmpeg)
    }

    fn segment(
        &self,
        input: &Path,
        pattern: &Path,
        segment_seconds: f64,
        cancel: &CancelToken,
        on_tick: &mut dyn FnMut(u64),
    ) -> Result<(), ToolError> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-loglevel", "error", "-i"]);
        cmd.arg(input);
        cmd.args([
            "-c", "copy",
            "-map", "0",
            "-f", "segment",
            "-segment_time", &format!("{}", segment_seconds),
            "-segment_start_number", "1",
            "-reset_timestamps", "1",
            "-progress", "pipe:1",
        ]);
        cmd.arg(pattern);

        run_with_progress(cmd, cancel, on_tick)
    }

    fn extract_copy(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        length: f64,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), ToolError> {
        let mut cmd = self.ffmpeg();
        cmd.args(["-loglevel", "error", "-ss", &format!("{:.3}", start), "-i"]);
        cmd.arg(input);
        cmd.args([
            "-t", &format!("{:.3}", length),
            "-c", "copy",
            "-avoid_negative_ts", "make_zero",
        ]);
        cmd.arg(output);

        run_with_timeout(cmd, Some(timeout), cancel)?;
        ensure_written(output, &self.ffmpeg)
    }

    fn encode_range(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        length: f64,
        cancel: &CancelToken,
    ) -> Result<(), ToolError> {
        let mut cmd = self.ffmpeg();
        cmd.args(self.range_encode_args(input, output, start, length));

        run_with_timeout(cmd, None, cancel)?;
        ensure_written(output, &self.ffmpeg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_lines_are_parsed() {
        assert_eq!(
            parse_progress_line("out_time_us=1500000"),
            Some(ProgressLine::OutTime(1_500_000))
        );
        assert_eq!(
            parse_progress_line("out_time_ms=2000000\n"),
            Some(ProgressLine::OutTime(2_000_000))
        );
        assert_eq!(parse_progress_line("progress=continue"), Some(ProgressLine::Continue));
        assert_eq!(parse_progress_line("  progress=end  "), Some(ProgressLine::End));
    }

    #[test]
    fn unknown_or_unavailable_values_are_ignored() {
        assert_eq!(parse_progress_line("out_time_us=N/A"), None);
        assert_eq!(parse_progress_line("out_time=00:00:01.000000"), None);
        assert_eq!(parse_progress_line("frame=42"), None);
        assert_eq!(parse_progress_line("garbage"), None);
    }

    #[test]
    fn negative_output_time_clamps_to_zero() {
        assert_eq!(
            parse_progress_line("out_time_us=-23220"),
            Some(ProgressLine::OutTime(0))
        );
    }

    #[test]
    fn tool_name_strips_directory_and_extension() {
        assert_eq!(tool_name(Path::new("/usr/bin/ffmpeg")), "ffmpeg");
        assert_eq!(tool_name(Path::new(r"ffprobe.exe")), "ffprobe");
    }

    #[test]
    fn encode_args_follow_profile() {
        let backend = FfmpegBackend::new(
            PathBuf::from("ffmpeg"),
            PathBuf::from("ffprobe"),
            EncodeProfile {
                crf: 18,
                ..EncodeProfile::default()
            },
        );
        let args = backend.encode_args();
        assert_eq!(
            args,
            ["-c:v", "libx264", "-preset", "veryfast", "-crf", "18", "-c:a", "aac", "-b:a", "192k"]
        );
    }

    #[test]
    fn range_encode_seeks_before_opening_the_input() {
        let backend = FfmpegBackend::new(
            PathBuf::from("ffmpeg"),
            PathBuf::from("ffprobe"),
            EncodeProfile::default(),
        );
        let args = backend.range_encode_args(Path::new("in.mp4"), Path::new("out.mp4"), 90.0, 30.0);
        let pos = |needle: &str| args.iter().position(|a| a == needle).unwrap();

        assert!(pos("-ss") < pos("-i"));
        assert_eq!(args[pos("-ss") + 1], "90.000");
        assert_eq!(args[pos("-i") + 1], "in.mp4");
        assert!(pos("-i") < pos("-t"));
        assert_eq!(args[pos("-t") + 1], "30.000");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_a_slow_process() {
        let mut cmd = hidden_command("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let err = run_with_timeout(cmd, Some(Duration::from_millis(200)), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_failure() {
        let mut cmd = hidden_command("sh");
        cmd.args(["-c", "echo broken >&2; exit 3"]);
        let err = run_with_timeout(cmd, None, &CancelToken::new()).unwrap_err();
        match err {
            ToolError::Failed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn progress_stream_stops_at_end_marker() {
        let mut cmd = hidden_command("sh");
        cmd.args([
            "-c",
            "printf 'out_time_us=1000000\\nprogress=continue\\nout_time_us=2500000\\nprogress=end\\n'",
        ]);
        let mut ticks = Vec::new();
        run_with_progress(cmd, &CancelToken::new(), &mut |us| ticks.push(us)).unwrap();
        assert_eq!(ticks, vec![1_000_000, 2_500_000]);
    }

    #[test]
    fn cancelled_token_prevents_spawning() {
        let token = CancelToken::new();
        token.cancel();
        let err = run_with_timeout(hidden_command("definitely-not-a-tool"), None, &token)
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file looked up next to the executable and in the working directory.
pub const SETTINGS_FILE_NAME: &str = "clipforge.json";

/// Encoder parameters used whenever a re-encode is needed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncodeProfile {
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub segment_seconds: f64,
    pub output_root: PathBuf,
    pub target_extension: String,
    pub temp_dir: PathBuf,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub copy_timeout_secs: u64,
    pub long_path_threshold: usize,
    pub max_base_name_len: usize,
    pub encode: EncodeProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            segment_seconds: 30.0,
            output_root: app_directory(),
            target_extension: "mp4".to_string(),
            temp_dir: std::env::temp_dir(),
            ffmpeg_path: None,
            ffprobe_path: None,
            copy_timeout_secs: 300,
            long_path_threshold: 200,
            max_base_name_len: 30,
            encode: EncodeProfile::default(),
        }
    }
}

impl Settings {
    pub fn copy_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_timeout_secs.max(1))
    }

    /// Target extension without a leading dot, lowercased.
    pub fn target_ext(&self) -> String {
        self.target_extension
            .trim_start_matches('.')
            .to_ascii_lowercase()
    }

    /// Load settings from `path`, or from the default lookup locations when
    /// `path` is `None`. A missing default file yields the defaults; an
    /// explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        match path {
            Some(p) => Self::read_file(p),
            None => match default_settings_paths().into_iter().find(|p| p.is_file()) {
                Some(p) => Self::read_file(&p),
                None => Ok(Self::default()),
            },
        }
    }

    fn read_file(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings {}: {}", path.display(), e))?;
        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|e| format!("Failed to parse settings {}: {}", path.display(), e))?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory: {}", e))?;
        }
        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))
    }
}

/// Directory of the running executable, falling back to the working directory.
pub fn app_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_settings_paths() -> Vec<PathBuf> {
    let mut candidates = vec![app_directory().join(SETTINGS_FILE_NAME)];
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(SETTINGS_FILE_NAME));
    }
    candidates
}

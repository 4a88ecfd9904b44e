use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clipforge::settings::{app_directory, SETTINGS_FILE_NAME};
use clipforge::Settings;

/// Print the effective settings as JSON.
pub fn show(settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    println!("{}", json);
    Ok(())
}

/// Write default settings to `path`, or next to the executable.
pub fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| app_directory().join(SETTINGS_FILE_NAME));
    write_defaults(&path, force)?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}

fn write_defaults(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Settings::default().save(path).map_err(anyhow::Error::msg)
}

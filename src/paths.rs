use anyhow::{Context, Result};
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

pub const SCREENSHOT_DIR_NAME: &str = "screenshots";
pub const REPORT_DIR_NAME: &str = "GeneratedReports";

/// On-disk layout for a duty-tracker run, rooted at the data directory.
#[derive(Debug, Clone)]
pub struct DirLayout {
    base: PathBuf,
}

impl DirLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.base.join(SCREENSHOT_DIR_NAME)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.base.join(REPORT_DIR_NAME)
    }

    /// Create the screenshot and report directories up front so hotkey
    /// handlers never race directory creation mid-session.
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.screenshots_dir(), self.reports_dir()] {
            create_dir_all(&dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

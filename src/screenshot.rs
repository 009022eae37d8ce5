use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Which moment of a duty session a screenshot documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotKind {
    Start,
    Proof,
    End,
}

impl ShotKind {
    pub fn label(self) -> &'static str {
        match self {
            ShotKind::Start => "start",
            ShotKind::Proof => "proof",
            ShotKind::End => "end",
        }
    }
}

/// A screenshot taken during a duty session. Events are appended in capture
/// order and consumed in that order by the report writer.
#[derive(Debug, Clone)]
pub struct ScreenshotEvent {
    pub kind: ShotKind,
    pub path: PathBuf,
    pub captured_at: DateTime<Utc>,
}

#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    async fn capture(&self, output_path: &Path) -> Result<()>;
}

/// Capture one screenshot into `dir`, naming the file after the shot kind and
/// the UTC capture time (`<kind>_<YYYYMMDD_HHMMSS>.png`).
pub async fn capture_event(
    provider: &dyn ScreenshotProvider,
    dir: &Path,
    kind: ShotKind,
) -> Result<ScreenshotEvent> {
    let captured_at = Utc::now();
    let filename = format!(
        "{}_{}.png",
        kind.label(),
        captured_at.format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(filename);

    provider
        .capture(&path)
        .await
        .with_context(|| format!("{} screenshot failed", kind.label()))?;

    Ok(ScreenshotEvent {
        kind,
        path,
        captured_at,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MacOsScreenshotProvider;

const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
impl ScreenshotProvider for MacOsScreenshotProvider {
    async fn capture(&self, output_path: &Path) -> Result<()> {
        let mut command = Command::new("screencapture");
        command.arg("-x").arg("-t").arg("png").arg(output_path);

        let status = timeout(SCREENSHOT_TIMEOUT, command.status())
            .await
            .map_err(|_| {
                anyhow!(
                    "screencapture timed out after {:.0}s — check Screen Recording permission",
                    SCREENSHOT_TIMEOUT.as_secs_f32()
                )
            })?
            .context("failed to execute screencapture")?;

        if !status.success() {
            bail!("screencapture exited with status {status}");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MockScreenshotProvider;

#[async_trait]
impl ScreenshotProvider for MockScreenshotProvider {
    async fn capture(&self, output_path: &Path) -> Result<()> {
        std::fs::write(output_path, b"mock-image").with_context(|| {
            format!(
                "failed to write mock screenshot at {}",
                output_path.display()
            )
        })?;
        Ok(())
    }
}

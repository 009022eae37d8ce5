use crate::screenshot::{ScreenshotEvent, ShotKind};
use crate::session::Session;
use crate::upload::ImageHost;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sentinel written in place of a link when an upload fails. A partial report
/// is preferred over no report.
pub const UPLOAD_FAILED_MARKER: &str = "Upload Failed";

/// Header fallback when a session recorded no proof screenshot.
pub const DEFAULT_HEADER_IMAGE_URL: &str = "https://i.imgur.com/removed.png";

/// Turns a closed session into a plain-text report with uploaded image links.
pub struct ReportWriter {
    uploader: Arc<dyn ImageHost>,
    reports_dir: PathBuf,
    username: String,
    duty_reason: String,
}

impl ReportWriter {
    pub fn new(
        uploader: Arc<dyn ImageHost>,
        reports_dir: PathBuf,
        username: String,
        duty_reason: String,
    ) -> Self {
        Self {
            uploader,
            reports_dir,
            username,
            duty_reason,
        }
    }

    /// Write the report for `session`, at most once. A second call after a
    /// report was emitted is a silent no-op returning `Ok(None)`.
    pub async fn generate(&self, session: &mut Session) -> Result<Option<PathBuf>> {
        if session.report_emitted() {
            return Ok(None);
        }

        let selection = select_images(session.events())?;
        let start_time = session
            .start_time()
            .context("session has no start time")?;
        let end_time = session.end_time().context("session has no end time")?;

        let start_link = self.upload_or_marker(&selection.start.path).await;
        let header_link = match selection.header {
            Some(event) => self.upload_or_marker(&event.path).await,
            None => DEFAULT_HEADER_IMAGE_URL.to_string(),
        };
        let end_link = self.upload_or_marker(&selection.end.path).await;

        let body = render_report(
            &self.username,
            &self.duty_reason,
            &header_link,
            &format_time(&start_time.with_timezone(&Local)),
            &start_link,
            &format_time(&end_time.with_timezone(&Local)),
            &end_link,
        );

        std::fs::create_dir_all(&self.reports_dir).with_context(|| {
            format!(
                "failed to create report directory {}",
                self.reports_dir.display()
            )
        })?;
        let report_path = self.reports_dir.join(format!(
            "duty_report_{}.txt",
            start_time.format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&report_path, body)
            .with_context(|| format!("failed to write report {}", report_path.display()))?;

        // Set even though uploads may have been substituted with the failure
        // marker: at most one report per session.
        session.mark_report_emitted();

        Ok(Some(report_path))
    }

    async fn upload_or_marker(&self, path: &Path) -> String {
        match self.uploader.upload(path).await {
            Ok(url) => url,
            Err(err) => {
                eprintln!("upload failed for {}: {err:#}", path.display());
                UPLOAD_FAILED_MARKER.to_string()
            }
        }
    }
}

struct ImageSelection<'a> {
    start: &'a ScreenshotEvent,
    header: Option<&'a ScreenshotEvent>,
    end: &'a ScreenshotEvent,
}

/// Typed selection: first event is the start image, last event is the end
/// image, and the header is the last proof taken before the end. Tolerates any
/// number of proof screenshots, including none.
fn select_images(events: &[ScreenshotEvent]) -> Result<ImageSelection<'_>> {
    if events.len() < 2 {
        bail!("report requires both a start and an end screenshot");
    }
    let start = &events[0];
    let end = &events[events.len() - 1];
    let header = events
        .iter()
        .filter(|event| event.kind == ShotKind::Proof)
        .next_back();
    Ok(ImageSelection { start, header, end })
}

/// `HH:MM` plus a GMT offset label: `+0000` renders as plain `GMT`, any other
/// offset as `GMT` followed by the signed hour component only. The minute part
/// of the offset is intentionally dropped (`+0930` -> `GMT9`) to match the
/// established report format.
fn format_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    let offset = time.format("%z").to_string();
    let label = if offset == "+0000" {
        "GMT".to_string()
    } else {
        offset
            .get(..3)
            .and_then(|hours| hours.parse::<i32>().ok())
            .map(|hours| format!("GMT{hours}"))
            .unwrap_or_else(|| "GMT".to_string())
    };
    format!("{} {}", time.format("%H:%M"), label)
}

fn render_report(
    username: &str,
    duty_reason: &str,
    header_link: &str,
    started: &str,
    start_link: &str,
    ended: &str,
    end_link: &str,
) -> String {
    format!(
        "Username: {username}\n\
         Duty: {duty_reason}\n\
         {header_link}\n\
         \n\
         Time Started: {started}\n\
         Tablist Started: {start_link}\n\
         \n\
         Time Ended: {ended}\n\
         Tablist Ended: {end_link}\n\
         \n"
    )
}

use crate::notify::{Notifier, ReminderHandle, schedule_reminder};
use crate::report::ReportWriter;
use crate::screenshot::{ScreenshotEvent, ScreenshotProvider, ShotKind, capture_event};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Closed,
}

/// One duty session: the interval between a start trigger and its matching end
/// trigger, plus every screenshot captured in between.
///
/// Transitions are explicit so an out-of-order trigger is rejected instead of
/// being inferred from a nullable timestamp.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    events: Vec<ScreenshotEvent>,
    report_emitted: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            start_time: None,
            end_time: None,
            events: Vec::new(),
            report_emitted: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Screenshot events in capture order.
    pub fn events(&self) -> &[ScreenshotEvent] {
        &self.events
    }

    pub fn report_emitted(&self) -> bool {
        self.report_emitted
    }

    pub fn mark_report_emitted(&mut self) {
        self.report_emitted = true;
    }

    /// Idle -> Active with the start screenshot already captured.
    pub fn begin(&mut self, event: ScreenshotEvent) -> Result<()> {
        if self.state != SessionState::Idle {
            bail!("session already started");
        }
        self.start_time = Some(event.captured_at);
        self.events.push(event);
        self.state = SessionState::Active;
        Ok(())
    }

    pub fn add_proof(&mut self, event: ScreenshotEvent) -> Result<()> {
        if self.state != SessionState::Active {
            bail!("no active session to attach proof to");
        }
        self.events.push(event);
        Ok(())
    }

    /// Active -> Closed with the end screenshot already captured.
    pub fn finish(&mut self, event: ScreenshotEvent) -> Result<()> {
        if self.state != SessionState::Active {
            bail!("no active session to end");
        }
        self.end_time = Some(event.captured_at);
        self.events.push(event);
        self.state = SessionState::Closed;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StartEnd,
    Proof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started { screenshot: PathBuf },
    Ended { report: PathBuf },
    ProofCaptured { screenshot: PathBuf },
    NotOnDuty,
}

/// Owns the live session and wires the trigger entry points to the capture,
/// reminder, and report collaborators.
///
/// All mutation happens on a single worker task; the hotkey dispatcher only
/// forwards triggers over a channel.
pub struct DutyTracker {
    screenshots: Arc<dyn ScreenshotProvider>,
    notifier: Arc<dyn Notifier>,
    report_writer: ReportWriter,
    screenshot_dir: PathBuf,
    reminder_after: Option<Duration>,
    reminder: Option<ReminderHandle>,
    session: Session,
}

impl DutyTracker {
    pub fn new(
        screenshots: Arc<dyn ScreenshotProvider>,
        notifier: Arc<dyn Notifier>,
        report_writer: ReportWriter,
        screenshot_dir: PathBuf,
        reminder_after: Option<Duration>,
    ) -> Self {
        Self {
            screenshots,
            notifier,
            report_writer,
            screenshot_dir,
            reminder_after,
            reminder: None,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn handle(&mut self, trigger: Trigger) -> Result<TriggerOutcome> {
        match trigger {
            Trigger::StartEnd => self.on_start_end().await,
            Trigger::Proof => self.on_proof().await,
        }
    }

    /// Start a session when idle, end it (and emit the report) when active.
    ///
    /// The screenshot is taken before any state change, so a capture failure
    /// leaves the session exactly as it was.
    pub async fn on_start_end(&mut self) -> Result<TriggerOutcome> {
        match self.session.state() {
            SessionState::Idle => {
                let event = capture_event(
                    self.screenshots.as_ref(),
                    &self.screenshot_dir,
                    ShotKind::Start,
                )
                .await?;
                let screenshot = event.path.clone();
                self.session.begin(event)?;

                if let Some(delay) = self.reminder_after {
                    self.reminder = Some(schedule_reminder(
                        self.notifier.clone(),
                        delay,
                        "Duty session still running".to_string(),
                        format!(
                            "Started {} ago. Press your start/end keybind to finish and generate the report.",
                            humantime::format_duration(delay)
                        ),
                    ));
                }

                Ok(TriggerOutcome::Started { screenshot })
            }
            SessionState::Active => {
                if let Some(reminder) = self.reminder.take() {
                    reminder.cancel();
                }

                let event = capture_event(
                    self.screenshots.as_ref(),
                    &self.screenshot_dir,
                    ShotKind::End,
                )
                .await?;
                self.session.finish(event)?;

                let report_result = self.report_writer.generate(&mut self.session).await;

                // The session cannot be resumed once finished; discard it
                // either way so the next start trigger opens a fresh cycle
                // instead of hitting the closed session forever.
                let screenshot_dir = self.screenshot_dir.clone();
                self.session = Session::new();

                let report = report_result
                    .with_context(|| {
                        format!(
                            "report generation failed; session discarded, screenshots kept in {}",
                            screenshot_dir.display()
                        )
                    })?
                    .context("report was already emitted for this session")?;

                Ok(TriggerOutcome::Ended { report })
            }
            SessionState::Closed => bail!("session already closed"),
        }
    }

    /// Capture a mid-session proof screenshot. Outside an active session this
    /// is a user-visible no-op.
    pub async fn on_proof(&mut self) -> Result<TriggerOutcome> {
        if self.session.state() != SessionState::Active {
            return Ok(TriggerOutcome::NotOnDuty);
        }

        let event = capture_event(
            self.screenshots.as_ref(),
            &self.screenshot_dir,
            ShotKind::Proof,
        )
        .await?;
        let screenshot = event.path.clone();
        self.session.add_proof(event)?;
        Ok(TriggerOutcome::ProofCaptured { screenshot })
    }
}

#[cfg(test)]
mod tests {
    use super::{DutyTracker, Session, SessionState, TriggerOutcome};
    use crate::notify::Notifier;
    use crate::paths::DirLayout;
    use crate::report::ReportWriter;
    use crate::screenshot::{
        MockScreenshotProvider, ScreenshotEvent, ScreenshotProvider, ShotKind,
    };
    use crate::upload::MockImageHost;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};

    #[derive(Debug, Default, Clone, Copy)]
    struct SilentNotifier;

    impl Notifier for SilentNotifier {
        fn notify(&self, _summary: &str, _body: &str) {}
    }

    fn tracker_with(temp: &TempDir, provider: Arc<dyn ScreenshotProvider>) -> DutyTracker {
        let layout = DirLayout::new(temp.path());
        layout.ensure().expect("layout");
        let writer = ReportWriter::new(
            Arc::new(MockImageHost),
            layout.reports_dir(),
            "officer_nine".to_string(),
            "On patrol".to_string(),
        );
        DutyTracker::new(
            provider,
            Arc::new(SilentNotifier),
            writer,
            layout.screenshots_dir(),
            None,
        )
    }

    fn event(kind: ShotKind, path: &str, secs: i64) -> ScreenshotEvent {
        ScreenshotEvent {
            kind,
            path: path.into(),
            captured_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("timestamp"),
        }
    }

    #[test]
    fn session_transitions_are_explicit() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::Idle);

        session
            .add_proof(event(ShotKind::Proof, "p.png", 1))
            .expect_err("proof before start");
        session
            .finish(event(ShotKind::End, "e.png", 2))
            .expect_err("end before start");

        session
            .begin(event(ShotKind::Start, "s.png", 0))
            .expect("begin");
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.start_time().is_some());

        session
            .begin(event(ShotKind::Start, "s2.png", 3))
            .expect_err("double start");

        session
            .add_proof(event(ShotKind::Proof, "p.png", 4))
            .expect("proof");
        session
            .finish(event(ShotKind::End, "e.png", 5))
            .expect("finish");
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.events().len(), 3);
    }

    #[tokio::test]
    async fn proof_before_start_leaves_state_unchanged() {
        let temp = tempdir().expect("tempdir");
        let mut tracker = tracker_with(&temp, Arc::new(MockScreenshotProvider));

        let outcome = tracker.on_proof().await.expect("proof trigger");
        assert_eq!(outcome, TriggerOutcome::NotOnDuty);
        assert_eq!(tracker.session().state(), SessionState::Idle);
        assert!(tracker.session().events().is_empty());

        let shots = std::fs::read_dir(temp.path().join("screenshots"))
            .expect("screenshots dir")
            .count();
        assert_eq!(shots, 0);
    }

    #[tokio::test]
    async fn full_cycle_emits_report_and_resets_to_idle() {
        let temp = tempdir().expect("tempdir");
        let mut tracker = tracker_with(&temp, Arc::new(MockScreenshotProvider));

        let started = tracker.on_start_end().await.expect("start trigger");
        assert!(matches!(started, TriggerOutcome::Started { .. }));
        assert_eq!(tracker.session().state(), SessionState::Active);

        let proof = tracker.on_proof().await.expect("proof trigger");
        assert!(matches!(proof, TriggerOutcome::ProofCaptured { .. }));

        let ended = tracker.on_start_end().await.expect("end trigger");
        let TriggerOutcome::Ended { report } = ended else {
            panic!("expected Ended, got {ended:?}");
        };

        let contents = std::fs::read_to_string(&report).expect("report file");
        assert!(contents.contains("Username: officer_nine"));
        assert!(contents.contains("Duty: On patrol"));
        assert!(contents.contains("Tablist Started: https://i.imgur.com/start_"));
        assert!(contents.contains("Tablist Ended: https://i.imgur.com/end_"));

        // Explicit reset: a new duty cycle can start in the same process run.
        assert_eq!(tracker.session().state(), SessionState::Idle);
        let restarted = tracker.on_start_end().await.expect("second start");
        assert!(matches!(restarted, TriggerOutcome::Started { .. }));
    }

    #[derive(Debug, Default, Clone, Copy)]
    struct FailingScreenshotProvider;

    #[async_trait]
    impl ScreenshotProvider for FailingScreenshotProvider {
        async fn capture(&self, _output_path: &Path) -> Result<()> {
            Err(anyhow!("intentional screenshot failure"))
        }
    }

    #[tokio::test]
    async fn capture_failure_leaves_session_idle() {
        let temp = tempdir().expect("tempdir");
        let mut tracker = tracker_with(&temp, Arc::new(FailingScreenshotProvider));

        tracker.on_start_end().await.expect_err("capture fails");
        assert_eq!(tracker.session().state(), SessionState::Idle);
        assert!(tracker.session().events().is_empty());
    }

    #[tokio::test]
    async fn end_capture_failure_keeps_session_active_for_retry() {
        let temp = tempdir().expect("tempdir");
        let flaky = Arc::new(FailAfterFirst::default());
        let mut tracker = tracker_with(&temp, flaky);

        tracker.on_start_end().await.expect("start trigger");
        tracker
            .on_start_end()
            .await
            .expect_err("end capture fails");
        assert_eq!(tracker.session().state(), SessionState::Active);
        assert_eq!(tracker.session().events().len(), 1);
    }

    #[tokio::test]
    async fn report_write_failure_discards_session_and_allows_restart() {
        let temp = tempdir().expect("tempdir");
        let layout = DirLayout::new(temp.path());
        layout.ensure().expect("layout");

        // Occupy the reports path with a plain file so the report write fails.
        std::fs::remove_dir(layout.reports_dir()).expect("remove reports dir");
        std::fs::write(layout.reports_dir(), b"not a directory").expect("block reports path");

        let writer = ReportWriter::new(
            Arc::new(MockImageHost),
            layout.reports_dir(),
            "officer_nine".to_string(),
            "On patrol".to_string(),
        );
        let mut tracker = DutyTracker::new(
            Arc::new(MockScreenshotProvider),
            Arc::new(SilentNotifier),
            writer,
            layout.screenshots_dir(),
            None,
        );

        tracker.on_start_end().await.expect("start trigger");
        let err = tracker
            .on_start_end()
            .await
            .expect_err("report write fails");
        assert!(
            format!("{err:#}").contains("session discarded"),
            "unexpected error: {err:#}"
        );

        // The failed cycle must not wedge the tracker: a new session starts.
        assert_eq!(tracker.session().state(), SessionState::Idle);
        let restarted = tracker.on_start_end().await.expect("new session starts");
        assert!(matches!(restarted, TriggerOutcome::Started { .. }));
    }

    #[derive(Debug, Default)]
    struct FailAfterFirst {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ScreenshotProvider for FailAfterFirst {
        async fn capture(&self, output_path: &Path) -> Result<()> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                MockScreenshotProvider.capture(output_path).await
            } else {
                Err(anyhow!("intentional screenshot failure"))
            }
        }
    }
}

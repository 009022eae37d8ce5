use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use duty_tracker::config::{Config, load_or_init};
use duty_tracker::notify::DesktopNotifier;
use duty_tracker::paths::DirLayout;
use duty_tracker::report::ReportWriter;
use duty_tracker::screenshot::MacOsScreenshotProvider;
use duty_tracker::session::{DutyTracker, Trigger, TriggerOutcome};
use duty_tracker::upload::ImgurUploader;
use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tao::event::Event;
use tao::event_loop::{ControlFlow, EventLoopBuilder};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "duty-tracker")]
#[command(about = "Record duty sessions with hotkey screenshots and an uploaded text report")]
struct Cli {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Base directory for the screenshots and GeneratedReports folders.
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Delay before the on-duty reminder notification fires.
    #[arg(long, default_value = "30m", value_parser = parse_duration)]
    reminder_after: Duration,

    #[arg(long, action = ArgAction::SetTrue)]
    no_reminder: bool,
}

fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[derive(Debug, Clone)]
enum UserEvent {
    Hotkey(GlobalHotKeyEvent),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_or_init(&cli.config)?;
    config
        .validate()
        .with_context(|| format!("configuration {} is invalid", cli.config.display()))?;

    let layout = DirLayout::new(&cli.data_dir);
    layout.ensure()?;

    let start_end_hotkey: HotKey = config
        .keybind_start_end
        .parse()
        .context("failed to parse keybind_start_end")?;
    let proof_hotkey: HotKey = config
        .keybind_proof
        .parse()
        .context("failed to parse keybind_proof")?;

    let event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();
    let proxy = event_loop.create_proxy();

    let hotkey_manager = GlobalHotKeyManager::new().context("global hotkey init failed")?;
    hotkey_manager
        .register(start_end_hotkey)
        .with_context(|| format!("failed to register hotkey {}", config.keybind_start_end))?;
    hotkey_manager
        .register(proof_hotkey)
        .with_context(|| format!("failed to register hotkey {}", config.keybind_proof))?;
    let start_end_id = start_end_hotkey.id();
    let proof_id = proof_hotkey.id();

    let proxy_for_hotkey = proxy.clone();
    GlobalHotKeyEvent::set_event_handler(Some(move |event| {
        let _ = proxy_for_hotkey.send_event(UserEvent::Hotkey(event));
    }));

    let reminder_after = (!cli.no_reminder).then_some(cli.reminder_after);
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    spawn_tracker_worker(config.clone(), layout, reminder_after, trigger_rx);

    println!(
        "Program running. Press {} to start/end duty and {} for a proof screenshot.",
        config.keybind_start_end, config.keybind_proof
    );

    event_loop.run(move |event, _target, control_flow| {
        *control_flow = ControlFlow::Wait;

        if let Event::UserEvent(UserEvent::Hotkey(hotkey_event)) = event {
            if hotkey_event.state != HotKeyState::Pressed {
                return;
            }

            let trigger = if hotkey_event.id == start_end_id {
                Some(Trigger::StartEnd)
            } else if hotkey_event.id == proof_id {
                Some(Trigger::Proof)
            } else {
                None
            };

            if let Some(trigger) = trigger
                && trigger_tx.send(trigger).is_err()
            {
                eprintln!("session worker stopped; exiting");
                *control_flow = ControlFlow::Exit;
            }
        }
    });
}

/// Run the tracker on its own thread behind a single-consumer channel, so
/// session mutation is serialized no matter how the hotkey dispatcher delivers
/// callbacks.
fn spawn_tracker_worker(
    config: Config,
    layout: DirLayout,
    reminder_after: Option<Duration>,
    mut trigger_rx: mpsc::UnboundedReceiver<Trigger>,
) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(err) => {
                eprintln!("failed to start session worker runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let uploader = match ImgurUploader::new(config.imgur_client_id.clone()) {
                Ok(uploader) => Arc::new(uploader),
                Err(err) => {
                    eprintln!("failed to initialize imgur uploader: {err:#}");
                    return;
                }
            };

            let report_writer = ReportWriter::new(
                uploader,
                layout.reports_dir(),
                config.username.clone(),
                config.duty_reason.clone(),
            );
            let mut tracker = DutyTracker::new(
                Arc::new(MacOsScreenshotProvider),
                Arc::new(DesktopNotifier),
                report_writer,
                layout.screenshots_dir(),
                reminder_after,
            );

            while let Some(trigger) = trigger_rx.recv().await {
                match tracker.handle(trigger).await {
                    Ok(TriggerOutcome::Started { screenshot }) => {
                        println!("Duty START recorded ({})", screenshot.display());
                    }
                    Ok(TriggerOutcome::Ended { report }) => {
                        println!("Duty END recorded");
                        println!("Report generated: {}", report.display());
                    }
                    Ok(TriggerOutcome::ProofCaptured { screenshot }) => {
                        println!("Proof screenshot taken ({})", screenshot.display());
                    }
                    Ok(TriggerOutcome::NotOnDuty) => {
                        eprintln!("Error: Start duty before taking proof!");
                    }
                    Err(err) => {
                        eprintln!("duty trigger failed: {err:#}");
                    }
                }
            }
        });
    });
}

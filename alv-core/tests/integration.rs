//! Integration tests: full controller lifecycle against the simulated
//! correlator, including timeouts, stale windows and interruption.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use alv_core::{
    AlvError, Controller, ControllerConfig, CorrelationMode, DEFAULT_WINDOW_TITLE, Mailbox,
    MeasurementPhase, MeasurementSeries, Message, MessageChannel, Payload, Scaling, Signal,
    SimulatedCorrelator, WindowHandle, series,
};

// ── Helpers ──────────────────────────────────────────────────────

fn quick_config() -> ControllerConfig {
    ControllerConfig {
        communication_timeout: Duration::from_millis(200),
        scan_interval: Duration::from_millis(10),
        ..ControllerConfig::default()
    }
}

fn linked(sim: &SimulatedCorrelator) -> Controller {
    let mut alv = Controller::new(sim.clone(), quick_config());
    alv.init().unwrap();
    alv
}

fn messages(sim: &SimulatedCorrelator) -> Vec<Message> {
    sim.posted().into_iter().map(|(m, _)| m).collect()
}

/// Acknowledges every command at once but reports a start only after a
/// delay, then finishes the measurement on its own.
#[derive(Clone, Default)]
struct LaggingCorrelator {
    mailbox: Arc<Mutex<Option<Sender<Signal>>>>,
}

const START_LAG: Duration = Duration::from_millis(20);
const RUN_TIME: Duration = Duration::from_millis(300);

fn lagging_handle() -> WindowHandle {
    WindowHandle::from_raw(0x77)
}

impl MessageChannel for LaggingCorrelator {
    fn find_window(&self, title: &str) -> WindowHandle {
        if title == DEFAULT_WINDOW_TITLE {
            lagging_handle()
        } else {
            WindowHandle::NULL
        }
    }

    fn window_title(&self, handle: WindowHandle) -> Option<String> {
        (handle == lagging_handle()).then(|| DEFAULT_WINDOW_TITLE.to_string())
    }

    fn post(
        &self,
        _handle: WindowHandle,
        message: Message,
        _payload: Option<&Payload>,
    ) -> Result<(), AlvError> {
        let Some(tx) = self.mailbox.lock().unwrap().clone() else {
            return Ok(());
        };
        let _ = tx.send(Signal::Acknowledge);
        if message == Message::SetStart {
            thread::spawn(move || {
                thread::sleep(START_LAG);
                let _ = tx.send(Signal::Started);
                thread::sleep(RUN_TIME);
                let _ = tx.send(Signal::Stopped);
            });
        }
        Ok(())
    }

    fn open_mailbox(&self, signals: Sender<Signal>) -> Result<Box<dyn Mailbox>, AlvError> {
        *self.mailbox.lock().unwrap() = Some(signals);
        Ok(Box::new(LaggingMailbox(Arc::clone(&self.mailbox))))
    }
}

struct LaggingMailbox(Arc<Mutex<Option<Sender<Signal>>>>);

impl Mailbox for LaggingMailbox {
    fn close(self: Box<Self>) {
        *self.0.lock().unwrap() = None;
    }
}

// ── Measurement lifecycle ────────────────────────────────────────

#[test]
fn test_full_measurement_scenario() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    assert!(alv.activated());
    assert!(alv.ok_to_send());

    alv.set_duration(300).unwrap();
    alv.set_scaling(Scaling::Normal).unwrap();
    alv.start(false).unwrap();
    assert_eq!(alv.phase(), MeasurementPhase::Measuring);

    let finisher = {
        let sim = sim.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            sim.finish_measurement();
        })
    };
    alv.wait(None).unwrap();
    finisher.join().unwrap();
    assert!(!alv.measuring());

    assert_eq!(
        sim.posted(),
        vec![
            (Message::SetDuration, Some("300".into())),
            (Message::SetScaling, Some("1".into())),
            (Message::SetStart, None),
        ]
    );
    assert_eq!(sim.duration(), 300);

    alv.close();
    assert!(!alv.initialized());
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);

    alv.start(false).unwrap();
    alv.start(false).unwrap();
    assert!(alv.measuring());

    alv.stop().unwrap();
    alv.stop().unwrap();
    assert!(!alv.measuring());

    assert_eq!(messages(&sim), vec![Message::SetStart, Message::SetStop]);
    alv.close();
}

#[test]
fn test_start_with_wait_blocks_until_stopped() {
    // 30 simulated seconds of 10 ms each
    let sim = SimulatedCorrelator::new().with_auto_finish(Duration::from_millis(10));
    let mut alv = linked(&sim);
    alv.set_duration(30).unwrap();

    let started = Instant::now();
    alv.start(true).unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5));
    assert!(!alv.measuring());

    alv.save(std::env::temp_dir().join("sim_wait.ASC")).unwrap();
    alv.close();
}

#[test]
fn test_start_wait_outlasts_acknowledgment() {
    let mut alv = Controller::new(LaggingCorrelator::default(), quick_config());
    alv.init().unwrap();

    alv.start(false).unwrap();
    // acknowledged but not yet reported started
    assert_eq!(alv.phase(), MeasurementPhase::Measuring);
    alv.wait(None).unwrap();
    assert!(!alv.measuring());

    let started = Instant::now();
    alv.start(true).unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= RUN_TIME, "returned after {elapsed:?}");
    assert!(!alv.measuring());
    alv.save(std::env::temp_dir().join("lagging.ASC")).unwrap();
    alv.close();
}

#[test]
fn test_settings_refused_while_measuring() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    alv.start(false).unwrap();

    assert!(matches!(alv.set_duration(5), Err(AlvError::MeasurementInProgress)));
    assert!(matches!(
        alv.set_mode(CorrelationMode::Dual),
        Err(AlvError::MeasurementInProgress)
    ));
    assert_eq!(messages(&sim), vec![Message::SetStart]);
    alv.close();
}

// ── Timeouts ─────────────────────────────────────────────────────

#[test]
fn test_ack_timeout_releases_channel() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);

    sim.mute_replies(true);
    let timeout = alv.config().communication_timeout;
    let started = Instant::now();
    let err = alv.set_duration(10).unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, AlvError::AcknowledgeTimeout(t) if t == timeout));
    assert!(elapsed >= timeout, "gave up after {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_millis(250), "gave up after {elapsed:?}");
    assert!(err.is_timeout());
    assert!(alv.ok_to_send());
    // the duration was never confirmed
    assert_eq!(alv.duration(), 300);

    sim.mute_replies(false);
    alv.set_duration(10).unwrap();
    assert_eq!(alv.duration(), 10);
    alv.close();
}

#[test]
fn test_wait_timeout_leaves_idle() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    alv.start(false).unwrap();

    let err = alv.wait(Some(0)).unwrap_err();
    assert!(matches!(err, AlvError::MeasurementTimeout(_)));
    assert!(!alv.measuring());
    alv.close();
}

#[test]
fn test_start_timeout_leaves_idle() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    sim.mute_replies(true);
    assert!(matches!(alv.start(false), Err(AlvError::AcknowledgeTimeout(_))));
    assert!(!alv.measuring());
    assert!(alv.ok_to_send());
    alv.close();
}

// ── Window tracking ──────────────────────────────────────────────

#[test]
fn test_missing_window_is_reported() {
    let sim = SimulatedCorrelator::new().with_window_closed();
    let mut alv = linked(&sim);
    assert!(alv.initialized());
    assert!(!alv.activated());
    assert!(!alv.ok_to_send());
    assert!(matches!(alv.start(false), Err(AlvError::WindowNotFound)));

    // the scan loop picks the window up once it appears
    sim.open_window();
    thread::sleep(Duration::from_millis(100));
    assert!(alv.activated());
    alv.set_duration(3).unwrap();
    alv.close();
}

#[test]
fn test_window_closing_mid_session() {
    let sim = SimulatedCorrelator::new();
    let mut alv = Controller::new(
        sim.clone(),
        ControllerConfig {
            scan_interval: Duration::from_secs(3600),
            ..quick_config()
        },
    );
    alv.init().unwrap();
    sim.close_window();
    assert!(matches!(alv.set_scaling(Scaling::Off), Err(AlvError::WindowNotFound)));
    assert!(!alv.activated());
    assert!(sim.posted().is_empty());
    alv.close();
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn test_unknown_scaling_sends_nothing() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    assert!(matches!(
        alv.set_scaling_by_name("Unknown"),
        Err(AlvError::UnknownScaling(_))
    ));
    assert!(sim.posted().is_empty());

    alv.set_scaling_by_name("conservative").unwrap();
    assert_eq!(alv.scaling(), Scaling::Conservative);
    alv.close();
}

#[test]
fn test_post_message_raw() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    alv.post_message(Message::SetAuto, None).unwrap();
    assert!(matches!(
        alv.post_message(Message::StoreFile, Some("d\u{fc}nn.ASC")),
        Err(AlvError::InvalidPayload(_))
    ));
    assert_eq!(messages(&sim), vec![Message::SetAuto]);
    alv.close();
}

// ── Shutdown ─────────────────────────────────────────────────────

#[test]
fn test_close_is_idempotent() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    assert!(sim.mailbox_open());

    alv.close();
    alv.close();
    assert!(!alv.initialized());
    assert!(!alv.activated());
    assert!(!sim.mailbox_open());
    assert!(matches!(alv.stop(), Err(AlvError::NotInitialized)));
}

#[test]
fn test_close_stops_measurement() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    alv.start(false).unwrap();
    alv.close();
    assert_eq!(messages(&sim), vec![Message::SetStart, Message::SetStop]);
    assert!(!alv.measuring());
}

#[test]
fn test_close_survives_failed_stop() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    alv.start(false).unwrap();
    sim.mute_replies(true);

    alv.close();
    assert!(!alv.initialized());
    assert!(!alv.measuring());
    assert!(!sim.mailbox_open());
}

#[test]
fn test_reinit_resets_state() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    alv.set_duration(42).unwrap();
    alv.set_mode(CorrelationMode::Single).unwrap();
    alv.start(false).unwrap();

    alv.init().unwrap();
    let status = alv.status();
    assert!(status.initialized);
    assert!(status.activated);
    assert!(status.ok_to_send);
    assert_eq!(status.phase, MeasurementPhase::Idle);
    assert_eq!(status.duration, 300);
    assert_eq!(status.mode, None);
    alv.close();
}

// ── Cross-thread handles ─────────────────────────────────────────

#[test]
fn test_interrupt_wakes_wait() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    alv.start(false).unwrap();

    let interrupt = alv.interrupt_handle();
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        interrupt.interrupt();
    });
    assert!(matches!(alv.wait(None), Err(AlvError::Interrupted)));
    t.join().unwrap();

    assert!(!alv.measuring());
    assert_eq!(messages(&sim), vec![Message::SetStart, Message::SetStop]);
    alv.close();
}

#[test]
fn test_status_handle_sees_live_flags() {
    let sim = SimulatedCorrelator::new();
    let mut alv = linked(&sim);
    let status = alv.status_handle();

    let observer = thread::spawn(move || status.measuring());
    assert!(!observer.join().unwrap());

    alv.start(false).unwrap();
    let status = alv.status_handle();
    let observer = thread::spawn(move || status.phase());
    assert_eq!(observer.join().unwrap(), MeasurementPhase::Measuring);
    alv.close();
}

// ── Measurement series ───────────────────────────────────────────

#[test]
fn test_series_runs_and_stores_each_file() {
    let sim = SimulatedCorrelator::new().with_auto_finish(Duration::from_millis(1));
    let mut alv = linked(&sim);
    let plan = MeasurementSeries {
        duration: 5,
        scaling: Scaling::Secure,
        ..MeasurementSeries::default()
    }
    .plan(2);

    let folder = std::env::temp_dir();
    let mut stored = Vec::new();
    for run in &plan {
        stored.push(series::execute(&mut alv, run, &folder).unwrap());
    }
    assert!(stored[0].ends_with("data_0.ASC"));
    assert!(stored[1].ends_with("data_1.ASC"));

    let scalings: Vec<_> = sim
        .posted()
        .into_iter()
        .filter(|(m, _)| *m == Message::SetScaling)
        .filter_map(|(_, payload)| payload)
        .collect();
    assert_eq!(scalings, vec!["3".to_string(), "0".to_string()]);

    let stores = messages(&sim)
        .into_iter()
        .filter(|m| *m == Message::StoreFile)
        .count();
    assert_eq!(stores, 2);
    alv.close();
}

use super::*;
use crate::camera::{CaptureDeviceManager, MockCaptureDevice};
use crate::config::PunchclockConfig;
use crate::error::{BackendError, ErrorCategory, PunchclockError, SessionError};
use crate::events::{EventBus, KioskEvent};
use crate::identification::{Descriptor, DESCRIPTOR_LEN};
use crate::model::{
    EmployeeSummary, EnrolledTemplate, KioskIdentity, OpenTimeEntry, PunchAction,
};
use crate::services::{
    FaceEncoder, InMemoryBackend, NoFaceEncoder, Services, StaticEncoder, StaticIdentityStore,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::Instant;
use uuid::Uuid;

struct Harness {
    controller: SessionController,
    backend: Arc<InMemoryBackend>,
    device: MockCaptureDevice,
    events: broadcast::Receiver<KioskEvent>,
    kiosk_id: Uuid,
}

fn harness(biometric: bool, manual: bool, encoder: Arc<dyn FaceEncoder>) -> Harness {
    let kiosk_id = Uuid::new_v4();
    let identity = StaticIdentityStore::new(Some(kiosk_id.to_string()));
    harness_with_identity(biometric, manual, encoder, identity, kiosk_id)
}

fn harness_with_identity(
    biometric: bool,
    manual: bool,
    encoder: Arc<dyn FaceEncoder>,
    identity: StaticIdentityStore,
    kiosk_id: Uuid,
) -> Harness {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_kiosk(KioskIdentity {
        kiosk_id: Some(kiosk_id),
        display_name: "Service Desk".to_string(),
        tenant: "north".to_string(),
        biometric_enabled: biometric,
        manual_entry_enabled: manual,
        inactivity_timeout_seconds: 120,
    });
    backend.add_employee(
        EmployeeSummary {
            employee_id: "emp-1".to_string(),
            display_name: "Jordan Smith".to_string(),
            employee_number: Some("1001".to_string()),
            department: Some("Service".to_string()),
        },
        "1234",
    );
    backend.add_employee(
        EmployeeSummary {
            employee_id: "emp-2".to_string(),
            display_name: "Alex Rivera".to_string(),
            employee_number: Some("1002".to_string()),
            department: Some("Parts".to_string()),
        },
        "9999",
    );
    backend.add_template(
        "north",
        EnrolledTemplate {
            employee_id: "emp-1".to_string(),
            display_name: "Jordan Smith".to_string(),
            descriptor: vec![0.2; DESCRIPTOR_LEN],
        },
    );

    let device = MockCaptureDevice::new();
    let event_bus = EventBus::new(1024);
    let devices = Arc::new(
        CaptureDeviceManager::new(Arc::new(device.clone())).with_event_bus(event_bus.clone()),
    );
    let services = Services::in_memory(Arc::clone(&backend), Arc::new(identity), encoder);
    let events = event_bus.subscribe();

    Harness {
        controller: SessionController::new(
            PunchclockConfig::default(),
            services,
            devices,
            event_bus,
        ),
        backend,
        device,
        events,
        kiosk_id,
    }
}

fn manual_only() -> Harness {
    harness(false, true, Arc::new(NoFaceEncoder))
}

fn drain(events: &mut broadcast::Receiver<KioskEvent>) -> Vec<KioskEvent> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    seen
}

fn state_kind(h: &Harness) -> SessionStateKind {
    h.controller.state().kind()
}

/// Open, search for "Smith" and pick emp-1
async fn select_jordan(h: &mut Harness) {
    h.controller.handle(KioskInput::Open).await.unwrap();
    h.controller
        .handle(KioskInput::SearchChanged("Smith".to_string()))
        .await
        .unwrap();
    assert!(h.controller.process_next_signal().await);
    h.controller
        .handle(KioskInput::SelectCandidate("emp-1".to_string()))
        .await
        .unwrap();
    assert_eq!(state_kind(h), SessionStateKind::Authenticating);
}

async fn authorize_jordan(h: &mut Harness) {
    select_jordan(h).await;
    h.controller
        .handle(KioskInput::SubmitPin("1234".to_string()))
        .await
        .unwrap();
    assert_eq!(state_kind(h), SessionStateKind::Authorized);
}

#[tokio::test(start_paused = true)]
async fn test_manual_identification_with_pin() {
    let mut h = manual_only();

    h.controller.handle(KioskInput::Open).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Identifying);
    assert!(h.controller.is_presence_running());

    h.controller
        .handle(KioskInput::SearchChanged("Smith".to_string()))
        .await
        .unwrap();
    assert!(h.controller.process_next_signal().await);

    let results: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            KioskEvent::SearchResults { results, .. } => Some(results),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 1);
    assert_eq!(results[0][0].employee_id, "emp-1");

    h.controller
        .handle(KioskInput::SelectCandidate("emp-1".to_string()))
        .await
        .unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Authenticating);

    h.controller
        .handle(KioskInput::SubmitPin("1234".to_string()))
        .await
        .unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Authorized);

    let view = h.controller.view();
    assert_eq!(view.employee_name.as_deref(), Some("Jordan Smith"));
    assert_eq!(
        view.actions,
        available_actions(None, Utc::now(), chrono::Duration::minutes(30))
    );
    assert!(is_enabled(&view.actions, PunchAction::ClockIn));
    assert_eq!(view.actions.len(), 1);

    // Face recognition is off for this kiosk; the camera was never touched
    assert_eq!(h.device.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_candidate_must_come_from_results() {
    let mut h = manual_only();
    h.controller.handle(KioskInput::Open).await.unwrap();

    let err = h
        .controller
        .handle(KioskInput::SelectCandidate("emp-2".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PunchclockError::Session(SessionError::InvalidInput { .. })
    ));
    assert_eq!(state_kind(&h), SessionStateKind::Identifying);
}

#[tokio::test(start_paused = true)]
async fn test_short_break_blocks_break_end() {
    let mut h = manual_only();
    let now = Utc::now();
    h.backend.set_open_entry(
        "emp-1",
        Some(OpenTimeEntry {
            id: "entry-1".to_string(),
            clock_in: now - chrono::Duration::hours(3),
            break_start: Some(now - chrono::Duration::minutes(10)),
        }),
    );

    authorize_jordan(&mut h).await;

    let view = h.controller.view();
    assert!(view.on_break);
    let break_end = view
        .actions
        .iter()
        .find(|o| o.action == PunchAction::BreakEnd)
        .unwrap();
    assert!(!break_end.enabled);
    assert_eq!(break_end.remaining_minutes, Some(20));
    assert!(is_enabled(&view.actions, PunchAction::ClockOut));

    let err = h
        .controller
        .handle(KioskInput::SelectAction(PunchAction::BreakEnd))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PunchclockError::Session(SessionError::ActionUnavailable { .. })
    ));
    assert_eq!(state_kind(&h), SessionStateKind::Authorized);
    assert_eq!(h.device.opened(), 0);
}

fn on_break_for(h: &Harness, minutes: i64) {
    let now = Utc::now();
    h.backend.set_open_entry(
        "emp-1",
        Some(OpenTimeEntry {
            id: "entry-1".to_string(),
            clock_in: now - chrono::Duration::hours(3),
            break_start: Some(now - chrono::Duration::minutes(minutes)),
        }),
    );
}

fn break_end_option(h: &Harness) -> ActionOption {
    h.controller
        .view()
        .actions
        .into_iter()
        .find(|o| o.action == PunchAction::BreakEnd)
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_break_timer_enables_break_end() {
    let mut h = manual_only();
    on_break_for(&h, 29);
    authorize_jordan(&mut h).await;

    let option = break_end_option(&h);
    assert!(!option.enabled);
    assert_eq!(option.remaining_minutes, Some(1));

    tokio::task::yield_now().await;
    let countdowns: Vec<i64> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            KioskEvent::BreakCountdown { remaining_minutes } => Some(remaining_minutes),
            _ => None,
        })
        .collect();
    assert!(!countdowns.is_empty());
    assert!(countdowns.iter().all(|&minutes| minutes == 1));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(h.controller.process_next_signal().await);

    let option = break_end_option(&h);
    assert!(option.enabled);
    assert_eq!(option.remaining_minutes, None);
    assert!(drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, KioskEvent::StateChanged { .. })));

    h.controller
        .handle(KioskInput::SelectAction(PunchAction::BreakEnd))
        .await
        .unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Capturing);
    assert_eq!(h.device.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_break_deadline_is_fixed_when_armed() {
    let mut h = manual_only();
    on_break_for(&h, 29);
    authorize_jordan(&mut h).await;

    // The clock moves before the timer task first runs
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(h.controller.process_next_signal().await);
    assert!(break_end_option(&h).enabled);
}

#[tokio::test(start_paused = true)]
async fn test_break_eligibility_from_earlier_state_is_ignored() {
    let mut h = manual_only();
    on_break_for(&h, 29);
    authorize_jordan(&mut h).await;

    // Let the timer fire and queue its completion before the state moves on
    tokio::task::yield_now().await;
    tokio::time::advance(Duration::from_secs(61)).await;
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockOut))
        .await
        .unwrap();
    h.controller.handle(KioskInput::Cancel).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Authorized);

    h.controller.process_pending_signals().await;

    let option = break_end_option(&h);
    assert!(!option.enabled);
    assert_eq!(option.remaining_minutes, Some(1));
    let err = h
        .controller
        .handle(KioskInput::SelectAction(PunchAction::BreakEnd))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PunchclockError::Session(SessionError::ActionUnavailable { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_leaving_authorized_stops_break_timer() {
    let mut h = manual_only();
    on_break_for(&h, 29);
    authorize_jordan(&mut h).await;

    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockOut))
        .await
        .unwrap();
    drain(&mut h.events);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(h.controller.process_pending_signals().await, 0);
    assert_eq!(state_kind(&h), SessionStateKind::Capturing);
    assert!(!drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, KioskEvent::BreakCountdown { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_lockout_after_three_wrong_pins() {
    let mut h = manual_only();
    select_jordan(&mut h).await;

    for _ in 0..3 {
        h.controller
            .handle(KioskInput::SubmitPin("0000".to_string()))
            .await
            .unwrap();
    }
    assert_eq!(state_kind(&h), SessionStateKind::Authenticating);
    assert!(h.controller.lockout().is_locked(Instant::now()));
    assert_eq!(h.controller.view().lockout_remaining_seconds, Some(30));

    // Correct PIN is refused while locked
    let err = h
        .controller
        .handle(KioskInput::SubmitPin("1234".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PunchclockError::Session(SessionError::Locked { .. })
    ));
    assert_eq!(err.category(), ErrorCategory::Policy);
    assert_eq!(state_kind(&h), SessionStateKind::Authenticating);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(h.controller.process_next_signal().await);

    assert!(!h.controller.lockout().is_locked(Instant::now()));
    assert_eq!(h.controller.lockout().attempts(), 0);
    assert_eq!(h.controller.view().lockout_remaining_seconds, None);

    h.controller
        .handle(KioskInput::SubmitPin("1234".to_string()))
        .await
        .unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Authorized);
}

#[tokio::test(start_paused = true)]
async fn test_lockout_survives_back() {
    let mut h = manual_only();
    select_jordan(&mut h).await;

    for _ in 0..3 {
        h.controller
            .handle(KioskInput::SubmitPin("0000".to_string()))
            .await
            .unwrap();
    }
    h.controller.handle(KioskInput::Back).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Identifying);
    assert!(h.controller.lockout().is_locked(Instant::now()));

    h.controller
        .handle(KioskInput::SearchChanged("Smith".to_string()))
        .await
        .unwrap();
    assert!(h.controller.process_next_signal().await);
    h.controller
        .handle(KioskInput::SelectCandidate("emp-1".to_string()))
        .await
        .unwrap();

    assert!(h
        .controller
        .handle(KioskInput::SubmitPin("1234".to_string()))
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_full_punch_cycle() {
    let mut h = manual_only();
    authorize_jordan(&mut h).await;

    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockIn))
        .await
        .unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Capturing);
    assert_eq!(h.device.live_streams(), 1);

    h.controller.handle(KioskInput::TakePhoto).await.unwrap();
    assert!(h.controller.view().photo_pending);

    h.controller.handle(KioskInput::Retake).await.unwrap();
    assert!(!h.controller.view().photo_pending);
    h.controller.handle(KioskInput::TakePhoto).await.unwrap();

    drain(&mut h.events);
    h.controller.handle(KioskInput::ConfirmPunch).await.unwrap();

    assert_eq!(state_kind(&h), SessionStateKind::Authorized);
    assert_eq!(h.device.live_streams(), 0);

    let calls = h.backend.ledger_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].accepted);
    assert_eq!(calls[0].request.action, PunchAction::ClockIn);
    assert_eq!(calls[0].request.kiosk_id, h.kiosk_id);
    assert_eq!(h.backend.punch_counter(h.kiosk_id), 1);
    assert!(h.backend.open_entry("emp-1").is_some());

    // Fresh snapshot drives the menu
    let view = h.controller.view();
    assert!(is_enabled(&view.actions, PunchAction::BreakStart));
    assert!(is_enabled(&view.actions, PunchAction::ClockOut));
    assert_eq!(view.week_stats.map(|s| s.shifts), Some(1));

    let committed = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, KioskEvent::PunchCommitted { .. }))
        .count();
    assert_eq!(committed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_keeps_capture_open() {
    let mut h = manual_only();
    authorize_jordan(&mut h).await;

    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockIn))
        .await
        .unwrap();
    h.controller.handle(KioskInput::TakePhoto).await.unwrap();

    h.backend
        .fail_uploads(Some(BackendError::transport("connection reset")));
    assert!(h.controller.handle(KioskInput::ConfirmPunch).await.is_err());

    assert_eq!(state_kind(&h), SessionStateKind::Capturing);
    assert!(!h.controller.view().photo_pending);
    assert!(h.backend.ledger_calls().is_empty());
    assert_eq!(h.device.live_streams(), 1);

    h.backend.fail_uploads(None);
    h.controller.handle(KioskInput::TakePhoto).await.unwrap();
    h.controller.handle(KioskInput::ConfirmPunch).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Authorized);
    assert_eq!(h.backend.ledger_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_requires_photo() {
    let mut h = manual_only();
    authorize_jordan(&mut h).await;
    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockIn))
        .await
        .unwrap();

    assert!(h.controller.handle(KioskInput::ConfirmPunch).await.is_err());
    assert_eq!(h.backend.upload_calls(), 0);
    assert_eq!(state_kind(&h), SessionStateKind::Capturing);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_capture_releases_device() {
    let mut h = manual_only();
    authorize_jordan(&mut h).await;
    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockIn))
        .await
        .unwrap();
    h.controller.handle(KioskInput::TakePhoto).await.unwrap();

    h.controller.handle(KioskInput::Cancel).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Authorized);
    assert_eq!(h.device.live_streams(), 0);
    assert!(h.backend.ledger_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_after_punch_closes_session() {
    let mut h = manual_only();
    authorize_jordan(&mut h).await;
    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockIn))
        .await
        .unwrap();
    h.controller.handle(KioskInput::TakePhoto).await.unwrap();

    h.backend
        .fail_snapshots(Some(BackendError::transport("timeout")));
    h.controller.handle(KioskInput::ConfirmPunch).await.unwrap();

    assert_eq!(state_kind(&h), SessionStateKind::Idle);
    assert_eq!(h.backend.ledger_calls().len(), 1);
    assert_eq!(h.device.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_inactivity_closes_session_and_releases_device() {
    let mut h = manual_only();
    authorize_jordan(&mut h).await;
    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockIn))
        .await
        .unwrap();
    assert_eq!(h.device.live_streams(), 1);

    tokio::time::advance(Duration::from_secs(121)).await;
    assert!(h.controller.process_next_signal().await);

    assert_eq!(state_kind(&h), SessionStateKind::Idle);
    assert_eq!(h.device.live_streams(), 0);
    assert_eq!(h.controller.view(), SessionView::idle());
    assert_eq!(h.controller.lockout().attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_activity_defers_inactivity() {
    let mut h = manual_only();
    h.controller.handle(KioskInput::Open).await.unwrap();

    tokio::time::advance(Duration::from_secs(100)).await;
    h.controller.handle(KioskInput::Activity).await.unwrap();
    tokio::time::advance(Duration::from_secs(100)).await;
    h.controller.process_pending_signals().await;
    assert_eq!(state_kind(&h), SessionStateKind::Identifying);

    tokio::time::advance(Duration::from_secs(21)).await;
    assert!(h.controller.process_next_signal().await);
    assert_eq!(state_kind(&h), SessionStateKind::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_biometric_match_skips_pin() {
    let encoder = StaticEncoder::new(Some(
        Descriptor::from_slice(&[0.21; DESCRIPTOR_LEN]).unwrap(),
    ));
    let mut h = harness(true, false, Arc::new(encoder));

    h.controller.handle(KioskInput::Open).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Identifying);
    assert!(h.controller.view().biometric_active);

    assert!(h.controller.process_next_signal().await);
    assert_eq!(state_kind(&h), SessionStateKind::Authorized);
    assert_eq!(h.controller.state().employee_id(), Some("emp-1"));
    assert_eq!(h.device.live_streams(), 0);
    assert_eq!(h.device.peak_streams(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_biometric_timeout_leaves_manual_search() {
    let mut h = harness(true, true, Arc::new(NoFaceEncoder));
    h.controller.handle(KioskInput::Open).await.unwrap();

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(h.controller.process_next_signal().await);

    assert_eq!(state_kind(&h), SessionStateKind::Identifying);
    assert!(!h.controller.view().biometric_active);
    assert_eq!(h.device.live_streams(), 0);

    h.controller
        .handle(KioskInput::RestartBiometric)
        .await
        .unwrap();
    assert!(h.controller.view().biometric_active);

    h.controller
        .handle(KioskInput::SearchChanged("Smith".to_string()))
        .await
        .unwrap();
    assert!(h.controller.process_next_signal().await);
    h.controller
        .handle(KioskInput::SelectCandidate("emp-1".to_string()))
        .await
        .unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Authenticating);
    assert_eq!(h.device.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_biometric_outcome_is_ignored() {
    let mut h = harness(true, true, Arc::new(NoFaceEncoder));
    h.controller.handle(KioskInput::Open).await.unwrap();
    h.controller
        .handle(KioskInput::SearchChanged("Smith".to_string()))
        .await
        .unwrap();
    assert!(h.controller.process_next_signal().await);

    // Scan times out; its outcome stays queued while the operator picks a candidate
    tokio::time::sleep(Duration::from_secs(16)).await;
    h.controller
        .handle(KioskInput::SelectCandidate("emp-1".to_string()))
        .await
        .unwrap();
    drain(&mut h.events);

    assert_eq!(h.controller.process_pending_signals().await, 1);
    assert_eq!(state_kind(&h), SessionStateKind::Authenticating);
    assert!(drain(&mut h.events)
        .iter()
        .all(|e| !matches!(e, KioskEvent::Notice { .. } | KioskEvent::StateChanged { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_template_load_failure_leaves_manual_path() {
    let mut h = harness(true, true, Arc::new(NoFaceEncoder));
    h.backend.fail_templates(Some(BackendError::transport("offline")));

    h.controller.handle(KioskInput::Open).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Identifying);
    assert!(!h.controller.view().biometric_active);
    assert_eq!(h.device.opened(), 0);
    assert!(h
        .controller
        .handle(KioskInput::RestartBiometric)
        .await
        .is_err());
}

async fn assert_refused(mut h: Harness, expected: SessionError) {
    let err = h.controller.handle(KioskInput::Open).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Fatal);
    match err {
        PunchclockError::Session(e) => assert_eq!(e, expected),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(state_kind(&h), SessionStateKind::Idle);
    assert!(!h.controller.is_presence_running());
    assert!(drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, KioskEvent::SessionRefused { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_open_refused_without_identity() {
    let h = harness_with_identity(
        false,
        true,
        Arc::new(NoFaceEncoder),
        StaticIdentityStore::new(None),
        Uuid::new_v4(),
    );
    assert_refused(h, SessionError::MissingKioskIdentity).await;
}

#[tokio::test(start_paused = true)]
async fn test_open_refused_with_malformed_identity() {
    let h = harness_with_identity(
        false,
        true,
        Arc::new(NoFaceEncoder),
        StaticIdentityStore::new(Some("kiosk-7".to_string())),
        Uuid::new_v4(),
    );
    assert_refused(
        h,
        SessionError::MalformedKioskIdentity {
            value: "kiosk-7".to_string(),
        },
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_open_refused_for_unregistered_kiosk() {
    let stranger = Uuid::new_v4();
    let h = harness_with_identity(
        false,
        true,
        Arc::new(NoFaceEncoder),
        StaticIdentityStore::new(Some(stranger.to_string())),
        Uuid::new_v4(),
    );
    assert_refused(
        h,
        SessionError::KioskNotRegistered {
            kiosk_id: stranger.to_string(),
        },
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_open_refused_without_identification_method() {
    let h = harness(false, false, Arc::new(NoFaceEncoder));
    assert_refused(h, SessionError::NoIdentificationMethod).await;
}

#[tokio::test(start_paused = true)]
async fn test_close_from_any_state() {
    let mut h = manual_only();
    authorize_jordan(&mut h).await;
    h.controller
        .handle(KioskInput::SelectAction(PunchAction::ClockIn))
        .await
        .unwrap();

    h.controller.handle(KioskInput::Close).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Idle);
    assert_eq!(h.device.live_streams(), 0);

    // Presence keeps reporting between sessions
    assert!(h.controller.is_presence_running());

    h.controller.handle(KioskInput::Open).await.unwrap();
    assert_eq!(state_kind(&h), SessionStateKind::Identifying);
}

#[tokio::test(start_paused = true)]
async fn test_reload_applies_inactivity_timeout() {
    let mut h = manual_only();
    h.controller.handle(KioskInput::Open).await.unwrap();
    assert_eq!(h.controller.inactivity_timeout(), Duration::from_secs(120));

    h.backend
        .update_kiosk(h.kiosk_id, |k| k.inactivity_timeout_seconds = 45);
    h.controller
        .handle(KioskInput::ReloadKioskConfig)
        .await
        .unwrap();
    assert_eq!(h.controller.inactivity_timeout(), Duration::from_secs(45));

    h.backend
        .update_kiosk(h.kiosk_id, |k| k.inactivity_timeout_seconds = 0);
    h.controller
        .handle(KioskInput::ReloadKioskConfig)
        .await
        .unwrap();
    assert_eq!(h.controller.inactivity_timeout(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_inputs_rejected_in_wrong_state() {
    let mut h = manual_only();

    for input in [
        KioskInput::SubmitPin("1234".to_string()),
        KioskInput::TakePhoto,
        KioskInput::ConfirmPunch,
        KioskInput::Back,
        KioskInput::SelectAction(PunchAction::ClockIn),
    ] {
        let err = h.controller.handle(input).await.unwrap_err();
        assert!(matches!(
            err,
            PunchclockError::Session(SessionError::InvalidInput { .. })
        ));
    }
    assert_eq!(state_kind(&h), SessionStateKind::Idle);
}

#[test]
fn test_pin_input_is_masked() {
    let input = KioskInput::SubmitPin("1234".to_string());
    assert_eq!(input.to_string(), "submit_pin(****)");
    assert_eq!(input.name(), "submit_pin");
}

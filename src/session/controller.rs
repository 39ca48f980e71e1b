use super::actions::{available_actions, break_remaining, is_enabled, ActionOption};
use super::input::KioskInput;
use super::pin::verify_pin;
use super::state::{SessionState, SessionView};
use crate::camera::{CaptureDeviceManager, StreamLease};
use crate::commit::PunchCommitter;
use crate::config::PunchclockConfig;
use crate::error::{BackendError, ErrorCategory, PunchclockError, Result, SessionError};
use crate::events::{EventBus, KioskEvent, NoticeLevel};
use crate::identification::{
    load_matcher, BiometricScan, FaceMatcher, IdentificationRace, ManualSearch, ScanOutcome,
    ScanSettings, SearchResponse,
};
use crate::inactivity::InactivitySupervisor;
use crate::lockout::{FailureOutcome, LockoutPolicy, LockoutState};
use crate::model::{
    EmployeeSnapshot, EmployeeSummary, IdentityCandidate, KioskIdentity, PunchAction,
};
use crate::presence::PresenceReporter;
use crate::services::Services;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Completions reported back to the controller by its background tasks.
///
/// Each carries the epoch (or inactivity generation) it was armed under; anything
/// older than the current value is dropped.
enum Signal {
    Biometric {
        epoch: u64,
        outcome: ScanOutcome,
    },
    Search {
        epoch: u64,
        response: SearchResponse,
    },
    InactivityElapsed {
        generation: u64,
    },
    LockoutExpired {
        epoch: u64,
    },
    BreakEligible {
        epoch: u64,
        eligible_at: DateTime<Utc>,
    },
}

/// The kiosk session state machine.
///
/// Sole owner of `SessionState` and `LockoutState`. Inputs arrive through `handle`,
/// background completions through an internal channel drained by `run` or
/// `process_next_signal`.
pub struct SessionController {
    config: PunchclockConfig,
    services: Services,
    devices: Arc<CaptureDeviceManager>,
    event_bus: EventBus,
    policy: LockoutPolicy,

    state: SessionState,
    lockout: LockoutState,
    epoch: u64,

    kiosk_id: Option<Uuid>,
    kiosk: Option<KioskIdentity>,
    committer: Option<PunchCommitter>,
    presence: Option<PresenceReporter>,

    inactivity: InactivitySupervisor,
    inactivity_generation: u64,

    matcher: Option<Arc<FaceMatcher>>,
    race: IdentificationRace,
    scan_task: Option<JoinHandle<()>>,
    search: ManualSearch,
    search_results: Vec<EmployeeSummary>,

    capture_lease: Option<StreamLease>,
    lockout_timer: Option<JoinHandle<()>>,
    break_timer: Option<JoinHandle<()>>,
    break_eligible_at: Option<DateTime<Utc>>,

    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
}

impl SessionController {
    pub fn new(
        config: PunchclockConfig,
        services: Services,
        devices: Arc<CaptureDeviceManager>,
        event_bus: EventBus,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let default_timeout =
            Duration::from_secs(u64::from(config.session.default_inactivity_timeout_seconds));

        Self {
            policy: LockoutPolicy::from_config(&config.lockout),
            inactivity: InactivitySupervisor::new(default_timeout, event_bus.clone()),
            search: ManualSearch::new(
                Arc::clone(&services.directory),
                config.identification.search_min_chars,
                config.identification.search_limit,
            ),
            config,
            services,
            devices,
            event_bus,
            state: SessionState::Idle,
            lockout: LockoutState::new(),
            epoch: 0,
            kiosk_id: None,
            kiosk: None,
            committer: None,
            presence: None,
            inactivity_generation: 0,
            matcher: None,
            race: IdentificationRace::new(),
            scan_task: None,
            search_results: Vec::new(),
            capture_lease: None,
            lockout_timer: None,
            break_timer: None,
            break_eligible_at: None,
            signal_tx,
            signal_rx,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn lockout(&self) -> &LockoutState {
        &self.lockout
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn kiosk(&self) -> Option<&KioskIdentity> {
        self.kiosk.as_ref()
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.inactivity.timeout()
    }

    pub fn is_presence_running(&self) -> bool {
        self.presence
            .as_ref()
            .map(|p| p.is_running())
            .unwrap_or(false)
    }

    pub fn is_biometric_active(&self) -> bool {
        self.scan_task
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Render-ready snapshot of the current state
    pub fn view(&self) -> SessionView {
        let mut view = SessionView::idle();
        view.state = self.state.kind();
        if self.state.is_idle() {
            return view;
        }

        view.manual_entry_enabled = self.manual_enabled();
        view.biometric_active =
            matches!(self.state, SessionState::Identifying) && self.is_biometric_active();

        if let Some(snapshot) = self.state.snapshot() {
            view.employee_id = Some(snapshot.employee_id.clone());
            view.employee_name = Some(snapshot.display_name.clone());
            view.department = snapshot.department.clone();
            view.on_break = snapshot
                .current_entry
                .as_ref()
                .map(|e| e.on_break())
                .unwrap_or(false);
            view.week_stats = Some(snapshot.week_stats.clone());
        }

        match &self.state {
            SessionState::Authenticating { .. } => {
                let now = Instant::now();
                if self.lockout.is_locked(now) {
                    view.lockout_remaining_seconds = Some(self.lockout.remaining_seconds(now));
                }
            }
            SessionState::Authorized { snapshot } => {
                view.actions = self.actions_for(snapshot);
            }
            SessionState::Capturing { action, photo, .. } => {
                view.pending_action = Some(*action);
                view.photo_pending = photo.is_some();
            }
            SessionState::Idle | SessionState::Identifying => {}
        }

        view
    }

    /// Apply one operator input. Every input counts as activity.
    pub async fn handle(&mut self, input: KioskInput) -> Result<()> {
        debug!("Input {} in state {}", input, self.state.kind());

        let result = match input {
            KioskInput::Open => self.open().await,
            KioskInput::Close => {
                self.close("closed by operator").await;
                Ok(())
            }
            KioskInput::Activity => Ok(()),
            KioskInput::SearchChanged(query) => self.search_changed(&query),
            KioskInput::SelectCandidate(employee_id) => self.select_candidate(&employee_id).await,
            KioskInput::SubmitPin(pin) => self.submit_pin(&pin).await,
            KioskInput::Back => self.back().await,
            KioskInput::RestartBiometric => self.restart_biometric(),
            KioskInput::SelectAction(action) => self.select_action(action).await,
            KioskInput::TakePhoto => self.take_photo().await,
            KioskInput::Retake => self.retake(),
            KioskInput::ConfirmPunch => self.confirm_punch().await,
            KioskInput::Cancel => self.cancel_capture().await,
            KioskInput::ReloadKioskConfig => self.reload_kiosk_config().await,
        };

        self.touch();
        result
    }

    /// Wait for and apply the next background completion
    pub async fn process_next_signal(&mut self) -> bool {
        match self.signal_rx.recv().await {
            Some(signal) => {
                self.process_signal(signal).await;
                true
            }
            None => false,
        }
    }

    /// Apply every completion already queued, without waiting
    pub async fn process_pending_signals(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(signal) = self.signal_rx.try_recv() {
            self.process_signal(signal).await;
            processed += 1;
        }
        processed
    }

    /// Drive the controller until `shutdown` fires or the input channel closes
    pub async fn run(mut self, mut inputs: mpsc::Receiver<KioskInput>, shutdown: CancellationToken) {
        info!("Session controller running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Session controller shutdown requested");
                    break;
                }
                input = inputs.recv() => match input {
                    Some(input) => {
                        if let Err(e) = self.handle(input).await {
                            report(&e);
                        }
                    }
                    None => {
                        info!("Input channel closed");
                        break;
                    }
                },
                Some(signal) = self.signal_rx.recv() => self.process_signal(signal).await,
            }
        }

        self.shutdown().await;
    }

    /// Close the session and stop the presence reporter
    pub async fn shutdown(&mut self) {
        self.close("shutdown").await;
        if let Some(presence) = self.presence.as_mut() {
            presence.stop().await;
        }
        info!("Session controller stopped");
    }

    /// Stop every timer and task, release the device, then reset to idle
    pub async fn close(&mut self, reason: &str) {
        let was_idle = self.state.is_idle();
        if !was_idle {
            info!("Closing session: {}", reason);
        }

        self.inactivity.stop();
        abort(&mut self.lockout_timer);
        abort(&mut self.break_timer);
        self.race.cancel();
        abort(&mut self.scan_task);
        self.search.cancel();
        self.search_results.clear();

        // Hardware goes before the state reset
        self.capture_lease = None;
        self.devices.release_any().await;

        self.lockout.reset();
        if !was_idle {
            self.enter(SessionState::Idle);
        }
    }

    async fn open(&mut self) -> Result<()> {
        if !self.state.is_idle() {
            return Err(self.invalid("open"));
        }

        let (kiosk_id, kiosk) = match self.resolve_kiosk().await {
            Ok(found) => found,
            Err(e) => return Err(self.refuse(e)),
        };
        if !kiosk.biometric_enabled && !kiosk.manual_entry_enabled {
            return Err(self.refuse(SessionError::NoIdentificationMethod));
        }

        info!(
            "Opening session on kiosk {} ({})",
            kiosk.display_name, kiosk_id
        );
        self.install_kiosk(kiosk_id, kiosk.clone());
        self.lockout.reset();

        self.matcher = None;
        if kiosk.biometric_enabled {
            let threshold = self.config.identification.match_threshold;
            match load_matcher(self.services.directory.as_ref(), &kiosk.tenant, threshold).await {
                Ok(matcher) => self.matcher = Some(Arc::new(matcher)),
                Err(e) => {
                    warn!("Face recognition disabled for this session: {}", e);
                    if !kiosk.manual_entry_enabled {
                        self.notice(
                            NoticeLevel::Error,
                            format!("Face recognition is unavailable on this kiosk ({}).", e),
                        );
                    }
                }
            }
        }

        self.start_identifying();
        Ok(())
    }

    async fn resolve_kiosk(&self) -> std::result::Result<(Uuid, KioskIdentity), SessionError> {
        let raw = match self.services.identity.load().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(SessionError::MissingKioskIdentity),
            Err(e) => {
                error!("Failed to read kiosk identity: {}", e);
                return Err(SessionError::MissingKioskIdentity);
            }
        };

        let kiosk_id = Uuid::parse_str(raw.trim())
            .map_err(|_| SessionError::MalformedKioskIdentity { value: raw.clone() })?;

        let mut kiosk = self
            .services
            .registry
            .get_kiosk_config(kiosk_id)
            .await
            .map_err(|e| match e {
                BackendError::NotFound { .. } => SessionError::KioskNotRegistered {
                    kiosk_id: kiosk_id.to_string(),
                },
                other => SessionError::RegistryUnavailable {
                    details: other.to_string(),
                },
            })?;
        kiosk.kiosk_id = Some(kiosk_id);

        Ok((kiosk_id, kiosk))
    }

    fn refuse(&self, error: SessionError) -> PunchclockError {
        self.event_bus.publish(KioskEvent::SessionRefused {
            reason: error.to_string(),
        });
        error.into()
    }

    fn install_kiosk(&mut self, kiosk_id: Uuid, kiosk: KioskIdentity) {
        self.inactivity.set_timeout(self.timeout_for(&kiosk));

        if self.committer.as_ref().map(|c| c.kiosk_id()) != Some(kiosk_id) {
            self.committer = Some(PunchCommitter::new(
                Arc::clone(&self.services.storage),
                Arc::clone(&self.services.ledger),
                Arc::clone(&self.services.registry),
                Arc::clone(&self.services.directory),
                kiosk_id,
            ));
        }

        let reporting_for = self
            .presence
            .as_ref()
            .filter(|p| p.is_running())
            .map(|p| p.kiosk_id());
        if reporting_for != Some(kiosk_id) {
            let mut reporter = PresenceReporter::new(
                Arc::clone(&self.services.registry),
                kiosk_id,
                self.config.presence.heartbeat_interval(),
            );
            reporter.start();
            self.presence = Some(reporter);
        }

        self.kiosk_id = Some(kiosk_id);
        self.kiosk = Some(kiosk);
    }

    fn timeout_for(&self, kiosk: &KioskIdentity) -> Duration {
        let seconds = match kiosk.inactivity_timeout_seconds {
            0 => self.config.session.default_inactivity_timeout_seconds,
            seconds => seconds,
        };
        Duration::from_secs(u64::from(seconds))
    }

    fn manual_enabled(&self) -> bool {
        self.kiosk
            .as_ref()
            .map(|k| k.manual_entry_enabled)
            .unwrap_or(false)
    }

    /// Enter `Identifying` with a fresh race
    fn start_identifying(&mut self) {
        self.race.cancel();
        self.race = IdentificationRace::new();
        abort(&mut self.scan_task);
        self.search.cancel();
        self.search_results.clear();

        self.transition(SessionState::Identifying);
        self.spawn_scan();
        self.publish_view();
    }

    fn spawn_scan(&mut self) -> bool {
        let Some(matcher) = self.matcher.clone() else {
            return false;
        };
        if self.race.is_cancelled() {
            return false;
        }
        abort(&mut self.scan_task);

        let scan = BiometricScan::new(
            ScanSettings::from_config(&self.config.identification),
            Arc::clone(&self.devices),
            Arc::clone(&self.services.encoder),
            matcher,
        );
        let race = self.race.clone();
        let tx = self.signal_tx.clone();
        let epoch = self.epoch;

        self.scan_task = Some(tokio::spawn(async move {
            let outcome = scan.run(race).await;
            let _ = tx.send(Signal::Biometric { epoch, outcome });
        }));
        true
    }

    /// Cancel both identification paths and free the camera they may hold
    async fn stop_identification(&mut self) {
        self.race.cancel();
        abort(&mut self.scan_task);
        self.search.cancel();
        self.search_results.clear();
        self.devices.release_any().await;
    }

    fn search_changed(&mut self, query: &str) -> Result<()> {
        if !matches!(self.state, SessionState::Identifying) || !self.manual_enabled() {
            return Err(self.invalid("search"));
        }

        let tx = self.signal_tx.clone();
        let epoch = self.epoch;
        self.search.submit(query, &self.race, move |response| {
            let _ = tx.send(Signal::Search { epoch, response });
        });
        Ok(())
    }

    async fn select_candidate(&mut self, employee_id: &str) -> Result<()> {
        if !matches!(self.state, SessionState::Identifying) || !self.manual_enabled() {
            return Err(self.invalid("select_candidate"));
        }
        let Some(summary) = self
            .search_results
            .iter()
            .find(|s| s.employee_id == employee_id)
            .cloned()
        else {
            return Err(self.invalid("select_candidate"));
        };

        if !self.race.try_resolve() {
            debug!("Selection of {} ignored, identification already resolved", employee_id);
            return Ok(());
        }
        self.stop_identification().await;

        let candidate = IdentityCandidate::manual(&summary);
        match self
            .services
            .directory
            .get_employee_snapshot(&candidate.employee_id)
            .await
        {
            Ok(snapshot) => {
                info!("Manual selection of {}, PIN required", candidate.employee_id);
                self.enter(SessionState::Authenticating {
                    candidate,
                    snapshot,
                });
                Ok(())
            }
            Err(e) => {
                self.notice(
                    NoticeLevel::Error,
                    "Could not load the employee record. Please try again.",
                );
                self.start_identifying();
                Err(e.into())
            }
        }
    }

    async fn submit_pin(&mut self, pin: &str) -> Result<()> {
        let SessionState::Authenticating { snapshot, .. } = &self.state else {
            return Err(self.invalid("submit_pin"));
        };
        let current = snapshot.clone();

        let now = Instant::now();
        if self.lockout.expire_if_elapsed(now) {
            abort(&mut self.lockout_timer);
        }
        if self.lockout.is_locked(now) {
            let remaining_seconds = self.lockout.remaining_seconds(now);
            self.event_bus
                .publish(KioskEvent::LockoutCountdown { remaining_seconds });
            return Err(SessionError::Locked { remaining_seconds }.into());
        }

        if verify_pin(pin, &current.pin_hash) {
            info!("PIN accepted for {}", current.employee_id);
            self.lockout.reset();
            abort(&mut self.lockout_timer);
            let snapshot = self.refresh_snapshot(current).await;
            self.enter(SessionState::Authorized { snapshot });
            return Ok(());
        }

        match self.lockout.register_failure(now, &self.policy) {
            FailureOutcome::Retry { remaining_attempts } => {
                info!(
                    "PIN mismatch for {}, {} attempts remaining",
                    current.employee_id, remaining_attempts
                );
                self.notice(
                    NoticeLevel::Warning,
                    format!("Incorrect PIN. {} attempt(s) remaining.", remaining_attempts),
                );
            }
            FailureOutcome::Locked { .. } => {
                warn!("PIN entry locked for {}", current.employee_id);
                self.notice(
                    NoticeLevel::Warning,
                    format!(
                        "Too many incorrect PINs. Try again in {} seconds.",
                        self.policy.lockout_duration().as_secs()
                    ),
                );
                self.arm_lockout_timer();
                self.publish_view();
            }
            FailureOutcome::Rejected { remaining } => {
                let remaining_seconds = remaining.as_secs();
                return Err(SessionError::Locked { remaining_seconds }.into());
            }
        }
        Ok(())
    }

    async fn back(&mut self) -> Result<()> {
        match self.state {
            SessionState::Authenticating { .. } => {
                self.start_identifying();
                Ok(())
            }
            SessionState::Capturing { .. } => self.cancel_capture().await,
            _ => Err(self.invalid("back")),
        }
    }

    fn restart_biometric(&mut self) -> Result<()> {
        let can_restart = matches!(self.state, SessionState::Identifying)
            && self.matcher.is_some()
            && !self.is_biometric_active()
            && !self.race.is_resolved();
        if !can_restart {
            return Err(self.invalid("restart_biometric"));
        }

        info!("Restarting biometric scan");
        self.spawn_scan();
        self.publish_view();
        Ok(())
    }

    async fn select_action(&mut self, action: PunchAction) -> Result<()> {
        let SessionState::Authorized { snapshot } = &self.state else {
            return Err(self.invalid("select_action"));
        };
        let snapshot = snapshot.clone();

        if !is_enabled(&self.actions_for(&snapshot), action) {
            let e = SessionError::ActionUnavailable {
                action: action.to_string(),
            };
            self.notice(NoticeLevel::Warning, e.to_string());
            return Err(e.into());
        }

        match self.devices.acquire().await {
            Ok(lease) => {
                self.capture_lease = Some(lease);
                self.enter(SessionState::Capturing {
                    snapshot,
                    action,
                    photo: None,
                });
                Ok(())
            }
            Err(e) => {
                self.notice(NoticeLevel::Error, e.user_message());
                Err(e.into())
            }
        }
    }

    async fn take_photo(&mut self) -> Result<()> {
        let waiting_for_photo = matches!(self.state, SessionState::Capturing { photo: None, .. });
        let Some(lease) = self.capture_lease.filter(|_| waiting_for_photo) else {
            return Err(self.invalid("take_photo"));
        };

        match self.devices.capture(&lease).await {
            Ok(captured) => {
                debug!("Captured {} byte punch photo", captured.len());
                if let SessionState::Capturing { photo, .. } = &mut self.state {
                    *photo = Some(captured);
                }
                self.publish_view();
                Ok(())
            }
            Err(e) => {
                self.notice(NoticeLevel::Error, e.user_message());
                Err(e.into())
            }
        }
    }

    fn retake(&mut self) -> Result<()> {
        match &mut self.state {
            SessionState::Capturing { photo, .. } if photo.is_some() => {
                *photo = None;
            }
            _ => return Err(self.invalid("retake")),
        }
        self.publish_view();
        Ok(())
    }

    async fn confirm_punch(&mut self) -> Result<()> {
        let (snapshot, action, photo) = match &mut self.state {
            SessionState::Capturing {
                snapshot,
                action,
                photo,
            } => (snapshot.clone(), *action, photo.take()),
            _ => return Err(self.invalid("confirm_punch")),
        };
        let Some(photo) = photo else {
            return Err(self.invalid("confirm_punch"));
        };

        let Some(committer) = self.committer.as_ref() else {
            return Err(PunchclockError::system("No kiosk identity for punch commit"));
        };

        let result = committer.commit(&snapshot.employee_id, action, photo).await;
        match result {
            Ok(receipt) => {
                self.event_bus.publish(KioskEvent::PunchCommitted {
                    employee_id: snapshot.employee_id.clone(),
                    action,
                    photo_ref: receipt.photo_ref.clone(),
                    timestamp: SystemTime::from(receipt.timestamp),
                });
                self.release_capture().await;

                match receipt.snapshot {
                    Ok(fresh) => self.enter(SessionState::Authorized { snapshot: fresh }),
                    Err(_) => {
                        self.notice(
                            NoticeLevel::Warning,
                            "Punch recorded, but the latest status could not be loaded.",
                        );
                        self.close("employee state unavailable after punch").await;
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.notice(NoticeLevel::Error, e.user_message());
                // Photo is already discarded; the stream stays held for the retake
                self.enter(SessionState::Capturing {
                    snapshot,
                    action,
                    photo: None,
                });
                Err(e.into())
            }
        }
    }

    async fn cancel_capture(&mut self) -> Result<()> {
        let SessionState::Capturing { snapshot, .. } = &self.state else {
            return Err(self.invalid("cancel"));
        };
        let snapshot = snapshot.clone();

        self.release_capture().await;
        let snapshot = self.refresh_snapshot(snapshot).await;
        self.enter(SessionState::Authorized { snapshot });
        Ok(())
    }

    async fn reload_kiosk_config(&mut self) -> Result<()> {
        let Some(kiosk_id) = self.kiosk_id else {
            return Err(self.invalid("reload_kiosk_config"));
        };

        let fresh = self.services.registry.get_kiosk_config(kiosk_id).await?;
        let timeout = self.timeout_for(&fresh);
        self.inactivity.set_timeout(timeout);
        if let Some(kiosk) = self.kiosk.as_mut() {
            kiosk.inactivity_timeout_seconds = fresh.inactivity_timeout_seconds;
        }
        Ok(())
    }

    async fn release_capture(&mut self) {
        if let Some(lease) = self.capture_lease.take() {
            self.devices.release(&lease).await;
        }
    }

    async fn refresh_snapshot(&self, fallback: EmployeeSnapshot) -> EmployeeSnapshot {
        match self
            .services
            .directory
            .get_employee_snapshot(&fallback.employee_id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "Snapshot refresh for {} failed, keeping previous: {}",
                    fallback.employee_id, e
                );
                fallback
            }
        }
    }

    async fn process_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Biometric { epoch, outcome } => self.on_biometric(epoch, outcome).await,
            Signal::Search { epoch, response } => self.on_search(epoch, response),
            Signal::InactivityElapsed { generation } => {
                if generation != self.inactivity_generation || self.state.is_idle() {
                    debug!("Dropping stale inactivity signal {}", generation);
                    return;
                }
                self.notice(NoticeLevel::Info, "Session closed after inactivity.");
                self.close("inactivity timeout").await;
            }
            Signal::LockoutExpired { epoch } => {
                if epoch != self.epoch
                    || !matches!(self.state, SessionState::Authenticating { .. })
                {
                    return;
                }
                if self.lockout.expire_if_elapsed(Instant::now()) {
                    info!("PIN lockout expired");
                    self.notice(NoticeLevel::Info, "PIN entry unlocked.");
                    self.publish_view();
                }
            }
            Signal::BreakEligible { epoch, eligible_at } => {
                if epoch != self.epoch || !matches!(self.state, SessionState::Authorized { .. }) {
                    return;
                }
                debug!("Minimum break reached");
                self.break_eligible_at = Some(eligible_at);
                self.publish_view();
            }
        }
    }

    async fn on_biometric(&mut self, epoch: u64, outcome: ScanOutcome) {
        if epoch != self.epoch || !matches!(self.state, SessionState::Identifying) {
            debug!("Dropping stale biometric outcome {:?}", outcome);
            return;
        }

        match outcome {
            ScanOutcome::Matched(candidate) => {
                self.stop_identification().await;
                match self
                    .services
                    .directory
                    .get_employee_snapshot(&candidate.employee_id)
                    .await
                {
                    Ok(snapshot) => {
                        info!("Biometric identification of {}", candidate.employee_id);
                        self.lockout.reset();
                        self.enter(SessionState::Authorized { snapshot });
                    }
                    Err(e) => {
                        warn!("Snapshot for {} failed: {}", candidate.employee_id, e);
                        self.notice(
                            NoticeLevel::Error,
                            "Could not load the employee record. Please try again.",
                        );
                        self.start_identifying();
                    }
                }
            }
            ScanOutcome::TimedOut => {
                self.scan_task = None;
                self.notice(
                    NoticeLevel::Info,
                    "No face match found. Search by name or retry the face scan.",
                );
                self.publish_view();
            }
            ScanOutcome::DeviceFailed(e) => {
                self.scan_task = None;
                self.notice(NoticeLevel::Warning, e.user_message());
                self.publish_view();
            }
            ScanOutcome::Cancelled => {}
        }
    }

    fn on_search(&mut self, epoch: u64, response: SearchResponse) {
        if epoch != self.epoch
            || !matches!(self.state, SessionState::Identifying)
            || !self.search.is_current(response.sequence)
        {
            debug!("Dropping stale search response #{}", response.sequence);
            return;
        }

        match response.results {
            Ok(results) => {
                self.search_results = results.clone();
                self.event_bus.publish(KioskEvent::SearchResults {
                    query: response.query,
                    results,
                });
            }
            Err(_) => {
                self.notice(NoticeLevel::Warning, "Employee search failed. Please try again.");
            }
        }
    }

    /// Set the state and re-arm the timers that apply to it. Does not publish.
    fn transition(&mut self, next: SessionState) {
        let from = self.state.kind();
        self.epoch += 1;

        abort(&mut self.lockout_timer);
        abort(&mut self.break_timer);
        self.break_eligible_at = None;

        self.state = next;
        info!(
            "Session {} -> {} (epoch {})",
            from,
            self.state.kind(),
            self.epoch
        );

        match &self.state {
            SessionState::Idle => self.inactivity.stop(),
            SessionState::Authenticating { .. } => {
                if self.lockout.is_locked(Instant::now()) {
                    self.arm_lockout_timer();
                }
            }
            SessionState::Authorized { .. } => self.arm_break_timer(),
            SessionState::Identifying | SessionState::Capturing { .. } => {}
        }
        self.touch();
    }

    fn enter(&mut self, next: SessionState) {
        self.transition(next);
        self.publish_view();
    }

    /// Restart the inactivity countdown for any non-idle state
    fn touch(&mut self) {
        if self.state.is_idle() {
            return;
        }
        self.inactivity_generation += 1;
        let tx = self.signal_tx.clone();
        self.inactivity
            .restart(self.inactivity_generation, move |generation| {
                let _ = tx.send(Signal::InactivityElapsed { generation });
            });
    }

    fn arm_lockout_timer(&mut self) {
        abort(&mut self.lockout_timer);
        let Some(until) = self.lockout.locked_until() else {
            return;
        };

        let tx = self.signal_tx.clone();
        let event_bus = self.event_bus.clone();
        let epoch = self.epoch;

        self.lockout_timer = Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = sleep_until(until) => break,
                    _ = ticker.tick() => {
                        let remaining = until.saturating_duration_since(Instant::now());
                        let remaining_seconds =
                            remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                        event_bus.publish(KioskEvent::LockoutCountdown { remaining_seconds });
                    }
                }
            }
            let _ = tx.send(Signal::LockoutExpired { epoch });
        }));
    }

    fn arm_break_timer(&mut self) {
        abort(&mut self.break_timer);
        let SessionState::Authorized { snapshot } = &self.state else {
            return;
        };

        let now = Utc::now();
        let minimum = self.config.breaks.minimum_break();
        let Some(remaining) = break_remaining(snapshot.current_entry.as_ref(), now, minimum)
        else {
            return;
        };
        let Ok(wait) = remaining.to_std() else {
            return;
        };

        let eligible_at = now + remaining;
        let deadline = Instant::now() + wait;
        let tx = self.signal_tx.clone();
        let event_bus = self.event_bus.clone();
        let epoch = self.epoch;

        self.break_timer = Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(60));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = sleep_until(deadline) => break,
                    _ = ticker.tick() => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        let remaining_minutes = ((left.as_millis() + 59_999) / 60_000) as i64;
                        event_bus.publish(KioskEvent::BreakCountdown { remaining_minutes });
                    }
                }
            }
            let _ = tx.send(Signal::BreakEligible { epoch, eligible_at });
        }));
    }

    fn actions_for(&self, snapshot: &EmployeeSnapshot) -> Vec<ActionOption> {
        // Once the break timer has fired, never evaluate earlier than its deadline
        let now = match self.break_eligible_at {
            Some(eligible_at) => Utc::now().max(eligible_at),
            None => Utc::now(),
        };
        available_actions(
            snapshot.current_entry.as_ref(),
            now,
            self.config.breaks.minimum_break(),
        )
    }

    fn publish_view(&self) {
        self.event_bus.publish(KioskEvent::StateChanged { view: self.view() });
    }

    fn notice<S: Into<String>>(&self, level: NoticeLevel, message: S) {
        self.event_bus.publish(KioskEvent::notice(level, message));
    }

    fn invalid(&self, input: &str) -> PunchclockError {
        SessionError::InvalidInput {
            input: input.to_string(),
            state: self.state.kind().to_string(),
        }
        .into()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.race.cancel();
        abort(&mut self.scan_task);
        abort(&mut self.lockout_timer);
        abort(&mut self.break_timer);
    }
}

fn abort(handle: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = handle.take() {
        handle.abort();
    }
}

/// Log an error at the level its category calls for
pub fn report(error: &PunchclockError) {
    match error.category() {
        ErrorCategory::Fatal => error!("{}", error),
        ErrorCategory::Policy => info!("{}", error),
        ErrorCategory::UserFacing => warn!("{}", error),
        ErrorCategory::Silent => debug!("{}", error),
    }
}

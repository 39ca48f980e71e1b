use super::{BackendResult, DirectoryService, KioskRegistry, PhotoStorage, PunchLedger};
use crate::error::BackendError;
use crate::model::{
    EmployeeSnapshot, EmployeeSummary, EnrolledTemplate, KioskIdentity, OpenTimeEntry,
    PhotoMetadata, PunchAction, PunchRequest, WeekStats,
};
use crate::session::hash_pin;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Record of a ledger submission
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCall {
    pub request: PunchRequest,
    pub accepted: bool,
}

/// Roster entry in a seed file
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEmployee {
    #[serde(flatten)]
    pub summary: EmployeeSummary,
    pub pin: String,
    #[serde(default)]
    pub current_entry: Option<OpenTimeEntry>,
}

/// Initial contents for an `InMemoryBackend`, read from JSON
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendSeed {
    #[serde(default)]
    pub kiosks: Vec<KioskIdentity>,
    #[serde(default)]
    pub employees: Vec<SeedEmployee>,
    /// Enrolled templates keyed by tenant
    #[serde(default)]
    pub templates: HashMap<String, Vec<EnrolledTemplate>>,
}

impl BackendSeed {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
struct EmployeeRecord {
    summary: EmployeeSummary,
    pin_hash: String,
    current_entry: Option<OpenTimeEntry>,
    week_stats: WeekStats,
}

#[derive(Default)]
struct Failures {
    search: Option<BackendError>,
    templates: Option<BackendError>,
    snapshot: Option<BackendError>,
    upload: Option<BackendError>,
    submit: Option<BackendError>,
    heartbeat: Option<BackendError>,
    counter: Option<BackendError>,
}

#[derive(Default)]
struct BackendState {
    kiosks: HashMap<Uuid, KioskIdentity>,
    employees: HashMap<String, EmployeeRecord>,
    templates: HashMap<String, Vec<EnrolledTemplate>>,
    photos: HashMap<String, usize>,
    ledger_calls: Vec<LedgerCall>,
    heartbeats: Vec<(Uuid, Option<IpAddr>)>,
    punch_counters: HashMap<Uuid, u64>,
    failures: Failures,
    search_delay: Option<Duration>,
}

/// In-process implementation of the directory, registry, ledger and photo storage.
///
/// The ledger applies entry transitions itself, the way the hosted backend does, so
/// the controller only ever observes state through snapshots.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<BackendState>,
    search_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated from `seed`. Kiosks without an id are skipped.
    pub fn from_seed(seed: BackendSeed) -> Self {
        let backend = Self::new();
        for kiosk in seed.kiosks {
            backend.add_kiosk(kiosk);
        }
        for employee in seed.employees {
            let employee_id = employee.summary.employee_id.clone();
            backend.add_employee(employee.summary, &employee.pin);
            backend.set_open_entry(&employee_id, employee.current_entry);
        }
        for (tenant, templates) in seed.templates {
            for template in templates {
                backend.add_template(&tenant, template);
            }
        }
        backend
    }

    pub fn kiosk_count(&self) -> usize {
        self.state.lock().kiosks.len()
    }

    pub fn add_kiosk(&self, identity: KioskIdentity) {
        if let Some(id) = identity.kiosk_id {
            self.state.lock().kiosks.insert(id, identity);
        }
    }

    /// Replace a registered kiosk's settings
    pub fn update_kiosk<F: FnOnce(&mut KioskIdentity)>(&self, kiosk_id: Uuid, update: F) {
        if let Some(identity) = self.state.lock().kiosks.get_mut(&kiosk_id) {
            update(identity);
        }
    }

    pub fn add_employee(&self, summary: EmployeeSummary, pin: &str) {
        let record = EmployeeRecord {
            pin_hash: hash_pin(pin),
            summary,
            current_entry: None,
            week_stats: WeekStats::default(),
        };
        self.state
            .lock()
            .employees
            .insert(record.summary.employee_id.clone(), record);
    }

    pub fn set_open_entry(&self, employee_id: &str, entry: Option<OpenTimeEntry>) {
        if let Some(record) = self.state.lock().employees.get_mut(employee_id) {
            record.current_entry = entry;
        }
    }

    pub fn open_entry(&self, employee_id: &str) -> Option<OpenTimeEntry> {
        self.state
            .lock()
            .employees
            .get(employee_id)
            .and_then(|r| r.current_entry.clone())
    }

    pub fn add_template(&self, tenant: &str, template: EnrolledTemplate) {
        self.state
            .lock()
            .templates
            .entry(tenant.to_string())
            .or_default()
            .push(template);
    }

    pub fn set_search_delay(&self, delay: Option<Duration>) {
        self.state.lock().search_delay = delay;
    }

    pub fn fail_search(&self, error: Option<BackendError>) {
        self.state.lock().failures.search = error;
    }

    pub fn fail_templates(&self, error: Option<BackendError>) {
        self.state.lock().failures.templates = error;
    }

    pub fn fail_snapshots(&self, error: Option<BackendError>) {
        self.state.lock().failures.snapshot = error;
    }

    pub fn fail_uploads(&self, error: Option<BackendError>) {
        self.state.lock().failures.upload = error;
    }

    pub fn fail_submits(&self, error: Option<BackendError>) {
        self.state.lock().failures.submit = error;
    }

    pub fn fail_heartbeats(&self, error: Option<BackendError>) {
        self.state.lock().failures.heartbeat = error;
    }

    pub fn fail_counter(&self, error: Option<BackendError>) {
        self.state.lock().failures.counter = error;
    }

    pub fn ledger_calls(&self) -> Vec<LedgerCall> {
        self.state.lock().ledger_calls.clone()
    }

    pub fn heartbeats(&self) -> Vec<(Uuid, Option<IpAddr>)> {
        self.state.lock().heartbeats.clone()
    }

    pub fn punch_counter(&self, kiosk_id: Uuid) -> u64 {
        self.state
            .lock()
            .punch_counters
            .get(&kiosk_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn stored_photo_count(&self) -> usize {
        self.state.lock().photos.len()
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::Relaxed)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::Relaxed)
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::Relaxed)
    }

    fn apply_punch(
        record: &mut EmployeeRecord,
        action: PunchAction,
        at: DateTime<Utc>,
    ) -> BackendResult<()> {
        match (action, record.current_entry.as_mut()) {
            (PunchAction::ClockIn, None) => {
                record.current_entry = Some(OpenTimeEntry {
                    id: Uuid::new_v4().to_string(),
                    clock_in: at,
                    break_start: None,
                });
                record.week_stats.shifts += 1;
                Ok(())
            }
            (PunchAction::BreakStart, Some(entry)) if entry.break_start.is_none() => {
                entry.break_start = Some(at);
                Ok(())
            }
            (PunchAction::BreakEnd, Some(entry)) => match entry.break_start.take() {
                Some(start) => {
                    record.week_stats.break_minutes += minutes_between(start, at);
                    Ok(())
                }
                None => Err(BackendError::rejected("employee is not on break")),
            },
            (PunchAction::ClockOut, Some(entry)) => {
                let mut worked = minutes_between(entry.clock_in, at);
                if let Some(start) = entry.break_start {
                    let on_break = minutes_between(start, at);
                    record.week_stats.break_minutes += on_break;
                    worked = worked.saturating_sub(on_break);
                }
                record.week_stats.worked_minutes += worked;
                record.current_entry = None;
                Ok(())
            }
            (PunchAction::ClockIn, Some(_)) => {
                Err(BackendError::rejected("employee is already clocked in"))
            }
            (_, None) => Err(BackendError::rejected("employee is not clocked in")),
            (PunchAction::BreakStart, Some(_)) => {
                Err(BackendError::rejected("employee is already on break"))
            }
        }
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    (to - from).num_minutes().max(0) as u32
}

#[async_trait]
impl DirectoryService for InMemoryBackend {
    async fn search_employees(&self, query: &str) -> BackendResult<Vec<EmployeeSummary>> {
        self.search_calls.fetch_add(1, Ordering::Relaxed);

        let delay = self.state.lock().search_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if let Some(error) = &state.failures.search {
            return Err(error.clone());
        }

        let needle = query.trim().to_lowercase();
        let mut results: Vec<EmployeeSummary> = state
            .employees
            .values()
            .filter(|record| {
                record.summary.display_name.to_lowercase().contains(&needle)
                    || record
                        .summary
                        .employee_number
                        .as_deref()
                        .map(|n| n.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .map(|record| record.summary.clone())
            .collect();
        results.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        debug!("Directory search '{}' matched {}", query, results.len());
        Ok(results)
    }

    async fn load_enrolled_templates(&self, tenant: &str) -> BackendResult<Vec<EnrolledTemplate>> {
        let state = self.state.lock();
        if let Some(error) = &state.failures.templates {
            return Err(error.clone());
        }
        Ok(state.templates.get(tenant).cloned().unwrap_or_default())
    }

    async fn get_employee_snapshot(&self, employee_id: &str) -> BackendResult<EmployeeSnapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::Relaxed);

        let state = self.state.lock();
        if let Some(error) = &state.failures.snapshot {
            return Err(error.clone());
        }
        let record = state
            .employees
            .get(employee_id)
            .ok_or_else(|| BackendError::not_found(format!("employee {}", employee_id)))?;

        Ok(EmployeeSnapshot {
            employee_id: record.summary.employee_id.clone(),
            display_name: record.summary.display_name.clone(),
            pin_hash: record.pin_hash.clone(),
            department: record.summary.department.clone(),
            current_entry: record.current_entry.clone(),
            week_stats: record.week_stats.clone(),
        })
    }
}

#[async_trait]
impl KioskRegistry for InMemoryBackend {
    async fn get_kiosk_config(&self, kiosk_id: Uuid) -> BackendResult<KioskIdentity> {
        self.state
            .lock()
            .kiosks
            .get(&kiosk_id)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("kiosk {}", kiosk_id)))
    }

    async fn report_heartbeat(&self, kiosk_id: Uuid, ip: Option<IpAddr>) -> BackendResult<()> {
        let mut state = self.state.lock();
        if let Some(error) = &state.failures.heartbeat {
            return Err(error.clone());
        }
        state.heartbeats.push((kiosk_id, ip));
        Ok(())
    }

    async fn increment_punch_counter(&self, kiosk_id: Uuid) -> BackendResult<()> {
        let mut state = self.state.lock();
        if let Some(error) = &state.failures.counter {
            return Err(error.clone());
        }
        *state.punch_counters.entry(kiosk_id).or_insert(0) += 1;
        Ok(())
    }
}

#[async_trait]
impl PunchLedger for InMemoryBackend {
    async fn submit_punch(&self, request: PunchRequest) -> BackendResult<()> {
        let mut state = self.state.lock();

        if let Some(error) = state.failures.submit.clone() {
            state.ledger_calls.push(LedgerCall {
                request,
                accepted: false,
            });
            return Err(error);
        }

        if !state.photos.contains_key(&request.photo_ref) {
            state.ledger_calls.push(LedgerCall {
                request,
                accepted: false,
            });
            return Err(BackendError::rejected("photo reference is unknown"));
        }

        let result = match state.employees.get_mut(&request.employee_id) {
            Some(record) => Self::apply_punch(record, request.action, request.timestamp),
            None => Err(BackendError::not_found(format!(
                "employee {}",
                request.employee_id
            ))),
        };

        state.ledger_calls.push(LedgerCall {
            request,
            accepted: result.is_ok(),
        });
        result
    }
}

#[async_trait]
impl PhotoStorage for InMemoryBackend {
    async fn upload_photo(
        &self,
        bytes: Arc<Vec<u8>>,
        metadata: PhotoMetadata,
    ) -> BackendResult<String> {
        self.upload_calls.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        if let Some(error) = &state.failures.upload {
            return Err(error.clone());
        }
        let url = format!("memory://punch-photos/{}", metadata.object_key());
        state.photos.insert(url.clone(), bytes.len());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, name: &str, number: &str) -> EmployeeSummary {
        EmployeeSummary {
            employee_id: id.to_string(),
            display_name: name.to_string(),
            employee_number: Some(number.to_string()),
            department: Some("Service".to_string()),
        }
    }

    fn request(employee_id: &str, action: PunchAction, photo_ref: &str) -> PunchRequest {
        PunchRequest {
            employee_id: employee_id.to_string(),
            action,
            photo_ref: photo_ref.to_string(),
            kiosk_id: Uuid::nil(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_seed_from_json() {
        let seed = BackendSeed::from_json(
            r#"{
                "kiosks": [{
                    "kiosk_id": "3f2504e0-4f89-11d3-9a0c-0305e82c3301",
                    "display_name": "Front Desk",
                    "tenant": "north",
                    "biometric_enabled": false,
                    "manual_entry_enabled": true,
                    "inactivity_timeout_seconds": 90
                }],
                "employees": [{
                    "employee_id": "e1",
                    "display_name": "Jane Smith",
                    "employee_number": "1001",
                    "department": null,
                    "pin": "1234"
                }]
            }"#,
        )
        .unwrap();
        let backend = InMemoryBackend::from_seed(seed);

        assert_eq!(backend.kiosk_count(), 1);
        let snapshot = backend.get_employee_snapshot("e1").await.unwrap();
        assert_eq!(snapshot.pin_hash, hash_pin("1234"));
        assert!(snapshot.current_entry.is_none());
        assert!(backend.load_enrolled_templates("north").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_name_and_number() {
        let backend = InMemoryBackend::new();
        backend.add_employee(summary("e1", "Jane Smith", "1001"), "1234");
        backend.add_employee(summary("e2", "Raj Patel", "2002"), "9999");

        let by_name = backend.search_employees("smi").await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].employee_id, "e1");

        let by_number = backend.search_employees("200").await.unwrap();
        assert_eq!(by_number.len(), 1);
        assert_eq!(by_number[0].employee_id, "e2");
    }

    #[tokio::test]
    async fn test_ledger_requires_uploaded_photo() {
        let backend = InMemoryBackend::new();
        backend.add_employee(summary("e1", "Jane Smith", "1001"), "1234");

        let result = backend
            .submit_punch(request("e1", PunchAction::ClockIn, "memory://nope"))
            .await;
        assert!(matches!(result, Err(BackendError::Rejected { .. })));
        assert!(backend.open_entry("e1").is_none());
    }

    #[tokio::test]
    async fn test_ledger_entry_lifecycle() {
        let backend = InMemoryBackend::new();
        backend.add_employee(summary("e1", "Jane Smith", "1001"), "1234");

        let metadata = PhotoMetadata {
            employee_id: "e1".to_string(),
            kiosk_id: Uuid::nil(),
            action: PunchAction::ClockIn,
            captured_at: Utc::now(),
        };
        let url = backend
            .upload_photo(Arc::new(vec![1, 2, 3]), metadata)
            .await
            .unwrap();

        backend
            .submit_punch(request("e1", PunchAction::ClockIn, &url))
            .await
            .unwrap();
        assert!(backend.open_entry("e1").is_some());

        let again = backend
            .submit_punch(request("e1", PunchAction::ClockIn, &url))
            .await;
        assert!(again.is_err());

        backend
            .submit_punch(request("e1", PunchAction::BreakStart, &url))
            .await
            .unwrap();
        assert!(backend.open_entry("e1").unwrap().on_break());

        backend
            .submit_punch(request("e1", PunchAction::BreakEnd, &url))
            .await
            .unwrap();
        assert!(!backend.open_entry("e1").unwrap().on_break());

        backend
            .submit_punch(request("e1", PunchAction::ClockOut, &url))
            .await
            .unwrap();
        assert!(backend.open_entry("e1").is_none());

        let calls = backend.ledger_calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls.iter().filter(|c| c.accepted).count(), 4);
    }
}

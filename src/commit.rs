//! Upload-then-submit punch transactions

use crate::error::{BackendError, CommitError};
use crate::model::{CaptureResult, EmployeeSnapshot, PhotoMetadata, PunchAction, PunchRequest};
use crate::services::{DirectoryService, KioskRegistry, PhotoStorage, PunchLedger};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a committed punch
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub action: PunchAction,
    pub photo_ref: String,
    pub timestamp: DateTime<Utc>,
    /// Authoritative state after the punch. An error here does not undo the punch.
    pub snapshot: Result<EmployeeSnapshot, BackendError>,
}

/// Turns a captured photo plus an action into a recorded punch.
///
/// Order is fixed: the photo is stored first, then the ledger is asked for the transition,
/// then the kiosk counter is bumped on a best-effort basis, and finally the snapshot is
/// re-read. The ledger is never called without a stored photo.
pub struct PunchCommitter {
    storage: Arc<dyn PhotoStorage>,
    ledger: Arc<dyn PunchLedger>,
    registry: Arc<dyn KioskRegistry>,
    directory: Arc<dyn DirectoryService>,
    kiosk_id: Uuid,
}

impl PunchCommitter {
    pub fn new(
        storage: Arc<dyn PhotoStorage>,
        ledger: Arc<dyn PunchLedger>,
        registry: Arc<dyn KioskRegistry>,
        directory: Arc<dyn DirectoryService>,
        kiosk_id: Uuid,
    ) -> Self {
        Self {
            storage,
            ledger,
            registry,
            directory,
            kiosk_id,
        }
    }

    pub fn kiosk_id(&self) -> Uuid {
        self.kiosk_id
    }

    pub async fn commit(
        &self,
        employee_id: &str,
        action: PunchAction,
        photo: CaptureResult,
    ) -> Result<CommitReceipt, CommitError> {
        let metadata = PhotoMetadata {
            employee_id: employee_id.to_string(),
            kiosk_id: self.kiosk_id,
            action,
            captured_at: photo.captured_at,
        };

        debug!(
            "Uploading {} byte photo for {} {}",
            photo.len(),
            employee_id,
            action
        );
        let photo_ref = self
            .storage
            .upload_photo(Arc::clone(&photo.image_bytes), metadata)
            .await
            .map_err(CommitError::UploadFailed)?;

        let timestamp = Utc::now();
        let request = PunchRequest {
            employee_id: employee_id.to_string(),
            action,
            photo_ref: photo_ref.clone(),
            kiosk_id: self.kiosk_id,
            timestamp,
        };
        self.ledger
            .submit_punch(request)
            .await
            .map_err(CommitError::SubmitFailed)?;

        info!("Punch {} recorded for {} ({})", action, employee_id, photo_ref);

        if let Err(e) = self.registry.increment_punch_counter(self.kiosk_id).await {
            warn!(
                "Punch counter increment for kiosk {} failed: {}",
                self.kiosk_id, e
            );
        }

        let snapshot = self.directory.get_employee_snapshot(employee_id).await;
        if let Err(e) = &snapshot {
            warn!("Snapshot refresh for {} failed after punch: {}", employee_id, e);
        }

        Ok(CommitReceipt {
            action,
            photo_ref,
            timestamp,
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EmployeeSummary;
    use crate::services::InMemoryBackend;

    fn fixture() -> (Arc<InMemoryBackend>, PunchCommitter, Uuid) {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_employee(
            EmployeeSummary {
                employee_id: "e1".to_string(),
                display_name: "Jane Smith".to_string(),
                employee_number: Some("1001".to_string()),
                department: None,
            },
            "1234",
        );
        let kiosk_id = Uuid::new_v4();
        let committer = PunchCommitter::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            kiosk_id,
        );
        (backend, committer, kiosk_id)
    }

    fn photo() -> CaptureResult {
        CaptureResult::new(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9], Utc::now())
    }

    #[tokio::test]
    async fn test_successful_commit_sequence() {
        let (backend, committer, kiosk_id) = fixture();

        let receipt = committer
            .commit("e1", PunchAction::ClockIn, photo())
            .await
            .unwrap();

        assert!(receipt.photo_ref.starts_with("memory://punch-photos/"));
        assert!(receipt.snapshot.unwrap().current_entry.is_some());
        assert_eq!(backend.stored_photo_count(), 1);
        assert_eq!(backend.punch_counter(kiosk_id), 1);

        let calls = backend.ledger_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.photo_ref, receipt.photo_ref);
        assert_eq!(calls[0].request.kiosk_id, kiosk_id);
    }

    #[tokio::test]
    async fn test_upload_failure_never_reaches_ledger() {
        let (backend, committer, kiosk_id) = fixture();
        backend.fail_uploads(Some(BackendError::transport("connection reset")));

        let err = committer
            .commit("e1", PunchAction::ClockIn, photo())
            .await
            .unwrap_err();

        assert!(matches!(err, CommitError::UploadFailed(_)));
        assert!(backend.ledger_calls().is_empty());
        assert_eq!(backend.punch_counter(kiosk_id), 0);
        assert!(backend.open_entry("e1").is_none());
    }

    #[tokio::test]
    async fn test_submit_failure_skips_counter() {
        let (backend, committer, kiosk_id) = fixture();

        // Clock-out without an open entry is rejected by the ledger
        let err = committer
            .commit("e1", PunchAction::ClockOut, photo())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommitError::SubmitFailed(BackendError::Rejected { .. })
        ));
        assert_eq!(backend.upload_calls(), 1);
        assert_eq!(backend.punch_counter(kiosk_id), 0);
    }

    #[tokio::test]
    async fn test_counter_failure_is_not_surfaced() {
        let (backend, committer, kiosk_id) = fixture();
        backend.fail_counter(Some(BackendError::transport("timeout")));

        let receipt = committer
            .commit("e1", PunchAction::ClockIn, photo())
            .await
            .unwrap();

        assert!(receipt.snapshot.is_ok());
        assert_eq!(backend.punch_counter(kiosk_id), 0);
        assert!(backend.open_entry("e1").is_some());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_punch() {
        let (backend, committer, _) = fixture();
        backend.fail_snapshots(Some(BackendError::transport("timeout")));

        let receipt = committer
            .commit("e1", PunchAction::ClockIn, photo())
            .await
            .unwrap();

        assert!(receipt.snapshot.is_err());
        assert!(backend.open_entry("e1").is_some());
    }
}

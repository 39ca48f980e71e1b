//! Black-box collaborators consumed by the controller

mod identity_store;
mod memory;

pub use identity_store::{FileIdentityStore, StaticIdentityStore};
pub use memory::{BackendSeed, InMemoryBackend, LedgerCall, SeedEmployee};

use crate::error::BackendError;
use crate::identification::Descriptor;
use crate::model::{
    CaptureResult, EmployeeSnapshot, EmployeeSummary, EnrolledTemplate, KioskIdentity,
    PhotoMetadata, PunchRequest,
};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Employee roster and biometric enrollment
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Partial name / employee-number lookup
    async fn search_employees(&self, query: &str) -> BackendResult<Vec<EmployeeSummary>>;

    async fn load_enrolled_templates(&self, tenant: &str) -> BackendResult<Vec<EnrolledTemplate>>;

    async fn get_employee_snapshot(&self, employee_id: &str) -> BackendResult<EmployeeSnapshot>;
}

/// Central registry of kiosks
#[async_trait]
pub trait KioskRegistry: Send + Sync {
    /// `NotFound` when the kiosk is not registered
    async fn get_kiosk_config(&self, kiosk_id: Uuid) -> BackendResult<KioskIdentity>;

    async fn report_heartbeat(&self, kiosk_id: Uuid, ip: Option<IpAddr>) -> BackendResult<()>;

    async fn increment_punch_counter(&self, kiosk_id: Uuid) -> BackendResult<()>;
}

/// Sole mutator of open time entries. Atomicity and overlap validation are its job.
#[async_trait]
pub trait PunchLedger: Send + Sync {
    async fn submit_punch(&self, request: PunchRequest) -> BackendResult<()>;
}

/// Durable storage for punch photos
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Returns a reference URL for the stored object
    async fn upload_photo(&self, bytes: Arc<Vec<u8>>, metadata: PhotoMetadata)
        -> BackendResult<String>;
}

/// Device-local persisted kiosk identity
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Raw stored value, `None` when absent
    async fn load(&self) -> std::io::Result<Option<String>>;
}

/// Turns a frame into a face descriptor
#[async_trait]
pub trait FaceEncoder: Send + Sync {
    /// `None` when no face is visible in the frame
    async fn describe(&self, frame: &CaptureResult) -> BackendResult<Option<Descriptor>>;
}

/// Bundle of collaborators handed to the controller
#[derive(Clone)]
pub struct Services {
    pub directory: Arc<dyn DirectoryService>,
    pub registry: Arc<dyn KioskRegistry>,
    pub ledger: Arc<dyn PunchLedger>,
    pub storage: Arc<dyn PhotoStorage>,
    pub identity: Arc<dyn IdentityStore>,
    pub encoder: Arc<dyn FaceEncoder>,
}

impl Services {
    /// Wire every backend trait to one in-memory backend
    pub fn in_memory(
        backend: Arc<InMemoryBackend>,
        identity: Arc<dyn IdentityStore>,
        encoder: Arc<dyn FaceEncoder>,
    ) -> Self {
        Self {
            directory: backend.clone(),
            registry: backend.clone(),
            ledger: backend.clone(),
            storage: backend,
            identity,
            encoder,
        }
    }
}

/// Encoder that never finds a face; used when no recognition model is wired in
pub struct NoFaceEncoder;

#[async_trait]
impl FaceEncoder for NoFaceEncoder {
    async fn describe(&self, _frame: &CaptureResult) -> BackendResult<Option<Descriptor>> {
        Ok(None)
    }
}

/// Encoder returning a fixed descriptor for every frame
pub struct StaticEncoder {
    descriptor: Option<Descriptor>,
}

impl StaticEncoder {
    pub fn new(descriptor: Option<Descriptor>) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl FaceEncoder for StaticEncoder {
    async fn describe(&self, _frame: &CaptureResult) -> BackendResult<Option<Descriptor>> {
        Ok(self.descriptor.clone())
    }
}

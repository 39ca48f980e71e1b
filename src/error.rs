use thiserror::Error;

/// How an error is handled once it reaches the session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Session refuses to open; no retry loop
    Fatal,
    /// Surfaced to the operator; session stays open at a sensible prior state
    UserFacing,
    /// Logged only
    Silent,
    /// Not a failure, a temporary policy state (PIN lockout)
    Policy,
}

#[derive(Error, Debug)]
pub enum PunchclockError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Capture device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Punch commit error: {0}")]
    Commit(#[from] CommitError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PunchclockError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PunchclockError::Device(e) => e.category(),
            PunchclockError::Backend(e) => e.category(),
            PunchclockError::Commit(e) => e.category(),
            PunchclockError::Session(e) => e.category(),
            PunchclockError::Config(_) => ErrorCategory::Fatal,
            _ => ErrorCategory::UserFacing,
        }
    }
}

/// Capture hardware errors, translated at the device manager boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera unavailable: {details}")]
    Unavailable { details: String },

    #[error("A capture stream is already held")]
    AlreadyAcquired,

    #[error("No capture stream is held")]
    NotAcquired,

    #[error("Frame capture failed: {details}")]
    CaptureFailed { details: String },
}

impl DeviceError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::UserFacing
    }

    /// Operator-facing message
    pub fn user_message(&self) -> String {
        match self {
            DeviceError::PermissionDenied => {
                "Camera access was denied. Use manual search instead.".to_string()
            }
            DeviceError::Unavailable { .. } => {
                "No camera is available on this kiosk.".to_string()
            }
            DeviceError::AlreadyAcquired | DeviceError::NotAcquired => {
                "The camera is busy. Please try again.".to_string()
            }
            DeviceError::CaptureFailed { .. } => {
                "Could not take a photo. Please try again.".to_string()
            }
        }
    }
}

/// Errors raised by the external collaborators (directory, registry, ledger, storage)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Transport failure: {details}")]
    Transport { details: String },

    #[error("Request rejected: {details}")]
    Rejected { details: String },
}

impl BackendError {
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn transport<S: Into<String>>(details: S) -> Self {
        Self::Transport {
            details: details.into(),
        }
    }

    pub fn rejected<S: Into<String>>(details: S) -> Self {
        Self::Rejected {
            details: details.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::UserFacing
    }
}

/// Failures of the upload-then-submit punch sequence
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("Photo upload failed: {0}")]
    UploadFailed(BackendError),

    #[error("Punch submission failed: {0}")]
    SubmitFailed(BackendError),
}

impl CommitError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::UserFacing
    }

    pub fn user_message(&self) -> String {
        match self {
            CommitError::UploadFailed(_) => {
                "The photo could not be uploaded. Please retake it.".to_string()
            }
            CommitError::SubmitFailed(BackendError::Rejected { details }) => {
                format!("The punch was rejected: {}", details)
            }
            CommitError::SubmitFailed(_) => {
                "The punch could not be recorded. Please retake the photo.".to_string()
            }
        }
    }
}

/// Session lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Kiosk identity is not configured on this device")]
    MissingKioskIdentity,

    #[error("Kiosk identity '{value}' is malformed")]
    MalformedKioskIdentity { value: String },

    #[error("Kiosk {kiosk_id} is not registered")]
    KioskNotRegistered { kiosk_id: String },

    #[error("Kiosk registry unreachable: {details}")]
    RegistryUnavailable { details: String },

    #[error("Neither face recognition nor manual entry is enabled for this kiosk")]
    NoIdentificationMethod,

    #[error("'{input}' is not accepted while {state}")]
    InvalidInput { input: String, state: String },

    #[error("PIN entry locked for {remaining_seconds} more seconds")]
    Locked { remaining_seconds: u64 },

    #[error("{action} is not available right now")]
    ActionUnavailable { action: String },
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::MissingKioskIdentity
            | SessionError::MalformedKioskIdentity { .. }
            | SessionError::KioskNotRegistered { .. }
            | SessionError::RegistryUnavailable { .. }
            | SessionError::NoIdentificationMethod => ErrorCategory::Fatal,
            SessionError::Locked { .. } => ErrorCategory::Policy,
            SessionError::InvalidInput { .. } | SessionError::ActionUnavailable { .. } => {
                ErrorCategory::UserFacing
            }
        }
    }
}

/// Per-template validation failure; the template is skipped, the load continues
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor has {actual} components, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("descriptor component {index} is not finite")]
    NonFinite { index: usize },
}

impl DescriptorError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Silent
    }
}

/// Face matcher initialization failures; biometric identification is disabled for the session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatcherError {
    #[error("no valid enrolled templates")]
    NoTemplates,

    #[error("match threshold {threshold} is not a positive distance")]
    InvalidThreshold { threshold: f32 },

    #[error("failed to load enrolled templates: {0}")]
    LoadFailed(BackendError),
}

impl MatcherError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::UserFacing
    }
}

pub type Result<T> = std::result::Result<T, PunchclockError>;

//! Biometric and manual identification, raced against each other

mod biometric;
mod descriptor;
mod matcher;
mod race;
mod search;

pub use biometric::{load_matcher, BiometricScan, ScanOutcome, ScanSettings};
pub use descriptor::{
    filter_templates, validate_template, Descriptor, ValidTemplate, DESCRIPTOR_LEN,
};
pub use matcher::{FaceMatch, FaceMatcher};
pub use race::IdentificationRace;
pub use search::{ManualSearch, SearchResponse};

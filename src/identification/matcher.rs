use super::descriptor::{filter_templates, Descriptor, ValidTemplate};
use crate::error::MatcherError;
use crate::model::{EnrolledTemplate, IdentificationMethod, IdentityCandidate};
use tracing::{debug, info};

/// Closest enrolled template within the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub employee_id: String,
    pub display_name: String,
    pub distance: f32,
}

impl FaceMatch {
    /// `1 - distance`, clamped to [0, 1]
    pub fn confidence(&self) -> f32 {
        (1.0 - self.distance).clamp(0.0, 1.0)
    }

    pub fn into_candidate(self) -> IdentityCandidate {
        let confidence = self.confidence();
        IdentityCandidate {
            employee_id: self.employee_id,
            display_name: self.display_name,
            confidence: Some(confidence),
            method: IdentificationMethod::Biometric,
        }
    }
}

/// Nearest-neighbour matcher over a tenant's enrolled descriptors
#[derive(Debug)]
pub struct FaceMatcher {
    templates: Vec<ValidTemplate>,
    threshold: f32,
}

impl FaceMatcher {
    pub fn new(templates: Vec<ValidTemplate>, threshold: f32) -> Result<Self, MatcherError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(MatcherError::InvalidThreshold { threshold });
        }
        if templates.is_empty() {
            return Err(MatcherError::NoTemplates);
        }

        info!(
            "Face matcher ready with {} templates (threshold {:.2})",
            templates.len(),
            threshold
        );
        Ok(Self {
            templates,
            threshold,
        })
    }

    /// Validate raw templates, dropping malformed descriptors, and build the matcher
    pub fn from_enrolled(
        templates: Vec<EnrolledTemplate>,
        threshold: f32,
    ) -> Result<Self, MatcherError> {
        Self::new(filter_templates(templates), threshold)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Smallest-distance template, if it lies within the threshold
    pub fn best_match(&self, probe: &Descriptor) -> Option<FaceMatch> {
        let (template, distance) = self
            .templates
            .iter()
            .map(|t| (t, t.descriptor.distance(probe)))
            .min_by(|a, b| a.1.total_cmp(&b.1))?;

        debug!(
            "Closest template {} at distance {:.3}",
            template.employee_id, distance
        );

        (distance <= self.threshold).then(|| FaceMatch {
            employee_id: template.employee_id.clone(),
            display_name: template.display_name.clone(),
            distance,
        })
    }
}

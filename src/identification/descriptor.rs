use crate::error::DescriptorError;
use crate::model::EnrolledTemplate;
use std::fmt;
use tracing::{debug, warn};

/// Components in a face descriptor
pub const DESCRIPTOR_LEN: usize = 128;

/// Fixed-length face descriptor
#[derive(Clone, PartialEq)]
pub struct Descriptor(Box<[f32; DESCRIPTOR_LEN]>);

impl Descriptor {
    /// Validate and copy `values`. Wrong length or non-finite components are rejected.
    pub fn from_slice(values: &[f32]) -> Result<Self, DescriptorError> {
        let array: [f32; DESCRIPTOR_LEN] =
            values
                .try_into()
                .map_err(|_| DescriptorError::WrongLength {
                    expected: DESCRIPTOR_LEN,
                    actual: values.len(),
                })?;

        if let Some(index) = array.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }

        Ok(Self(Box::new(array)))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0[..]
    }

    /// Euclidean distance to `other`
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor([{:.3}, {:.3}, ..])", self.0[0], self.0[1])
    }
}

/// Enrolled template whose descriptor passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTemplate {
    pub employee_id: String,
    pub display_name: String,
    pub descriptor: Descriptor,
}

pub fn validate_template(template: EnrolledTemplate) -> Result<ValidTemplate, DescriptorError> {
    let descriptor = Descriptor::from_slice(&template.descriptor)?;
    Ok(ValidTemplate {
        employee_id: template.employee_id,
        display_name: template.display_name,
        descriptor,
    })
}

/// Keep the templates that validate; log and skip the rest
pub fn filter_templates(templates: Vec<EnrolledTemplate>) -> Vec<ValidTemplate> {
    let total = templates.len();
    let valid: Vec<ValidTemplate> = templates
        .into_iter()
        .filter_map(|template| {
            let employee_id = template.employee_id.clone();
            validate_template(template)
                .map_err(|e| warn!("Skipping template for {}: {}", employee_id, e))
                .ok()
        })
        .collect();

    debug!("{} of {} enrolled templates are valid", valid.len(), total);
    valid
}

//! Garde validation helpers shared by settings structs.

use crate::domain::{validate_identifier, DomainError};
use garde::{Report, Validate};

/// Validate with garde and fold the report into a `DomainError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(describe(&report)))
}

/// Garde custom rule: value can be embedded as one subject token
pub fn subject_token(value: &str, _ctx: &()) -> garde::Result {
    validate_identifier("subject token", value).map_err(|e| match e {
        DomainError::InvalidIdentifier { reason, .. } => garde::Error::new(reason),
        other => garde::Error::new(other.to_string()),
    })
}

/// Garde custom rule: a ratio threshold in [0, 1]
pub fn unit_interval(value: &f64, _ctx: &()) -> garde::Result {
    if value.is_finite() && (0.0..=1.0).contains(value) {
        Ok(())
    } else {
        Err(garde::Error::new(format!("{value} is not within [0, 1]")))
    }
}

fn describe(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            let path = path.to_string();
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{path}: {}", error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

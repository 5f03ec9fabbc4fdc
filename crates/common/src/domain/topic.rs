//! Subject naming for the sensing hierarchy (camera → area → region).
//!
//! Subjects are dot-delimited with a fixed arity so that a single token can be
//! recovered by position. Every area is subscribed with its own concrete
//! subject; wildcards are never used to fan in areas.

use crate::domain::{DomainError, DomainResult};

const DELIMITER: char = '.';
const AREA_PREFIX: &str = "area";
const FRAME_SUFFIX: &str = "frame";
const REGION_PREFIX: &str = "region";
const PROCESSED_SUFFIX: &str = "processed";
const ALERTS_PREFIX: &str = "alerts";

/// Check that an area or region identifier can be embedded in a subject.
pub fn validate_identifier(kind: &'static str, value: &str) -> DomainResult<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains(DELIMITER) {
        Some("must not contain the subject delimiter '.'")
    } else if value.contains('*') || value.contains('>') {
        Some("must not contain wildcard tokens")
    } else if value.chars().any(char::is_whitespace) {
        Some("must not contain whitespace")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DomainError::InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// `area.<area>.frame`
pub fn area_frame_subject(area: &str) -> DomainResult<String> {
    validate_identifier("area", area)?;
    Ok(format!("{AREA_PREFIX}.{area}.{FRAME_SUFFIX}"))
}

/// `region.<region>.processed`
pub fn region_processed_subject(region: &str) -> DomainResult<String> {
    validate_identifier("region", region)?;
    Ok(format!("{REGION_PREFIX}.{region}.{PROCESSED_SUFFIX}"))
}

/// `alerts.<area>`
pub fn alert_subject(area: &str) -> DomainResult<String> {
    validate_identifier("area", area)?;
    Ok(format!("{ALERTS_PREFIX}.{area}"))
}

/// Concrete inbound subjects for every area bound to one region.
pub fn area_frame_subjects(areas: &[String]) -> DomainResult<Vec<String>> {
    areas.iter().map(|area| area_frame_subject(area)).collect()
}

/// Recover the area identifier from a concrete `area.<area>.frame` subject.
pub fn parse_area_subject(subject: &str) -> DomainResult<String> {
    let tokens: Vec<&str> = subject.split(DELIMITER).collect();

    match tokens.as_slice() {
        [AREA_PREFIX, area, FRAME_SUFFIX] => {
            validate_identifier("area", area)
                .map_err(|_| DomainError::UnexpectedSubject(subject.to_string()))?;
            Ok((*area).to_string())
        }
        _ => Err(DomainError::UnexpectedSubject(subject.to_string())),
    }
}

/// Recover the area identifier from an `alerts.<area>` subject.
pub fn parse_alert_subject(subject: &str) -> DomainResult<String> {
    match subject.split_once(DELIMITER) {
        Some((ALERTS_PREFIX, area)) if validate_identifier("area", area).is_ok() => {
            Ok(area.to_string())
        }
        _ => Err(DomainError::UnexpectedSubject(subject.to_string())),
    }
}

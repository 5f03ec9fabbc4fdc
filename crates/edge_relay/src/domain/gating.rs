use crate::domain::{ClassificationResult, ClassifierStrategy};
use common::domain::{DomainError, DomainResult, RelayReason};
use std::fmt;

/// Confidence thresholds; a `None` gate is disabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateThresholds {
    pub smoke: Option<f64>,
    pub fire: Option<f64>,
}

impl GateThresholds {
    /// Defaults tuned per scoring strategy. The remote model reports no smoke
    /// score, so its smoke gate is off.
    pub fn for_strategy(strategy: ClassifierStrategy) -> Self {
        match strategy {
            ClassifierStrategy::Heuristic => Self {
                smoke: Some(0.014),
                fire: Some(0.00001),
            },
            ClassifierStrategy::Remote => Self {
                smoke: None,
                fire: Some(0.5),
            },
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.smoke.is_none() && self.fire.is_none() {
            return Err(DomainError::ValidationError(
                "at least one of the smoke and fire gates must be enabled".to_string(),
            ));
        }

        for (name, threshold) in [("smoke", self.smoke), ("fire", self.fire)] {
            if let Some(value) = threshold {
                if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                    return Err(DomainError::ValidationError(format!(
                        "{name} threshold {value} is not within [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    BelowSmokeThreshold,
    BelowFireThreshold,
    Suspicious,
    Inconclusive,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DecisionReason::BelowSmokeThreshold => "below_smoke_threshold",
            DecisionReason::BelowFireThreshold => "below_fire_threshold",
            DecisionReason::Suspicious => "suspicious",
            DecisionReason::Inconclusive => "inconclusive",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayDecision {
    pub forward: bool,
    pub reason: DecisionReason,
}

impl RelayDecision {
    /// Reason carried on the outbound event; `None` for drops.
    pub fn relay_reason(&self) -> Option<RelayReason> {
        match (self.forward, self.reason) {
            (true, DecisionReason::Inconclusive) => Some(RelayReason::Inconclusive),
            (true, _) => Some(RelayReason::Suspicious),
            (false, _) => None,
        }
    }
}

/// Forward-or-drop rule.
///
/// Gates are evaluated smoke first, then fire, against one classification.
/// A frame is forwarded when any enabled gate reaches its threshold; a dropped
/// frame reports the last gate it failed.
#[derive(Debug, Clone, Copy)]
pub struct GatingPolicy {
    thresholds: GateThresholds,
}

impl GatingPolicy {
    pub fn new(thresholds: GateThresholds) -> DomainResult<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> GateThresholds {
        self.thresholds
    }

    pub fn decide(&self, scores: &ClassificationResult) -> RelayDecision {
        let mut reason = None;

        if let Some(threshold) = self.thresholds.smoke {
            if scores.smoke_confidence >= threshold {
                return forward(DecisionReason::Suspicious);
            }
            reason = Some(DecisionReason::BelowSmokeThreshold);
        }

        if let Some(threshold) = self.thresholds.fire {
            if scores.fire_confidence >= threshold {
                return forward(DecisionReason::Suspicious);
            }
            reason = Some(DecisionReason::BelowFireThreshold);
        }

        RelayDecision {
            forward: false,
            reason: reason.unwrap_or(DecisionReason::BelowFireThreshold),
        }
    }

    /// Decision for a frame that could not be scored. It is never treated as
    /// a negative; it goes upstream for review.
    pub fn inconclusive(&self) -> RelayDecision {
        forward(DecisionReason::Inconclusive)
    }
}

fn forward(reason: DecisionReason) -> RelayDecision {
    RelayDecision {
        forward: true,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(smoke: f64, fire: f64) -> ClassificationResult {
        ClassificationResult {
            smoke_confidence: smoke,
            fire_confidence: fire,
        }
    }

    fn heuristic_policy() -> GatingPolicy {
        GatingPolicy::new(GateThresholds::for_strategy(ClassifierStrategy::Heuristic)).unwrap()
    }

    #[test]
    fn test_forward_when_either_gate_passes() {
        let policy = heuristic_policy();

        assert!(policy.decide(&scores(0.5, 0.0)).forward);
        assert!(policy.decide(&scores(0.0, 0.5)).forward);
        assert!(policy.decide(&scores(0.014, 0.0)).forward);
        assert_eq!(
            policy.decide(&scores(0.5, 0.5)).reason,
            DecisionReason::Suspicious
        );
    }

    #[test]
    fn test_drop_when_both_gates_fail() {
        let decision = heuristic_policy().decide(&scores(0.013, 0.0));

        assert!(!decision.forward);
        assert_eq!(decision.reason, DecisionReason::BelowFireThreshold);
        assert_eq!(decision.relay_reason(), None);
    }

    #[test]
    fn test_smoke_only_policy_reports_smoke_reason() {
        let policy = GatingPolicy::new(GateThresholds {
            smoke: Some(0.1),
            fire: None,
        })
        .unwrap();

        let decision = policy.decide(&scores(0.05, 1.0));

        assert!(!decision.forward);
        assert_eq!(decision.reason, DecisionReason::BelowSmokeThreshold);
    }

    #[test]
    fn test_grey_frame_dropped_when_smoke_gate_disabled() {
        let policy = GatingPolicy::new(GateThresholds {
            smoke: None,
            fire: Some(0.00001),
        })
        .unwrap();

        let decision = policy.decide(&scores(1.0, 0.0));

        assert!(!decision.forward);
        assert_eq!(decision.reason, DecisionReason::BelowFireThreshold);
    }

    #[test]
    fn test_remote_defaults_ignore_smoke() {
        let policy =
            GatingPolicy::new(GateThresholds::for_strategy(ClassifierStrategy::Remote)).unwrap();

        assert!(!policy.decide(&scores(1.0, 0.49)).forward);
        assert!(policy.decide(&scores(0.0, 0.5)).forward);
    }

    #[test]
    fn test_inconclusive_forwards() {
        let decision = heuristic_policy().inconclusive();

        assert!(decision.forward);
        assert_eq!(decision.reason, DecisionReason::Inconclusive);
        assert_eq!(decision.relay_reason(), Some(RelayReason::Inconclusive));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        for thresholds in [
            GateThresholds {
                smoke: None,
                fire: None,
            },
            GateThresholds {
                smoke: Some(1.5),
                fire: None,
            },
            GateThresholds {
                smoke: None,
                fire: Some(f64::NAN),
            },
        ] {
            assert!(matches!(
                GatingPolicy::new(thresholds),
                Err(DomainError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_reason_display_matches_wire_names() {
        assert_eq!(
            DecisionReason::BelowSmokeThreshold.to_string(),
            "below_smoke_threshold"
        );
        assert_eq!(
            DecisionReason::BelowFireThreshold.to_string(),
            "below_fire_threshold"
        );
    }
}

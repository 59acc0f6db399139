//! Replan decision procedure
//!
//! After every executed step the coordinator asks one question: carry on,
//! revise the plan, or stop. The policy encoded here is the system's
//! core commitment: prefer one bounded replan over guessing, and prefer
//! an explicit abort over fabricating an answer when no sanctioned
//! alternative path exists.

use crate::orchestrator::context::{FailureKind, ResultRecord};
use crate::orchestrator::plan::{Step, StepStatus};

/// Abort reason when a failing step declares no alternative path
pub const REASON_NO_ALTERNATIVE: &str = "no-alternative";

/// What the coordinator should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Advance to the next step
    Continue,
    /// Discard the remainder of the plan and generate a revision
    Replan {
        /// Why the current plan is no longer viable
        reason: String,
    },
    /// Stop the query without an answer
    Abort {
        /// Specific abort reason reported to the caller
        reason: String,
    },
}

/// Decide continue / replan / abort for the latest step outcome
///
/// Rules, in priority order:
/// 1. Succeeded with data: continue.
/// 2. Failed with `validation-error`: replan only if the step declares an
///    alternative resolution strategy, else abort.
/// 3. Failed with `tool-error` or `timeout`: replan only if the step
///    declares an adjustment strategy, else abort.
/// 4. Succeeded but empty (the data simply is not there): replan if an
///    alternate path is declared, else abort.
/// 5. Failed with `unresolved-reference` (malformed ordering): replan so
///    the generator can repair the ordering; the ceiling bounds this.
pub fn evaluate(step: &Step, record: &ResultRecord) -> Decision {
    let intent = step.action.intent();

    if record.status == StepStatus::Succeeded {
        if !record.has_empty_payload() {
            return Decision::Continue;
        }
        // Rule 4: present-but-empty result
        return match &step.fallback {
            Some(fallback) => Decision::Replan {
                reason: format!(
                    "step {} ({intent}) succeeded but returned no data; declared alternative: {:?}",
                    step.position, fallback.strategy
                ),
            },
            None => Decision::Abort {
                reason: REASON_NO_ALTERNATIVE.to_string(),
            },
        };
    }

    let error = match &record.error {
        Some(error) => error,
        // A failed record without a descriptor is a coordinator bug;
        // treat it as a dead end rather than guessing.
        None => {
            return Decision::Abort {
                reason: REASON_NO_ALTERNATIVE.to_string(),
            }
        }
    };

    match error.kind {
        FailureKind::UnresolvedReference => Decision::Replan {
            reason: format!(
                "step {} ({intent}) referenced an unavailable output: {}",
                step.position, error.message
            ),
        },
        FailureKind::ValidationError | FailureKind::ToolError | FailureKind::Timeout => {
            match &step.fallback {
                Some(fallback) => Decision::Replan {
                    reason: format!(
                        "step {} ({intent}) failed with {}: {}; declared alternative: {:?}",
                        step.position,
                        error_kind_name(error.kind),
                        error.message,
                        fallback.strategy
                    ),
                },
                None => Decision::Abort {
                    reason: REASON_NO_ALTERNATIVE.to_string(),
                },
            }
        }
    }
}

fn error_kind_name(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::ValidationError => "validation-error",
        FailureKind::ToolError => "tool-error",
        FailureKind::Timeout => "timeout",
        FailureKind::UnresolvedReference => "unresolved-reference",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::IdentifierKind;
    use crate::orchestrator::intent::{ResolveEntityParams, StepAction};
    use crate::orchestrator::plan::{Fallback, FallbackStrategy};
    use serde_json::json;

    fn step(fallback: Option<Fallback>) -> Step {
        Step {
            position: 2,
            action: StepAction::ResolveEntity(ResolveEntityParams {
                identifier: "AAPL".to_string(),
                kind: IdentifierKind::Ticker,
            }),
            fallback,
            status: StepStatus::Pending,
        }
    }

    fn with_fallback(strategy: FallbackStrategy) -> Option<Fallback> {
        Some(Fallback {
            strategy,
            note: None,
        })
    }

    #[test]
    fn test_success_with_data_continues() {
        let record = ResultRecord::succeeded(Some(json!({"cik": "123"})));
        assert_eq!(evaluate(&step(None), &record), Decision::Continue);
    }

    #[test]
    fn test_validation_error_without_fallback_aborts() {
        let record = ResultRecord::failed(FailureKind::ValidationError, "no match");
        assert_eq!(
            evaluate(&step(None), &record),
            Decision::Abort {
                reason: REASON_NO_ALTERNATIVE.to_string()
            }
        );
    }

    #[test]
    fn test_validation_error_with_fallback_replans() {
        let record = ResultRecord::failed(FailureKind::ValidationError, "no match");
        let decision = evaluate(
            &step(with_fallback(FallbackStrategy::BroadenEntitySearch)),
            &record,
        );
        match decision {
            Decision::Replan { reason } => {
                assert!(reason.contains("validation-error"));
                assert!(reason.contains("BroadenEntitySearch"));
            }
            other => panic!("expected replan, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_error_without_fallback_aborts() {
        let record = ResultRecord::failed(FailureKind::ToolError, "upstream 503");
        assert_eq!(
            evaluate(&step(None), &record),
            Decision::Abort {
                reason: REASON_NO_ALTERNATIVE.to_string()
            }
        );
    }

    #[test]
    fn test_timeout_with_fallback_replans() {
        let record = ResultRecord::failed(FailureKind::Timeout, "30s elapsed");
        let decision = evaluate(
            &step(with_fallback(FallbackStrategy::NarrowDateRange)),
            &record,
        );
        assert!(matches!(decision, Decision::Replan { .. }));
    }

    #[test]
    fn test_empty_success_with_alternate_path_replans() {
        let record = ResultRecord::succeeded(None);
        let decision = evaluate(
            &step(with_fallback(FallbackStrategy::AlternateSection)),
            &record,
        );
        match decision {
            Decision::Replan { reason } => assert!(reason.contains("no data")),
            other => panic!("expected replan, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_success_without_alternate_path_aborts() {
        let record = ResultRecord::succeeded(Some(json!("")));
        assert_eq!(
            evaluate(&step(None), &record),
            Decision::Abort {
                reason: REASON_NO_ALTERNATIVE.to_string()
            }
        );
    }

    #[test]
    fn test_unresolved_reference_always_replans() {
        let record =
            ResultRecord::failed(FailureKind::UnresolvedReference, "step 9 has no result");
        let decision = evaluate(&step(None), &record);
        assert!(matches!(decision, Decision::Replan { .. }));
    }
}
